use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Schema version a graph is rendered in. Fixed for the whole graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FhirVersion {
    #[default]
    R4,
    R5,
}

impl FhirVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            FhirVersion::R4 => "R4",
            FhirVersion::R5 => "R5",
        }
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FhirVersion {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "R4" | "4.0.1" => Ok(FhirVersion::R4),
            "R5" | "5.0.0" => Ok(FhirVersion::R5),
            _ => Err(Error::UnknownVersion(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("r5".parse::<FhirVersion>().ok(), Some(FhirVersion::R5));
        assert_eq!(" R4 ".parse::<FhirVersion>().ok(), Some(FhirVersion::R4));
        assert!("R6".parse::<FhirVersion>().is_err());
    }
}
