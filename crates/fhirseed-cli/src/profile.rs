use std::path::Path;

use serde::{Deserialize, Serialize};

use fhirseed_publish::PublishOptions;

use crate::CliError;

/// Store endpoint and publish settings kept in a TOML file.
///
/// ```toml
/// base_url = "http://localhost:8080/fhir"
///
/// [publish]
/// timeout_secs = 10
/// concurrency = 4
/// on_error = "continue"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreProfile {
    pub base_url: Option<String>,
    #[serde(default)]
    pub publish: PublishOptions,
}

impl StoreProfile {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|err| CliError::InvalidConfig(format!("{}: {err}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use fhirseed_publish::OnError;

    use super::*;

    #[test]
    fn profile_overrides_only_given_fields() {
        let profile: StoreProfile = toml::from_str(
            r#"
base_url = "https://store.example/fhir"

[publish]
concurrency = 4
on_error = "continue"
"#,
        )
        .unwrap();
        assert_eq!(profile.base_url.as_deref(), Some("https://store.example/fhir"));
        assert_eq!(profile.publish.concurrency, 4);
        assert_eq!(profile.publish.on_error, OnError::Continue);
        assert_eq!(profile.publish.timeout_secs, 30);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<StoreProfile>("base = \"x\"").is_err());
    }
}
