use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Warnings the reference servers emit for every coded element when their
/// terminology service is incomplete.
pub const DEFAULT_IGNORED_WARNINGS: [&str; 2] = [
    "Unable to expand ValueSet: cannot apply filters",
    "Unable to expand ValueSet because CodeSystem could not be found: http://loinc.org",
];

/// What to do once a record fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Stop submitting anything after the first failure.
    #[default]
    Abort,
    /// Keep publishing records whose dependencies were all created.
    Continue,
}

/// Options for a publish run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishOptions {
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Concurrent submissions within one kind.
    pub concurrency: usize,
    pub on_error: OnError,
    /// Call `$validate` before each create.
    pub validate: bool,
    /// Check published appointments after the run.
    pub verify: bool,
    /// Warning diagnostics containing any of these are not recorded.
    pub ignored_warnings: Vec<String>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            concurrency: 1,
            on_error: OnError::Abort,
            validate: false,
            verify: false,
            ignored_warnings: DEFAULT_IGNORED_WARNINGS
                .iter()
                .map(|item| item.to_string())
                .collect(),
        }
    }
}

impl PublishOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_ignored(&self, diagnostics: &str) -> bool {
        self.ignored_warnings
            .iter()
            .any(|pattern| diagnostics.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_ignore_terminology_noise() {
        let options = PublishOptions::default();
        assert!(options.is_ignored(
            "Unable to expand ValueSet because CodeSystem could not be found: http://loinc.org (code 718-7)"
        ));
        assert!(!options.is_ignored("Profile reference could not be resolved"));
        assert_eq!(options.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let options: PublishOptions =
            serde_json::from_value(serde_json::json!({"on_error": "continue", "concurrency": 4}))
                .unwrap();
        assert_eq!(options.on_error, OnError::Continue);
        assert_eq!(options.concurrency, 4);
        assert_eq!(options.timeout_secs, 30);
        assert_eq!(options.ignored_warnings.len(), 2);
    }
}
