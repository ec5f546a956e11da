use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use fhirseed_core::{EntityKind, StoreId};

/// Severity of a store diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl Severity {
    /// Map an OperationOutcome severity code; `fatal` counts as an error.
    pub fn from_code(code: &str) -> Self {
        match code {
            "fatal" | "error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => Severity::Information,
        }
    }
}

/// One diagnostic returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub diagnostics: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Issue {
    pub fn new(severity: Severity, diagnostics: impl Into<String>) -> Self {
        Self {
            severity,
            diagnostics: diagnostics.into(),
            path: None,
        }
    }

    pub fn error(diagnostics: impl Into<String>) -> Self {
        Self::new(Severity::Error, diagnostics)
    }

    pub fn warning(diagnostics: impl Into<String>) -> Self {
        Self::new(Severity::Warning, diagnostics)
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Issues carried by an OperationOutcome body. Anything else has none.
    pub fn from_outcome(body: &Value) -> Vec<Issue> {
        if body.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
            return Vec::new();
        }
        body.get("issue")
            .and_then(Value::as_array)
            .map(|issues| issues.iter().map(Issue::from_outcome_entry).collect())
            .unwrap_or_default()
    }

    fn from_outcome_entry(entry: &Value) -> Issue {
        let severity = Severity::from_code(
            entry
                .get("severity")
                .and_then(Value::as_str)
                .unwrap_or("information"),
        );
        let diagnostics = entry
            .get("diagnostics")
            .and_then(Value::as_str)
            .or_else(|| entry.pointer("/details/text").and_then(Value::as_str))
            .unwrap_or("no diagnostics")
            .to_string();
        let path = ["expression", "location"].iter().find_map(|field| {
            entry
                .get(*field)
                .and_then(|paths| paths.get(0))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Issue {
            severity,
            diagnostics,
            path,
        }
    }
}

/// A successful create.
#[derive(Debug, Clone)]
pub struct Created {
    pub store_id: StoreId,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store rejected the request: {}", first_error(.issues))]
    Rejection { issues: Vec<Issue> },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("unreadable store response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn rejected(issue: Issue) -> Self {
        StoreError::Rejection {
            issues: vec![issue],
        }
    }
}

fn first_error(issues: &[Issue]) -> &str {
    issues
        .iter()
        .find(|issue| issue.severity == Severity::Error)
        .or_else(|| issues.first())
        .map(|issue| issue.diagnostics.as_str())
        .unwrap_or("no diagnostics")
}

/// CRUD primitives of the remote store.
#[async_trait]
pub trait StoreTransport: Send + Sync {
    /// Create a resource; the store assigns its id.
    async fn create(&self, kind: EntityKind, resource: &Value) -> Result<Created, StoreError>;

    /// Search a kind; returns the matching resources.
    async fn search(
        &self,
        kind: EntityKind,
        query: &[(&str, &str)],
    ) -> Result<Vec<Value>, StoreError>;

    /// Run the store's validation on a resource without creating it.
    async fn validate(&self, kind: EntityKind, resource: &Value) -> Result<Vec<Issue>, StoreError>;

    async fn delete(&self, kind: EntityKind, store_id: &StoreId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn outcome_issues_are_read() {
        let issues = Issue::from_outcome(&json!({
            "resourceType": "OperationOutcome",
            "issue": [
                {"severity": "fatal", "code": "invalid", "diagnostics": "bad subject", "expression": ["Condition.subject"]},
                {"severity": "warning", "code": "processing", "details": {"text": "unknown code"}},
                {"severity": "information", "code": "informational"}
            ]
        }));
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].path.as_deref(), Some("Condition.subject"));
        assert_eq!(issues[1].diagnostics, "unknown code");
        assert_eq!(issues[2].severity, Severity::Information);
    }

    #[test]
    fn other_bodies_carry_no_issues() {
        assert!(Issue::from_outcome(&json!({"resourceType": "Patient", "id": "1"})).is_empty());
    }

    #[test]
    fn rejection_message_prefers_errors() {
        let err = StoreError::Rejection {
            issues: vec![Issue::warning("minor"), Issue::error("subject missing")],
        };
        assert_eq!(err.to_string(), "store rejected the request: subject missing");
    }
}
