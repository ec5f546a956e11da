use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fhirseed_core::EntityKind;

use crate::transport::Issue;

/// Why a record never reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    StoreRejection,
    TransportFailure,
    DependencyFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishFailure {
    pub kind: EntityKind,
    pub local_id: String,
    pub class: FailureClass,
    pub diagnostic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<Issue>,
}

/// Warning-severity issue kept for the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishWarning {
    pub kind: EntityKind,
    pub local_id: String,
    /// `create` or `validate`.
    pub stage: String,
    pub diagnostic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindOutcome {
    pub kind: EntityKind,
    pub key: String,
    pub created: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationFinding {
    pub code: String,
    pub message: String,
}

/// Outcome of one publish run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub started_at: DateTime<Utc>,
    pub probe_ok: bool,
    pub kinds: Vec<KindOutcome>,
    pub created_total: usize,
    pub warnings: Vec<PublishWarning>,
    pub failures: Vec<PublishFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification: Vec<VerificationFinding>,
    pub aborted: bool,
    pub duration_ms: u64,
}

impl PublishReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            probe_ok: false,
            kinds: Vec::new(),
            created_total: 0,
            warnings: Vec::new(),
            failures: Vec::new(),
            verification: Vec::new(),
            aborted: false,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn outcome(&self, kind: EntityKind) -> Option<&KindOutcome> {
        self.kinds.iter().find(|entry| entry.kind == kind)
    }
}

impl Default for PublishReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Markdown summary of a publish run.
pub fn render_summary(report: &PublishReport) -> String {
    let mut lines = Vec::new();

    lines.push("# Publish summary".to_string());
    lines.push(String::new());
    lines.push(format!("- started_at: {}", report.started_at.to_rfc3339()));
    lines.push(format!("- created: {}", report.created_total));
    lines.push(format!("- failures: {}", report.failures.len()));
    lines.push(format!("- warnings: {}", report.warnings.len()));
    lines.push(format!("- aborted: {}", report.aborted));
    lines.push(String::new());

    lines.push("| kind | created | failed | skipped |".to_string());
    lines.push("| --- | --- | --- | --- |".to_string());
    for entry in &report.kinds {
        lines.push(format!(
            "| {} | {} | {} | {} |",
            entry.key, entry.created, entry.failed, entry.skipped
        ));
    }
    lines.push(String::new());

    if !report.failures.is_empty() {
        lines.push("## Failures".to_string());
        for failure in &report.failures {
            let class = serde_json::to_value(failure.class)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default();
            lines.push(format!(
                "- {}/{} [{}]: {}",
                failure.kind, failure.local_id, class, failure.diagnostic
            ));
        }
        lines.push(String::new());
    }

    if !report.verification.is_empty() {
        lines.push("## Verification".to_string());
        for finding in &report.verification {
            lines.push(format!("- {}: {}", finding.code, finding.message));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_failures() {
        let mut report = PublishReport::new();
        report.kinds.push(KindOutcome {
            kind: EntityKind::Patient,
            key: "patients".to_string(),
            created: 0,
            failed: 1,
            skipped: 0,
        });
        report.failures.push(PublishFailure {
            kind: EntityKind::Patient,
            local_id: "p1".to_string(),
            class: FailureClass::StoreRejection,
            diagnostic: "birthDate invalid".to_string(),
            issue: None,
        });
        let text = render_summary(&report);
        assert!(text.contains("| patients | 0 | 1 | 0 |"));
        assert!(text.contains("- Patient/p1 [store_rejection]: birthDate invalid"));
        assert!(!report.is_success());
    }
}
