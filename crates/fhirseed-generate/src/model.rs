use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use fhirseed_core::{EntityKind, FhirVersion};

/// Seed used when neither the options nor the configuration carry one.
pub const DEFAULT_SEED: u64 = 42;

/// Options for graph assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Overrides the configuration seed when set.
    pub seed: Option<u64>,
    /// Shape of every record in the graph.
    pub version: FhirVersion,
    /// Dates are drawn backwards from this day.
    pub reference_date: NaiveDate,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            seed: None,
            version: FhirVersion::R4,
            reference_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
        }
    }
}

/// Records built for one kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindReport {
    pub kind: EntityKind,
    pub key: String,
    pub records: usize,
    pub references: usize,
}

/// Structured generation issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationIssue {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
}

/// Report for an assembly run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub seed: u64,
    pub version: FhirVersion,
    pub reference_date: NaiveDate,
    pub subjects: u32,
    /// Kinds in publish order.
    pub kinds: Vec<KindReport>,
    pub records_total: usize,
    pub references_total: usize,
    pub edges: Vec<(EntityKind, EntityKind)>,
    /// SHA-256 of the local serialization.
    pub fingerprint: String,
    pub duration_ms: u64,
    pub warnings_by_code: BTreeMap<String, u64>,
    pub warnings: Vec<GenerationIssue>,
}

impl GenerationReport {
    pub fn new(seed: u64, version: FhirVersion, reference_date: NaiveDate) -> Self {
        Self {
            seed,
            version,
            reference_date,
            subjects: 0,
            kinds: Vec::new(),
            records_total: 0,
            references_total: 0,
            edges: Vec::new(),
            fingerprint: String::new(),
            duration_ms: 0,
            warnings_by_code: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn record_warning(&mut self, issue: GenerationIssue) {
        *self.warnings_by_code.entry(issue.code.clone()).or_insert(0) += 1;
        self.warnings.push(issue);
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.kinds
            .iter()
            .find(|entry| entry.kind == kind)
            .map(|entry| entry.records)
            .unwrap_or(0)
    }
}
