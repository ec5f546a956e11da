use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use fhirseed_core::EntityKind;

/// Generation configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Free-form description printed when the configuration is loaded.
    #[serde(default)]
    pub description: String,
    /// Random seed; the same seed and configuration reproduce the same graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Sizes of the shared pools and the number of subjects.
    #[serde(default)]
    pub base_counts: BaseCounts,
    /// Quantity rules per dependent kind. Absent kinds are not generated.
    #[serde(default)]
    pub per_patient: BTreeMap<DependentKind, QuantityEntry>,
    /// Explicit per-subject values that bypass the quantity rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_overrides: Vec<SubjectOverride>,
    /// Legacy name for `subject_overrides`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patient_configs: Vec<SubjectOverride>,
}

impl GeneratorConfig {
    /// Overrides from whichever of the two fields is populated.
    pub fn overrides(&self) -> &[SubjectOverride] {
        if self.subject_overrides.is_empty() {
            &self.patient_configs
        } else {
            &self.subject_overrides
        }
    }

    /// Number of subjects the assembler will build.
    pub fn subject_count(&self) -> u32 {
        let overrides = self.overrides();
        if overrides.is_empty() {
            self.base_counts.patients
        } else {
            overrides.len() as u32
        }
    }

    pub fn rule(&self, kind: DependentKind) -> Option<QuantityRule> {
        self.per_patient.get(&kind).map(QuantityEntry::rule)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            description: "Built-in default profile".to_string(),
            seed: None,
            base_counts: BaseCounts::default(),
            per_patient: DependentKind::ALL
                .into_iter()
                .map(|kind| (kind, QuantityEntry::Rule(kind.default_rule())))
                .collect(),
            subject_overrides: Vec::new(),
            patient_configs: Vec::new(),
        }
    }
}

/// Pool sizes and subject count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BaseCounts {
    /// Clinics; each yields an Organization and a Location.
    #[serde(default = "default_clinics")]
    pub clinics: u32,
    /// Practitioners in the shared pool.
    #[serde(default = "default_practitioners")]
    pub practitioners: u32,
    /// Subjects (patients) to build.
    #[serde(default = "default_patients")]
    pub patients: u32,
}

fn default_clinics() -> u32 {
    3
}

fn default_practitioners() -> u32 {
    10
}

fn default_patients() -> u32 {
    25
}

impl Default for BaseCounts {
    fn default() -> Self {
        Self {
            clinics: default_clinics(),
            practitioners: default_practitioners(),
            patients: default_patients(),
        }
    }
}

/// Kinds built per subject.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DependentKind {
    Conditions,
    Appointments,
    MedicationRequests,
    Encounters,
    Observations,
    Procedures,
    DiagnosticReports,
    ServiceRequests,
    ClinicalImpressions,
    FamilyMemberHistories,
    Immunizations,
    MedicationAdministrations,
    AllergyIntolerances,
    CarePlans,
    Coverages,
}

impl DependentKind {
    pub const ALL: [DependentKind; 15] = [
        DependentKind::Conditions,
        DependentKind::Appointments,
        DependentKind::MedicationRequests,
        DependentKind::Encounters,
        DependentKind::Observations,
        DependentKind::Procedures,
        DependentKind::DiagnosticReports,
        DependentKind::ServiceRequests,
        DependentKind::ClinicalImpressions,
        DependentKind::FamilyMemberHistories,
        DependentKind::Immunizations,
        DependentKind::MedicationAdministrations,
        DependentKind::AllergyIntolerances,
        DependentKind::CarePlans,
        DependentKind::Coverages,
    ];

    pub fn entity_kind(self) -> EntityKind {
        match self {
            DependentKind::Conditions => EntityKind::Condition,
            DependentKind::Appointments => EntityKind::Appointment,
            DependentKind::MedicationRequests => EntityKind::MedicationRequest,
            DependentKind::Encounters => EntityKind::Encounter,
            DependentKind::Observations => EntityKind::Observation,
            DependentKind::Procedures => EntityKind::Procedure,
            DependentKind::DiagnosticReports => EntityKind::DiagnosticReport,
            DependentKind::ServiceRequests => EntityKind::ServiceRequest,
            DependentKind::ClinicalImpressions => EntityKind::ClinicalImpression,
            DependentKind::FamilyMemberHistories => EntityKind::FamilyMemberHistory,
            DependentKind::Immunizations => EntityKind::Immunization,
            DependentKind::MedicationAdministrations => EntityKind::MedicationAdministration,
            DependentKind::AllergyIntolerances => EntityKind::AllergyIntolerance,
            DependentKind::CarePlans => EntityKind::CarePlan,
            DependentKind::Coverages => EntityKind::Coverage,
        }
    }

    pub fn key(self) -> &'static str {
        self.entity_kind().plural()
    }

    pub fn default_rule(self) -> QuantityRule {
        let (min, max) = match self {
            DependentKind::Conditions => (1, 3),
            DependentKind::Appointments => (1, 5),
            DependentKind::MedicationRequests => (1, 4),
            DependentKind::Encounters => (1, 4),
            DependentKind::Observations => (2, 6),
            DependentKind::Procedures => (1, 3),
            DependentKind::DiagnosticReports => (1, 2),
            DependentKind::ServiceRequests => (1, 3),
            DependentKind::ClinicalImpressions => (1, 2),
            DependentKind::FamilyMemberHistories => (2, 4),
            DependentKind::Immunizations => (1, 3),
            DependentKind::MedicationAdministrations => (2, 5),
            DependentKind::AllergyIntolerances => (1, 4),
            DependentKind::CarePlans => (1, 3),
            DependentKind::Coverages => (1, 2),
        };
        QuantityRule::range(min, max)
    }

    /// Optional links this kind draws, with their default probabilities.
    pub fn links(self) -> &'static [(LinkKind, f64)] {
        match self {
            DependentKind::Encounters => &[(LinkKind::DocumentReference, 0.8)],
            DependentKind::Observations => &[(LinkKind::Encounter, 0.5)],
            DependentKind::ServiceRequests => &[(LinkKind::Encounter, 0.5)],
            DependentKind::ClinicalImpressions => &[(LinkKind::Encounter, 0.7)],
            DependentKind::Immunizations => {
                &[(LinkKind::Encounter, 0.6), (LinkKind::Location, 0.8)]
            }
            DependentKind::MedicationAdministrations => {
                &[(LinkKind::Encounter, 0.7), (LinkKind::MedicationRequest, 0.5)]
            }
            DependentKind::AllergyIntolerances => &[(LinkKind::Practitioner, 0.6)],
            DependentKind::CarePlans => &[(LinkKind::Encounter, 0.5), (LinkKind::Condition, 0.7)],
            DependentKind::Coverages => &[(LinkKind::PolicyHolder, 0.2)],
            _ => &[],
        }
    }

    pub fn from_entity_kind(kind: EntityKind) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.entity_kind() == kind)
    }
}

/// Optional link drawn with a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    DocumentReference,
    Encounter,
    Location,
    MedicationRequest,
    Condition,
    Practitioner,
    PolicyHolder,
}

impl LinkKind {
    pub const ALL: [LinkKind; 7] = [
        LinkKind::DocumentReference,
        LinkKind::Encounter,
        LinkKind::Location,
        LinkKind::MedicationRequest,
        LinkKind::Condition,
        LinkKind::Practitioner,
        LinkKind::PolicyHolder,
    ];

    /// Name of the configuration field holding this probability.
    pub fn field(self) -> &'static str {
        match self {
            LinkKind::DocumentReference => "document_reference_probability",
            LinkKind::Encounter => "encounter_probability",
            LinkKind::Location => "location_probability",
            LinkKind::MedicationRequest => "medication_request_probability",
            LinkKind::Condition => "condition_probability",
            LinkKind::Practitioner => "practitioner_probability",
            LinkKind::PolicyHolder => "policy_holder_probability",
        }
    }
}

/// Either a fixed count or a full rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QuantityEntry {
    Count(u32),
    Rule(QuantityRule),
}

impl QuantityEntry {
    pub fn rule(&self) -> QuantityRule {
        match self {
            QuantityEntry::Count(count) => QuantityRule::range(*count, *count),
            QuantityEntry::Rule(rule) => rule.clone(),
        }
    }
}

/// Inclusive count range with optional gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QuantityRule {
    pub min: u32,
    pub max: u32,
    /// Chance that the kind is built at all for a given subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_reference_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_request_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practitioner_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_holder_probability: Option<f64>,
}

impl QuantityRule {
    pub fn range(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            probability: None,
            document_reference_probability: None,
            encounter_probability: None,
            location_probability: None,
            medication_request_probability: None,
            condition_probability: None,
            practitioner_probability: None,
            policy_holder_probability: None,
        }
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = Some(probability);
        self
    }

    /// Configured value of a link probability, if any.
    pub fn link(&self, link: LinkKind) -> Option<f64> {
        match link {
            LinkKind::DocumentReference => self.document_reference_probability,
            LinkKind::Encounter => self.encounter_probability,
            LinkKind::Location => self.location_probability,
            LinkKind::MedicationRequest => self.medication_request_probability,
            LinkKind::Condition => self.condition_probability,
            LinkKind::Practitioner => self.practitioner_probability,
            LinkKind::PolicyHolder => self.policy_holder_probability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unknown => "unknown",
        }
    }
}

/// Explicit values for one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SubjectOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    /// `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medications: Vec<MedicationSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allergies: Vec<AllergySpec>,
    /// Fixed counts per dependent kind.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub counts: BTreeMap<DependentKind, u32>,
}

impl SubjectOverride {
    /// Explicit count for a kind, from a list or the `counts` map.
    pub fn fixed_count(&self, kind: DependentKind) -> Option<u32> {
        let listed = match kind {
            DependentKind::Conditions => self.conditions.len(),
            DependentKind::MedicationRequests => self.medications.len(),
            DependentKind::AllergyIntolerances => self.allergies.len(),
            _ => 0,
        };
        if listed > 0 {
            Some(listed as u32)
        } else {
            self.counts.get(&kind).copied()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    pub code: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MedicationSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AllergySpec {
    pub substance: String,
}
