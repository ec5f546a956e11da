use serde_json::{Value, json};

use fhirseed_core::{FhirVersion, FieldPath};

/// Field names and shapes that differ between schema versions.
///
/// Selected once per graph. Every method is a pure function of its
/// arguments, so the values passed in are drawn before any mapping happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMapper {
    R4,
    R5,
}

impl FieldMapper {
    pub fn for_version(version: FhirVersion) -> Self {
        match version {
            FhirVersion::R4 => FieldMapper::R4,
            FhirVersion::R5 => FieldMapper::R5,
        }
    }

    pub fn version(self) -> FhirVersion {
        match self {
            FieldMapper::R4 => FhirVersion::R4,
            FieldMapper::R5 => FhirVersion::R5,
        }
    }

    /// Reason concepts on Appointment, ServiceRequest and Immunization.
    pub fn reason(self, concepts: Vec<Value>) -> (&'static str, Value) {
        match self {
            FieldMapper::R4 => ("reasonCode", Value::Array(concepts)),
            FieldMapper::R5 => (
                "reason",
                Value::Array(
                    concepts
                        .into_iter()
                        .map(|concept| json!({"concept": concept}))
                        .collect(),
                ),
            ),
        }
    }

    pub fn encounter_reason(self, concepts: Vec<Value>) -> (&'static str, Value) {
        match self {
            FieldMapper::R4 => ("reasonCode", Value::Array(concepts)),
            FieldMapper::R5 => {
                let values: Vec<Value> = concepts
                    .into_iter()
                    .map(|concept| json!({"concept": concept}))
                    .collect();
                ("reason", json!([{"value": values}]))
            }
        }
    }

    /// `coding` is a single Coding object.
    pub fn encounter_class(self, coding: Value) -> Value {
        match self {
            FieldMapper::R4 => coding,
            FieldMapper::R5 => json!([{"coding": [coding]}]),
        }
    }

    pub fn encounter_status(self) -> &'static str {
        match self {
            FieldMapper::R4 => "finished",
            FieldMapper::R5 => "completed",
        }
    }

    pub fn encounter_practitioner(self) -> FieldPath {
        let participant = FieldPath::key("participant").index(0);
        match self {
            FieldMapper::R4 => participant.field("individual"),
            FieldMapper::R5 => participant.field("actor"),
        }
    }

    pub fn procedure_time(self) -> &'static str {
        match self {
            FieldMapper::R4 => "performedDateTime",
            FieldMapper::R5 => "occurrenceDateTime",
        }
    }

    pub fn service_request_code(self, concept: Value) -> Value {
        match self {
            FieldMapper::R4 => concept,
            FieldMapper::R5 => json!({"concept": concept}),
        }
    }

    pub fn clinical_impression_practitioner(self) -> FieldPath {
        match self {
            FieldMapper::R4 => FieldPath::key("assessor"),
            FieldMapper::R5 => FieldPath::key("performer"),
        }
    }

    pub fn finding(self, concept: Value) -> Value {
        match self {
            FieldMapper::R4 => json!({"itemCodeableConcept": concept}),
            FieldMapper::R5 => json!({"item": {"concept": concept}}),
        }
    }

    /// Medication on MedicationRequest and MedicationAdministration.
    pub fn medication(self, concept: Value) -> (&'static str, Value) {
        match self {
            FieldMapper::R4 => ("medicationCodeableConcept", concept),
            FieldMapper::R5 => ("medication", json!({"concept": concept})),
        }
    }

    pub fn administration_encounter(self) -> FieldPath {
        match self {
            FieldMapper::R4 => FieldPath::key("context"),
            FieldMapper::R5 => FieldPath::key("encounter"),
        }
    }

    pub fn administration_period(self) -> &'static str {
        match self {
            FieldMapper::R4 => "effectivePeriod",
            FieldMapper::R5 => "occurencePeriod",
        }
    }

    pub fn administration_performer(self) -> FieldPath {
        let actor = FieldPath::key("performer").index(0).field("actor");
        match self {
            FieldMapper::R4 => actor,
            FieldMapper::R5 => actor.field("reference"),
        }
    }

    pub fn allergy_manifestation(self, concept: Value) -> Value {
        match self {
            FieldMapper::R4 => concept,
            FieldMapper::R5 => json!({"concept": concept}),
        }
    }

    pub fn allergy_practitioner(self) -> FieldPath {
        match self {
            FieldMapper::R4 => FieldPath::key("recorder"),
            FieldMapper::R5 => FieldPath::key("participant").index(0).field("actor"),
        }
    }

    pub fn care_plan_practitioner(self) -> FieldPath {
        match self {
            FieldMapper::R4 => FieldPath::key("author"),
            FieldMapper::R5 => FieldPath::key("custodian"),
        }
    }

    pub fn care_plan_condition(self) -> FieldPath {
        let addresses = FieldPath::key("addresses").index(0);
        match self {
            FieldMapper::R4 => addresses,
            FieldMapper::R5 => addresses.field("reference"),
        }
    }

    pub fn coverage_insurer(self) -> FieldPath {
        match self {
            FieldMapper::R4 => FieldPath::key("payor").index(0),
            FieldMapper::R5 => FieldPath::key("insurer"),
        }
    }

    /// Attributes only one version carries.
    pub fn coverage_kind(self) -> Option<&'static str> {
        match self {
            FieldMapper::R4 => None,
            FieldMapper::R5 => Some("insurance"),
        }
    }

    pub fn document_encounter(self) -> FieldPath {
        match self {
            FieldMapper::R4 => FieldPath::key("context").field("encounter").index(0),
            FieldMapper::R5 => FieldPath::key("context").index(0),
        }
    }

    /// R5 attesters carry a mode next to the party.
    pub fn attestation_mode(self) -> Option<Value> {
        match self {
            FieldMapper::R4 => None,
            FieldMapper::R5 => Some(json!({
                "coding": [{
                    "system": "http://hl7.org/fhir/composition-attestation-mode",
                    "code": "professional",
                    "display": "Professional"
                }],
                "text": "Professional"
            })),
        }
    }

    pub fn document_attester(self) -> FieldPath {
        match self {
            FieldMapper::R4 => FieldPath::key("authenticator"),
            FieldMapper::R5 => FieldPath::key("attester").index(0).field("party"),
        }
    }
}
