//! Builds one record at a time.

mod clinical;
mod mapper;
mod pooled;
pub(crate) mod values;

use chrono::NaiveDate;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

use fhirseed_core::{EntityKind, FhirVersion, FieldPath, LocalId, Record, Reference, ReferenceField};
use fhirseed_plan::{AllergySpec, ConditionSpec, MedicationSpec, SubjectOverride};

use crate::catalog::Catalog;
use crate::errors::GenerationError;

pub use mapper::FieldMapper;

/// Already-built records a new record points at.
///
/// The caller decides every link; the factory never invents one.
#[derive(Debug, Clone, Default)]
pub struct Links {
    pub subject: Option<Reference>,
    pub practitioner: Option<Reference>,
    pub location: Option<Reference>,
    pub organization: Option<Reference>,
    pub encounter: Option<Reference>,
    pub binary: Option<Reference>,
    pub medication_request: Option<Reference>,
    pub condition: Option<Reference>,
    pub policy_holder: Option<Reference>,
    pub observations: Vec<Reference>,
}

impl Links {
    pub fn subject(subject: Reference) -> Self {
        Self {
            subject: Some(subject),
            ..Self::default()
        }
    }
}

/// Explicit attribute values that replace drawn ones.
#[derive(Debug, Clone, Copy)]
pub enum Preset<'a> {
    Subject(&'a SubjectOverride),
    Condition(&'a ConditionSpec),
    Medication(&'a MedicationSpec),
    Allergy(&'a AllergySpec),
}

/// Builds records of any kind for one schema version.
///
/// Pure given the RNG state: the same seed, links and preset produce the
/// same record.
pub struct RecordFactory<'a> {
    catalog: &'a dyn Catalog,
    mapper: FieldMapper,
    reference_date: NaiveDate,
}

impl<'a> RecordFactory<'a> {
    pub fn new(catalog: &'a dyn Catalog, version: FhirVersion, reference_date: NaiveDate) -> Self {
        Self {
            catalog,
            mapper: FieldMapper::for_version(version),
            reference_date,
        }
    }

    pub fn build(
        &self,
        kind: EntityKind,
        links: &Links,
        preset: Option<Preset<'_>>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        match kind {
            EntityKind::Organization => self.organization(rng),
            EntityKind::Location => self.location(links, rng),
            EntityKind::Practitioner => self.practitioner(rng),
            EntityKind::Patient => self.patient(subject_preset(preset), rng),
            EntityKind::Condition => self.condition(links, condition_preset(preset), rng),
            EntityKind::Appointment => self.appointment(links, rng),
            EntityKind::MedicationRequest => {
                self.medication_request(links, medication_preset(preset), rng)
            }
            EntityKind::Procedure => self.procedure(links, rng),
            EntityKind::Encounter => self.encounter(links, rng),
            EntityKind::Binary => self.binary(rng),
            EntityKind::DocumentReference => self.document_reference(links, rng),
            EntityKind::Observation => self.observation(links, rng),
            EntityKind::DiagnosticReport => self.diagnostic_report(links, rng),
            EntityKind::ServiceRequest => self.service_request(links, rng),
            EntityKind::ClinicalImpression => self.clinical_impression(links, rng),
            EntityKind::FamilyMemberHistory => self.family_member_history(links, rng),
            EntityKind::Immunization => self.immunization(links, rng),
            EntityKind::MedicationAdministration => self.medication_administration(links, rng),
            EntityKind::AllergyIntolerance => {
                self.allergy_intolerance(links, allergy_preset(preset), rng)
            }
            EntityKind::CarePlan => self.care_plan(links, rng),
            EntityKind::Coverage => self.coverage(links, rng),
        }
    }

    fn start(&self, kind: EntityKind, rng: &mut ChaCha8Rng) -> Record {
        Record::new(kind, LocalId::new(values::random_uuid(rng)))
    }
}

fn set(record: &mut Record, key: &str, value: Value) {
    record.body.insert(key.to_string(), value);
}

fn link(record: &mut Record, path: FieldPath, target: &Reference) {
    record
        .references
        .push(ReferenceField::new(path, target.clone()));
}

fn link_optional(record: &mut Record, path: FieldPath, target: Option<&Reference>) {
    if let Some(target) = target {
        link(record, path, target);
    }
}

fn require<'l>(
    kind: EntityKind,
    link: &'static str,
    slot: &'l Option<Reference>,
) -> Result<&'l Reference, GenerationError> {
    slot.as_ref()
        .ok_or(GenerationError::MissingLink { kind, link })
}

fn subject_preset<'p>(preset: Option<Preset<'p>>) -> Option<&'p SubjectOverride> {
    match preset {
        Some(Preset::Subject(item)) => Some(item),
        _ => None,
    }
}

fn condition_preset<'p>(preset: Option<Preset<'p>>) -> Option<&'p ConditionSpec> {
    match preset {
        Some(Preset::Condition(item)) => Some(item),
        _ => None,
    }
}

fn medication_preset<'p>(preset: Option<Preset<'p>>) -> Option<&'p MedicationSpec> {
    match preset {
        Some(Preset::Medication(item)) => Some(item),
        _ => None,
    }
}

fn allergy_preset<'p>(preset: Option<Preset<'p>>) -> Option<&'p AllergySpec> {
    match preset {
        Some(Preset::Allergy(item)) => Some(item),
        _ => None,
    }
}
