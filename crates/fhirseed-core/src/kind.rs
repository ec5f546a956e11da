use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Record types the generator knows how to build.
///
/// Declaration order doubles as the tie-break order when several kinds are
/// ready to publish at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Organization,
    Location,
    Practitioner,
    Patient,
    Condition,
    Appointment,
    MedicationRequest,
    Procedure,
    Encounter,
    Binary,
    DocumentReference,
    Observation,
    DiagnosticReport,
    ServiceRequest,
    ClinicalImpression,
    FamilyMemberHistory,
    Immunization,
    MedicationAdministration,
    AllergyIntolerance,
    CarePlan,
    Coverage,
}

impl EntityKind {
    pub const ALL: [EntityKind; 21] = [
        EntityKind::Organization,
        EntityKind::Location,
        EntityKind::Practitioner,
        EntityKind::Patient,
        EntityKind::Condition,
        EntityKind::Appointment,
        EntityKind::MedicationRequest,
        EntityKind::Procedure,
        EntityKind::Encounter,
        EntityKind::Binary,
        EntityKind::DocumentReference,
        EntityKind::Observation,
        EntityKind::DiagnosticReport,
        EntityKind::ServiceRequest,
        EntityKind::ClinicalImpression,
        EntityKind::FamilyMemberHistory,
        EntityKind::Immunization,
        EntityKind::MedicationAdministration,
        EntityKind::AllergyIntolerance,
        EntityKind::CarePlan,
        EntityKind::Coverage,
    ];

    /// Resource type name used on the wire (`Patient`, `CarePlan`, ...).
    pub fn resource_type(self) -> &'static str {
        match self {
            EntityKind::Organization => "Organization",
            EntityKind::Location => "Location",
            EntityKind::Practitioner => "Practitioner",
            EntityKind::Patient => "Patient",
            EntityKind::Condition => "Condition",
            EntityKind::Appointment => "Appointment",
            EntityKind::MedicationRequest => "MedicationRequest",
            EntityKind::Procedure => "Procedure",
            EntityKind::Encounter => "Encounter",
            EntityKind::Binary => "Binary",
            EntityKind::DocumentReference => "DocumentReference",
            EntityKind::Observation => "Observation",
            EntityKind::DiagnosticReport => "DiagnosticReport",
            EntityKind::ServiceRequest => "ServiceRequest",
            EntityKind::ClinicalImpression => "ClinicalImpression",
            EntityKind::FamilyMemberHistory => "FamilyMemberHistory",
            EntityKind::Immunization => "Immunization",
            EntityKind::MedicationAdministration => "MedicationAdministration",
            EntityKind::AllergyIntolerance => "AllergyIntolerance",
            EntityKind::CarePlan => "CarePlan",
            EntityKind::Coverage => "Coverage",
        }
    }

    /// Plural key used in the output document.
    pub fn plural(self) -> &'static str {
        match self {
            EntityKind::Organization => "clinics",
            EntityKind::Location => "locations",
            EntityKind::Practitioner => "practitioners",
            EntityKind::Patient => "patients",
            EntityKind::Condition => "conditions",
            EntityKind::Appointment => "appointments",
            EntityKind::MedicationRequest => "medication_requests",
            EntityKind::Procedure => "procedures",
            EntityKind::Encounter => "encounters",
            EntityKind::Binary => "binaries",
            EntityKind::DocumentReference => "document_references",
            EntityKind::Observation => "observations",
            EntityKind::DiagnosticReport => "diagnostic_reports",
            EntityKind::ServiceRequest => "service_requests",
            EntityKind::ClinicalImpression => "clinical_impressions",
            EntityKind::FamilyMemberHistory => "family_member_histories",
            EntityKind::Immunization => "immunizations",
            EntityKind::MedicationAdministration => "medication_administrations",
            EntityKind::AllergyIntolerance => "allergy_intolerances",
            EntityKind::CarePlan => "care_plans",
            EntityKind::Coverage => "coverages",
        }
    }

    /// Kinds this kind may reference, per the static dependency DAG.
    pub fn dependencies(self) -> &'static [EntityKind] {
        use EntityKind::*;
        match self {
            Organization | Practitioner | Patient | Binary => &[],
            Location => &[Organization],
            Condition | FamilyMemberHistory => &[Patient],
            Appointment => &[Patient, Practitioner, Location],
            MedicationRequest | Procedure | AllergyIntolerance => &[Patient, Practitioner],
            Encounter => &[Patient, Practitioner, Location, Organization],
            DocumentReference => &[Patient, Practitioner, Encounter, Binary],
            Observation | ServiceRequest | ClinicalImpression => {
                &[Patient, Practitioner, Encounter]
            }
            DiagnosticReport => &[Patient, Practitioner, Encounter, Observation],
            Immunization => &[Patient, Practitioner, Encounter, Location],
            MedicationAdministration => &[Patient, Practitioner, Encounter, MedicationRequest],
            CarePlan => &[Patient, Practitioner, Encounter, Condition],
            Coverage => &[Patient, Organization],
        }
    }

    pub fn from_resource_type(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.resource_type() == value)
    }

    pub fn from_plural(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.plural() == value)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_resource_type(value)
            .or_else(|| Self::from_plural(value))
            .ok_or_else(|| Error::UnknownKind(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_resource_type(kind.resource_type()), Some(kind));
            assert_eq!(EntityKind::from_plural(kind.plural()), Some(kind));
        }
    }

    #[test]
    fn no_kind_depends_on_itself() {
        for kind in EntityKind::ALL {
            assert!(!kind.dependencies().contains(&kind), "{kind} depends on itself");
        }
    }

    #[test]
    fn parse_rejects_unknown_names() {
        assert!("Spaceship".parse::<EntityKind>().is_err());
        assert_eq!("care_plans".parse::<EntityKind>().ok(), Some(EntityKind::CarePlan));
    }
}
