use rand::Rng;

use fhirseed_core::{EntityKind, LocalId, Record, Reference};

use crate::errors::GenerationError;

/// A facility: a location and the organization that manages it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clinic {
    pub organization: Reference,
    pub location: Reference,
}

/// Shared records every subject draws from. Filled once before any
/// subject is built, then only read.
#[derive(Debug, Clone, Default)]
pub struct Pools {
    clinics: Vec<Clinic>,
    practitioners: Vec<LocalId>,
}

impl Pools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pooled record. Locations are paired with the organization
    /// they reference; other kinds are ignored.
    pub fn ingest(&mut self, record: &Record) {
        match record.kind {
            EntityKind::Location => {
                if let Some(field) = record.references_to(EntityKind::Organization).next() {
                    self.clinics.push(Clinic {
                        organization: field.target.clone(),
                        location: record.handle(),
                    });
                }
            }
            EntityKind::Practitioner => self.practitioners.push(record.local_id.clone()),
            _ => {}
        }
    }

    pub fn pick_clinic<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Clinic, GenerationError> {
        if self.clinics.is_empty() {
            return Err(GenerationError::EmptyPool(EntityKind::Location));
        }
        Ok(self.clinics[rng.random_range(0..self.clinics.len())].clone())
    }

    pub fn pick_practitioner<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Reference, GenerationError> {
        if self.practitioners.is_empty() {
            return Err(GenerationError::EmptyPool(EntityKind::Practitioner));
        }
        let local_id = self.practitioners[rng.random_range(0..self.practitioners.len())].clone();
        Ok(Reference::new(EntityKind::Practitioner, local_id))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use fhirseed_core::{FieldPath, ReferenceField};

    use super::*;

    #[test]
    fn empty_pools_are_reported() {
        let pools = Pools::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            pools.pick_practitioner(&mut rng),
            Err(GenerationError::EmptyPool(EntityKind::Practitioner))
        ));
        assert!(pools.pick_clinic(&mut rng).is_err());
    }

    #[test]
    fn locations_carry_their_organization() {
        let mut location = Record::new(EntityKind::Location, LocalId::new("loc"));
        location.references.push(ReferenceField::new(
            FieldPath::key("managingOrganization"),
            Reference::new(EntityKind::Organization, LocalId::new("org")),
        ));
        let mut pools = Pools::new();
        pools.ingest(&location);
        pools.ingest(&Record::new(EntityKind::Practitioner, LocalId::new("doc")));

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let clinic = pools.pick_clinic(&mut rng).unwrap();
        assert_eq!(clinic.organization.local_id.as_str(), "org");
        assert_eq!(pools.pick_practitioner(&mut rng).unwrap().local_id.as_str(), "doc");
    }
}
