use chrono::{Datelike, Duration, NaiveDate};
use fake::Fake;
use fake::faker::company::en::CompanyName;
use fake::faker::name::en::{FirstName, LastName};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;

use fhirseed_core::{EntityKind, FieldPath, Record};
use fhirseed_plan::SubjectOverride;

use super::values::{self, address, concept, phone, pick};
use super::{Links, RecordFactory, link, require, set};
use crate::catalog::{Coding, CatalogTable, draw};
use crate::errors::GenerationError;

const MRN_SYSTEM: &str = "urn:fhirseed:mrn";
const NPI_SYSTEM: &str = "http://hl7.org/fhir/sid/us-npi";

impl RecordFactory<'_> {
    pub(super) fn organization(&self, rng: &mut ChaCha8Rng) -> Result<Record, GenerationError> {
        let mut record = self.start(EntityKind::Organization, rng);
        let company: String = CompanyName().fake_with_rng(rng);
        let telecom = phone(rng);
        let address = address(rng);

        set(&mut record, "active", json!(true));
        set(&mut record, "name", json!(format!("{company} Clinic")));
        set(
            &mut record,
            "type",
            json!([values::fixed_concept(
                "http://terminology.hl7.org/CodeSystem/organization-type",
                "prov",
                "Healthcare Provider"
            )]),
        );
        set(&mut record, "telecom", telecom);
        set(&mut record, "address", address);
        Ok(record)
    }

    pub(super) fn location(
        &self,
        links: &Links,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let organization = require(EntityKind::Location, "organization", &links.organization)?;
        let mut record = self.start(EntityKind::Location, rng);
        let city: String = fake::faker::address::en::CityName().fake_with_rng(rng);
        let telecom = phone(rng);
        let address = address(rng);

        set(&mut record, "status", json!("active"));
        set(&mut record, "name", json!(format!("{city} Medical Center")));
        set(&mut record, "mode", json!("instance"));
        set(
            &mut record,
            "physicalType",
            values::fixed_concept(
                "http://terminology.hl7.org/CodeSystem/location-physical-type",
                "bu",
                "Building",
            ),
        );
        set(&mut record, "telecom", telecom);
        set(&mut record, "address", address);
        link(&mut record, FieldPath::key("managingOrganization"), organization);
        Ok(record)
    }

    pub(super) fn practitioner(&self, rng: &mut ChaCha8Rng) -> Result<Record, GenerationError> {
        let mut record = self.start(EntityKind::Practitioner, rng);
        let given: String = FirstName().fake_with_rng(rng);
        let family: String = LastName().fake_with_rng(rng);
        let gender = pick(rng, &["male", "female"]);
        let npi: u64 = rng.random_range(1_000_000_000..2_000_000_000);
        let specialty: Coding = draw(self.catalog, CatalogTable::Specialties, rng)?;
        let telecom = phone(rng);

        set(&mut record, "active", json!(true));
        set(
            &mut record,
            "identifier",
            json!([{"system": NPI_SYSTEM, "value": npi.to_string()}]),
        );
        set(
            &mut record,
            "name",
            json!([{"family": family, "given": [given], "prefix": ["Dr."]}]),
        );
        set(&mut record, "gender", json!(gender));
        set(&mut record, "telecom", telecom);
        set(
            &mut record,
            "qualification",
            json!([{"code": concept(&specialty)}]),
        );
        Ok(record)
    }

    /// Subject record. Override values replace the drawn ones, which are
    /// still drawn so the stream of random values does not shift.
    pub(super) fn patient(
        &self,
        preset: Option<&SubjectOverride>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Record, GenerationError> {
        let mut record = self.start(EntityKind::Patient, rng);
        let given: String = FirstName().fake_with_rng(rng);
        let family: String = LastName().fake_with_rng(rng);
        let gender = pick(rng, &["male", "female"]);
        let age_days = rng.random_range(18 * 365..90 * 365);
        let mrn: u32 = rng.random_range(100_000..1_000_000);
        let telecom = phone(rng);
        let address = address(rng);

        let given = preset
            .and_then(|item| item.first_name.clone())
            .unwrap_or(given);
        let family = preset
            .and_then(|item| item.last_name.clone())
            .unwrap_or(family);
        let gender = preset
            .and_then(|item| item.gender)
            .map(|gender| gender.as_str())
            .unwrap_or(gender);
        let birth_date = match preset.and_then(|item| item.birth_date.as_deref()) {
            Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| {
                GenerationError::Configuration(format!("birth date '{value}': {err}"))
            })?,
            None => self.reference_date - Duration::days(age_days),
        };

        set(
            &mut record,
            "identifier",
            json!([{
                "use": "usual",
                "type": values::fixed_concept(
                    "http://terminology.hl7.org/CodeSystem/v2-0203",
                    "MR",
                    "Medical record number"
                ),
                "system": MRN_SYSTEM,
                "value": format!("MRN-{mrn}")
            }]),
        );
        set(&mut record, "active", json!(true));
        set(
            &mut record,
            "name",
            json!([{"use": "official", "family": family, "given": [given]}]),
        );
        set(&mut record, "gender", json!(gender));
        set(&mut record, "birthDate", json!(birth_date.to_string()));
        set(&mut record, "telecom", telecom);
        set(&mut record, "address", address);
        if birth_date.year() < self.reference_date.year() - 65 {
            set(
                &mut record,
                "communication",
                json!([{"language": values::text_concept("English"), "preferred": true}]),
            );
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use fhirseed_core::FhirVersion;
    use fhirseed_plan::Gender;

    use super::*;
    use crate::catalog::CatalogSet;
    use crate::factory::Preset;

    fn factory(catalog: &CatalogSet) -> RecordFactory<'_> {
        RecordFactory::new(
            catalog,
            FhirVersion::R4,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        )
    }

    #[test]
    fn location_requires_its_organization() {
        let catalog = CatalogSet::builtin().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = factory(&catalog)
            .build(EntityKind::Location, &Links::default(), None, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::MissingLink { kind: EntityKind::Location, link: "organization" }
        ));
    }

    #[test]
    fn subject_override_values_win() {
        let catalog = CatalogSet::builtin().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let subject = SubjectOverride {
            first_name: Some("Maria".to_string()),
            last_name: Some("Silva".to_string()),
            gender: Some(Gender::Female),
            birth_date: Some("1980-05-15".to_string()),
            ..SubjectOverride::default()
        };
        let record = factory(&catalog)
            .build(
                EntityKind::Patient,
                &Links::default(),
                Some(Preset::Subject(&subject)),
                &mut rng,
            )
            .unwrap();
        assert_eq!(record.body["name"][0]["given"][0], "Maria");
        assert_eq!(record.body["name"][0]["family"], "Silva");
        assert_eq!(record.body["gender"], "female");
        assert_eq!(record.body["birthDate"], "1980-05-15");
        assert!(record.references.is_empty());
    }
}
