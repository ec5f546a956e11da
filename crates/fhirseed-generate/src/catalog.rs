use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::Rng;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::GenerationError;

const BUILTIN: &str = include_str!("../catalogs/builtin.json");

/// Reference tables the record factory draws attributes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CatalogTable {
    Conditions,
    Specialties,
    Medications,
    Procedures,
    Observations,
    EncounterClasses,
    EncounterTypes,
    EncounterReasons,
    Immunizations,
    Allergens,
    AllergyReactions,
    ServiceRequests,
    ClinicalFindings,
    CarePlans,
    DiagnosticReports,
    FamilyRelationships,
    CoverageTypes,
    DocumentTypes,
}

impl CatalogTable {
    pub const ALL: [CatalogTable; 18] = [
        CatalogTable::Conditions,
        CatalogTable::Specialties,
        CatalogTable::Medications,
        CatalogTable::Procedures,
        CatalogTable::Observations,
        CatalogTable::EncounterClasses,
        CatalogTable::EncounterTypes,
        CatalogTable::EncounterReasons,
        CatalogTable::Immunizations,
        CatalogTable::Allergens,
        CatalogTable::AllergyReactions,
        CatalogTable::ServiceRequests,
        CatalogTable::ClinicalFindings,
        CatalogTable::CarePlans,
        CatalogTable::DiagnosticReports,
        CatalogTable::FamilyRelationships,
        CatalogTable::CoverageTypes,
        CatalogTable::DocumentTypes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CatalogTable::Conditions => "conditions",
            CatalogTable::Specialties => "specialties",
            CatalogTable::Medications => "medications",
            CatalogTable::Procedures => "procedures",
            CatalogTable::Observations => "observations",
            CatalogTable::EncounterClasses => "encounter_classes",
            CatalogTable::EncounterTypes => "encounter_types",
            CatalogTable::EncounterReasons => "encounter_reasons",
            CatalogTable::Immunizations => "immunizations",
            CatalogTable::Allergens => "allergens",
            CatalogTable::AllergyReactions => "allergy_reactions",
            CatalogTable::ServiceRequests => "service_requests",
            CatalogTable::ClinicalFindings => "clinical_findings",
            CatalogTable::CarePlans => "care_plans",
            CatalogTable::DiagnosticReports => "diagnostic_reports",
            CatalogTable::FamilyRelationships => "family_relationships",
            CatalogTable::CoverageTypes => "coverage_types",
            CatalogTable::DocumentTypes => "document_types",
        }
    }
}

/// Read-only lookup of candidate attribute sets.
pub trait Catalog {
    /// Candidates in catalog order. An absent or empty table is a miss.
    fn lookup(&self, table: CatalogTable) -> Result<&[Value], GenerationError>;
}

/// Catalog tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct CatalogSet {
    tables: BTreeMap<String, Vec<Value>>,
}

impl CatalogSet {
    /// The tables compiled into the crate.
    pub fn builtin() -> Result<Self, GenerationError> {
        let tables: BTreeMap<String, Vec<Value>> = serde_json::from_str(BUILTIN)?;
        Ok(Self { tables })
    }

    pub fn from_tables(tables: BTreeMap<String, Vec<Value>>) -> Self {
        Self { tables }
    }

    /// Builtin tables, with any `<table>.json` array found under `root`
    /// replacing the table of the same name.
    pub fn with_overrides(root: &Path) -> Result<Self, GenerationError> {
        let mut catalog = Self::builtin()?;
        for table in CatalogTable::ALL {
            let path = root.join(format!("{}.json", table.name()));
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(GenerationError::Io(err)),
            };
            let values: Vec<Value> = serde_json::from_str(&contents).map_err(|err| {
                GenerationError::Configuration(format!(
                    "invalid catalog {}: {}",
                    path.display(),
                    err
                ))
            })?;
            catalog.tables.insert(table.name().to_string(), values);
        }
        Ok(catalog)
    }

    pub fn len(&self, table: CatalogTable) -> usize {
        self.tables.get(table.name()).map(Vec::len).unwrap_or(0)
    }
}

impl Catalog for CatalogSet {
    fn lookup(&self, table: CatalogTable) -> Result<&[Value], GenerationError> {
        match self.tables.get(table.name()) {
            Some(values) if !values.is_empty() => Ok(values),
            _ => Err(GenerationError::CatalogMiss(table.name().to_string())),
        }
    }
}

/// Coded value shared by most tables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategorizedCoding {
    #[serde(flatten)]
    pub coding: Coding,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MedicationEntry {
    pub name: String,
    pub text: String,
    pub dose: f64,
    pub unit: String,
    pub route: String,
    pub timing: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObservationEntry {
    #[serde(flatten)]
    pub coding: Coding,
    pub category: String,
    pub unit: String,
    pub low: f64,
    pub high: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelationshipEntry {
    #[serde(flatten)]
    pub coding: Coding,
    pub sex: String,
}

/// Draw one entry uniformly at random.
pub fn draw<T, R>(catalog: &dyn Catalog, table: CatalogTable, rng: &mut R) -> Result<T, GenerationError>
where
    T: DeserializeOwned,
    R: Rng + ?Sized,
{
    let values = catalog.lookup(table)?;
    let index = rng.random_range(0..values.len());
    decode(table, index, &values[index])
}

/// Draw up to `count` distinct entries, in draw order.
pub fn draw_distinct<T, R>(
    catalog: &dyn Catalog,
    table: CatalogTable,
    count: usize,
    rng: &mut R,
) -> Result<Vec<T>, GenerationError>
where
    T: DeserializeOwned,
    R: Rng + ?Sized,
{
    let values = catalog.lookup(table)?;
    let amount = count.min(values.len());
    rand::seq::index::sample(rng, values.len(), amount)
        .into_iter()
        .map(|index| decode(table, index, &values[index]))
        .collect()
}

fn decode<T: DeserializeOwned>(
    table: CatalogTable,
    index: usize,
    value: &Value,
) -> Result<T, GenerationError> {
    serde_json::from_value(value.clone()).map_err(|err| GenerationError::CatalogEntry {
        catalog: table.name().to_string(),
        index,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn builtin_tables_are_complete_and_well_formed() {
        let catalog = CatalogSet::builtin().expect("builtin catalog");
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for table in CatalogTable::ALL {
            assert!(catalog.len(table) > 0, "{} is empty", table.name());
        }
        for _ in 0..20 {
            draw::<Coding, _>(&catalog, CatalogTable::Conditions, &mut rng).unwrap();
            draw::<MedicationEntry, _>(&catalog, CatalogTable::Medications, &mut rng).unwrap();
            draw::<ObservationEntry, _>(&catalog, CatalogTable::Observations, &mut rng).unwrap();
            draw::<RelationshipEntry, _>(&catalog, CatalogTable::FamilyRelationships, &mut rng)
                .unwrap();
            draw::<CategorizedCoding, _>(&catalog, CatalogTable::Allergens, &mut rng).unwrap();
            draw::<CategorizedCoding, _>(&catalog, CatalogTable::DiagnosticReports, &mut rng)
                .unwrap();
        }
    }

    #[test]
    fn empty_table_is_a_miss() {
        let catalog = CatalogSet::from_tables(BTreeMap::from([(
            "conditions".to_string(),
            Vec::new(),
        )]));
        let err = catalog.lookup(CatalogTable::Conditions).unwrap_err();
        assert!(matches!(err, GenerationError::CatalogMiss(name) if name == "conditions"));
        assert!(catalog.lookup(CatalogTable::Procedures).is_err());
    }

    #[test]
    fn distinct_draws_never_repeat() {
        let catalog = CatalogSet::builtin().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let picked: Vec<Coding> =
            draw_distinct(&catalog, CatalogTable::AllergyReactions, 10, &mut rng).unwrap();
        assert_eq!(picked.len(), catalog.len(CatalogTable::AllergyReactions));
        for (idx, item) in picked.iter().enumerate() {
            assert!(!picked[idx + 1..].contains(item));
        }
    }
}
