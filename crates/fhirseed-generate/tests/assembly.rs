use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use fhirseed_core::{DependencyGraph, EntityKind, FhirVersion, RecordGraph, validate_graph};
use fhirseed_generate::{
    CatalogSet, GenerateOptions, GraphAssembler, GraphDocument, read_graph, write_graph,
};
use fhirseed_plan::{GeneratorConfig, load_config_file};
use serde_json::{Map, Value};

fn fixture(name: &str) -> GeneratorConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../fhirseed-plan/fixtures")
        .join(name);
    load_config_file(&path).expect("fixture config").config
}

fn assemble(config: &GeneratorConfig, version: FhirVersion) -> RecordGraph {
    let catalog = CatalogSet::builtin().expect("builtin catalog");
    let options = GenerateOptions {
        version,
        ..GenerateOptions::default()
    };
    GraphAssembler::new(&catalog, options)
        .assemble(config)
        .expect("assembly")
        .graph
}

fn small_config() -> GeneratorConfig {
    let mut config = GeneratorConfig::default();
    config.seed = Some(5);
    config.base_counts.clinics = 2;
    config.base_counts.practitioners = 3;
    config.base_counts.patients = 4;
    config
}

#[test]
fn single_condition_scenario() {
    let graph = assemble(&fixture("single_condition.config.json"), FhirVersion::R4);

    let counts = graph.counts();
    let expected: BTreeMap<EntityKind, usize> = [
        (EntityKind::Organization, 1),
        (EntityKind::Location, 1),
        (EntityKind::Practitioner, 1),
        (EntityKind::Patient, 1),
        (EntityKind::Condition, 1),
    ]
    .into_iter()
    .collect();
    assert_eq!(counts, expected);

    let patient = &graph.records(EntityKind::Patient)[0];
    let condition = &graph.records(EntityKind::Condition)[0];
    let subjects: Vec<_> = condition.references_to(EntityKind::Patient).collect();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].target, patient.handle());
}

#[test]
fn every_reference_resolves() {
    let graph = assemble(&small_config(), FhirVersion::R4);
    validate_graph(&graph, &DependencyGraph::healthcare()).unwrap();

    for triple in graph.reference_triples() {
        assert!(
            graph.find(triple.3, &triple.4).is_some(),
            "dangling {triple:?}"
        );
    }
}

#[test]
fn same_seed_gives_identical_output() {
    let config = small_config();
    let first = GraphDocument::render(&assemble(&config, FhirVersion::R4), None)
        .unwrap()
        .to_vec_pretty()
        .unwrap();
    let second = GraphDocument::render(&assemble(&config, FhirVersion::R4), None)
        .unwrap()
        .to_vec_pretty()
        .unwrap();
    assert_eq!(first, second);

    let mut other = config.clone();
    other.seed = Some(6);
    let third = GraphDocument::render(&assemble(&other, FhirVersion::R4), None)
        .unwrap()
        .to_vec_pretty()
        .unwrap();
    assert_ne!(first, third);
}

#[test]
fn versions_share_records_and_targets() {
    let config = small_config();
    let r4 = assemble(&config, FhirVersion::R4);
    let r5 = assemble(&config, FhirVersion::R5);

    assert_eq!(r4.counts(), r5.counts());
    let targets = |graph: &RecordGraph| -> BTreeSet<_> {
        graph
            .iter()
            .flat_map(|record| {
                record
                    .references
                    .iter()
                    .map(move |field| (record.handle(), field.target.clone()))
            })
            .collect()
    };
    assert_eq!(targets(&r4), targets(&r5));
}

/// Scalar leaves of a record body, sorted, without the values a version fixes.
fn drawn_values(kind: EntityKind, body: &Map<String, Value>) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(object) => object.values().for_each(|child| collect(child, out)),
            Value::Array(items) => items.iter().for_each(|child| collect(child, out)),
            scalar => out.push(scalar.to_string()),
        }
    }

    let fixed: &[&str] = match kind {
        EntityKind::Encounter => &["\"finished\"", "\"completed\""],
        EntityKind::Coverage => &["\"insurance\""],
        EntityKind::DocumentReference => &[
            "\"http://hl7.org/fhir/composition-attestation-mode\"",
            "\"professional\"",
            "\"Professional\"",
        ],
        _ => &[],
    };
    let mut out = Vec::new();
    body.values().for_each(|value| collect(value, &mut out));
    out.retain(|leaf| !fixed.contains(&leaf.as_str()));
    out.sort();
    out
}

#[test]
fn versions_draw_identical_content() {
    let config = small_config();
    let r4 = assemble(&config, FhirVersion::R4);
    let r5 = assemble(&config, FhirVersion::R5);

    for kind in r4.kinds() {
        let r5_records = r5.records(kind);
        assert_eq!(r4.records(kind).len(), r5_records.len(), "{kind}");
        for (left, right) in r4.records(kind).iter().zip(r5_records) {
            assert_eq!(left.local_id, right.local_id, "{kind}");
            assert_eq!(
                drawn_values(kind, &left.body),
                drawn_values(kind, &right.body),
                "{kind}/{}",
                left.local_id
            );
        }
    }
    assert!(r4.count(EntityKind::Encounter) > 0);
    assert!(r4.count(EntityKind::DocumentReference) > 0);
}

#[test]
fn overrides_drive_subject_contents() {
    let graph = assemble(&fixture("custom_subjects.config.json"), FhirVersion::R4);

    let patients = graph.records(EntityKind::Patient);
    assert_eq!(patients.len(), 2);
    assert_eq!(patients[0].body["name"][0]["family"], "Silva");
    assert_eq!(patients[0].body["birthDate"], "1980-04-12");
    assert_eq!(patients[1].body["gender"], "male");

    let per_subject = |kind: EntityKind, subject: usize| {
        let handle = patients[subject].handle();
        graph
            .records(kind)
            .iter()
            .filter(|record| record.references.iter().any(|field| field.target == handle))
            .count()
    };
    assert_eq!(per_subject(EntityKind::Condition, 0), 1);
    assert_eq!(per_subject(EntityKind::Condition, 1), 2);
    assert_eq!(per_subject(EntityKind::MedicationRequest, 0), 1);
    assert_eq!(per_subject(EntityKind::AllergyIntolerance, 0), 1);
    assert_eq!(per_subject(EntityKind::Encounter, 0), 2);
    assert_eq!(per_subject(EntityKind::Encounter, 1), 1);
    assert_eq!(per_subject(EntityKind::Appointment, 0), 1);
    assert_eq!(per_subject(EntityKind::Observation, 1), 3);
}

#[test]
fn absent_kinds_are_not_generated() {
    let mut config = small_config();
    config.per_patient.retain(|kind, _| kind.key() == "conditions");
    let graph = assemble(&config, FhirVersion::R4);

    let built: BTreeSet<EntityKind> = graph.kinds().collect();
    let expected: BTreeSet<EntityKind> = [
        EntityKind::Organization,
        EntityKind::Location,
        EntityKind::Practitioner,
        EntityKind::Patient,
        EntityKind::Condition,
    ]
    .into_iter()
    .collect();
    assert!(built.is_subset(&expected));
}

#[test]
fn empty_pools_are_rejected() {
    let mut config = small_config();
    config.base_counts.practitioners = 0;
    let catalog = CatalogSet::builtin().unwrap();
    let result = GraphAssembler::new(&catalog, GenerateOptions::default()).assemble(&config);
    assert!(result.is_err());
}

#[test]
fn report_summarizes_the_graph() {
    let config = small_config();
    let catalog = CatalogSet::builtin().unwrap();
    let assembly = GraphAssembler::new(&catalog, GenerateOptions::default())
        .assemble(&config)
        .unwrap();
    let report = &assembly.report;

    assert_eq!(report.seed, 5);
    assert_eq!(report.subjects, 4);
    assert_eq!(report.records_total, assembly.graph.len());
    assert_eq!(report.count(EntityKind::Patient), 4);
    assert_eq!(report.fingerprint.len(), 64);
    assert_eq!(report.kinds[0].kind, EntityKind::Organization);
}

#[test]
fn written_graph_reads_back() {
    let graph = assemble(&small_config(), FhirVersion::R4);
    let dir = std::env::temp_dir().join(format!("fhirseed_graph_{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("graph.json");

    write_graph(&path, &graph, None).unwrap();
    let restored = read_graph(&path, FhirVersion::R4).unwrap();

    assert_eq!(restored.counts(), graph.counts());
    assert_eq!(restored.reference_triples(), graph.reference_triples());
    let before = GraphDocument::render(&graph, None).unwrap().to_vec_pretty().unwrap();
    let after = GraphDocument::render(&restored, None).unwrap().to_vec_pretty().unwrap();
    assert_eq!(before, after);

    std::fs::remove_dir_all(&dir).ok();
}
