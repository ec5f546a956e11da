use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use fhirseed_core::{
    DependencyGraph, EntityKind, FhirVersion, FieldPath, LocalId, Record, RecordGraph, Reference,
    ReferenceField,
};
use fhirseed_generate::{
    CatalogSet, GenerateOptions, GraphAssembler, GraphDocument, read_graph, write_graph,
};
use fhirseed_plan::validate_config;
use fhirseed_publish::{
    FailureClass, Issue, MemoryStore, OnError, PublishOptions, Publisher, RecordState,
    StoreBehavior,
};

fn assemble(config: serde_json::Value) -> RecordGraph {
    let config = validate_config(&config).expect("valid config").config;
    let catalog = CatalogSet::builtin().unwrap();
    GraphAssembler::new(&catalog, GenerateOptions::default())
        .assemble(&config)
        .unwrap()
        .graph
}

fn single_condition() -> RecordGraph {
    assemble(json!({
        "seed": 7,
        "base_counts": {"clinics": 1, "practitioners": 1, "patients": 1},
        "per_patient": {"conditions": {"min": 1, "max": 1}}
    }))
}

fn linked(kind: EntityKind, id: &str, path: &str, target: EntityKind, target_id: &str) -> Record {
    let mut record = Record::new(kind, LocalId::new(id));
    record.references.push(ReferenceField::new(
        FieldPath::key(path),
        Reference::new(target, LocalId::new(target_id)),
    ));
    record
}

fn reduced_graph(subjects: usize, events_per_subject: usize) -> RecordGraph {
    let mut graph = RecordGraph::new(FhirVersion::R4);
    for subject in 0..subjects {
        let patient = format!("p{subject}");
        graph.push(Record::new(EntityKind::Patient, LocalId::new(&patient)));
        for event in 0..events_per_subject {
            let encounter = format!("e{subject}_{event}");
            graph.push(linked(EntityKind::Encounter, &encounter, "subject", EntityKind::Patient, &patient));
            graph.push(linked(
                EntityKind::Observation,
                &format!("o{subject}_{event}"),
                "encounter",
                EntityKind::Encounter,
                &encounter,
            ));
        }
    }
    graph
}

#[tokio::test]
async fn kinds_are_created_in_dependency_order() {
    let dag = DependencyGraph::from_edges(
        [EntityKind::Patient, EntityKind::Encounter, EntityKind::Observation],
        [
            (EntityKind::Encounter, EntityKind::Patient),
            (EntityKind::Observation, EntityKind::Encounter),
        ],
    );

    for (subjects, events) in [(1, 1), (3, 2), (5, 4)] {
        let store = Arc::new(MemoryStore::new());
        let options = PublishOptions {
            concurrency: 4,
            ..PublishOptions::default()
        };
        let outcome = Publisher::new(store.clone(), options)
            .with_dag(dag.clone())
            .publish(reduced_graph(subjects, events))
            .await
            .unwrap();
        assert!(outcome.report.is_success());

        let order = store.submissions();
        let last_patient = order.iter().rposition(|kind| *kind == EntityKind::Patient).unwrap();
        let first_encounter = order.iter().position(|kind| *kind == EntityKind::Encounter).unwrap();
        let last_encounter = order.iter().rposition(|kind| *kind == EntityKind::Encounter).unwrap();
        let first_observation = order
            .iter()
            .position(|kind| *kind == EntityKind::Observation)
            .unwrap();
        assert!(last_patient < first_encounter);
        assert!(last_encounter < first_observation);
        assert!(store.peak_in_flight() <= 4);
    }
}

#[tokio::test]
async fn references_point_at_store_ids_after_publishing() {
    let graph = single_condition();
    let patient = graph.records(EntityKind::Patient)[0].handle();
    let condition = graph.records(EntityKind::Condition)[0].handle();

    let store = Arc::new(MemoryStore::new());
    let outcome = Publisher::new(store.clone(), PublishOptions::default())
        .publish(graph)
        .await
        .unwrap();

    assert!(outcome.report.is_success());
    assert!(outcome.report.probe_ok);
    assert_eq!(outcome.ids.len(), 5);
    assert_eq!(outcome.state(&condition), Some(RecordState::Linked));

    let patient_id = outcome.ids.resolve(&patient).unwrap();
    let condition_id = outcome.ids.resolve(&condition).unwrap();
    assert_ne!(patient_id.as_str(), patient.local_id.as_str());

    let stored = store.get(EntityKind::Condition, condition_id).unwrap();
    assert_eq!(stored["subject"]["reference"], format!("Patient/{patient_id}"));

    let document = GraphDocument::render(&outcome.graph, Some(&outcome.ids)).unwrap();
    let text = String::from_utf8(document.to_vec_pretty().unwrap()).unwrap();
    assert!(!text.contains(patient.local_id.as_str()));
    assert!(text.contains(&format!("Patient/{patient_id}")));
}

#[tokio::test]
async fn rejected_subject_stops_the_run() {
    let graph = single_condition();
    let condition = graph.records(EntityKind::Condition)[0].handle();
    let store = Arc::new(
        MemoryStore::new().with_behavior(
            EntityKind::Patient,
            StoreBehavior::Reject(vec![Issue::error("birthDate is not valid")]),
        ),
    );

    let outcome = Publisher::new(store.clone(), PublishOptions::default())
        .publish(graph)
        .await
        .unwrap();

    let failures = &outcome.report.failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, EntityKind::Patient);
    assert_eq!(failures[0].class, FailureClass::StoreRejection);
    assert!(failures[0].diagnostic.contains("birthDate"));
    assert!(outcome.report.aborted);
    assert!(!store.submissions().contains(&EntityKind::Condition));
    assert_eq!(outcome.state(&condition), Some(RecordState::Pending));
    assert_eq!(outcome.report.outcome(EntityKind::Condition).unwrap().skipped, 1);
    // Pools published before the failure stay in the store.
    assert_eq!(store.count(EntityKind::Organization), 1);
}

#[tokio::test]
async fn warnings_are_recorded_without_blocking() {
    let store = Arc::new(MemoryStore::new().with_behavior(
        EntityKind::Condition,
        StoreBehavior::Warn(vec![
            Issue::warning("Code I10 not found in the ValueSet").at("Condition.code"),
            Issue::warning("Unable to expand ValueSet: cannot apply filters 'concept is-a'"),
            Issue::new(fhirseed_publish::Severity::Information, "all good"),
        ]),
    ));

    let outcome = Publisher::new(store, PublishOptions::default())
        .publish(single_condition())
        .await
        .unwrap();

    assert!(outcome.report.is_success());
    assert_eq!(outcome.report.warnings.len(), 1);
    assert_eq!(outcome.report.warnings[0].path.as_deref(), Some("Condition.code"));
    assert_eq!(outcome.report.outcome(EntityKind::Condition).unwrap().created, 1);
}

#[tokio::test]
async fn validation_issues_never_block() {
    let store = Arc::new(MemoryStore::new().with_validation(
        EntityKind::Patient,
        vec![Issue::error("Profile could not be resolved")],
    ));
    let options = PublishOptions {
        validate: true,
        ..PublishOptions::default()
    };

    let outcome = Publisher::new(store, options)
        .publish(single_condition())
        .await
        .unwrap();

    assert!(outcome.report.is_success());
    assert_eq!(outcome.report.warnings.len(), 1);
    assert_eq!(outcome.report.warnings[0].stage, "validate");
}

#[tokio::test]
async fn slow_store_calls_time_out() {
    let store = Arc::new(MemoryStore::new().with_behavior(
        EntityKind::Practitioner,
        StoreBehavior::Delay(Duration::from_secs(3)),
    ));
    let options = PublishOptions {
        timeout_secs: 1,
        ..PublishOptions::default()
    };

    let outcome = Publisher::new(store.clone(), options)
        .publish(single_condition())
        .await
        .unwrap();

    assert_eq!(outcome.report.failures.len(), 1);
    assert_eq!(outcome.report.failures[0].kind, EntityKind::Practitioner);
    assert_eq!(outcome.report.failures[0].class, FailureClass::TransportFailure);
    assert_eq!(store.count(EntityKind::Practitioner), 0);
}

#[tokio::test]
async fn continue_mode_publishes_independent_branches() {
    let graph = assemble(json!({
        "seed": 3,
        "base_counts": {"clinics": 1, "practitioners": 2, "patients": 2},
        "per_patient": {
            "conditions": 1,
            "encounters": {"min": 1, "max": 1, "document_reference_probability": 1.0}
        }
    }));
    let store = Arc::new(MemoryStore::new().with_behavior(EntityKind::Encounter, StoreBehavior::Unreachable));
    let options = PublishOptions {
        on_error: OnError::Continue,
        ..PublishOptions::default()
    };

    let outcome = Publisher::new(store.clone(), options).publish(graph).await.unwrap();
    let report = &outcome.report;

    assert!(!report.aborted);
    assert_eq!(store.count(EntityKind::Condition), 2);
    assert_eq!(store.count(EntityKind::Binary), 2);
    assert_eq!(report.outcome(EntityKind::Encounter).unwrap().failed, 2);
    let documents = report.outcome(EntityKind::DocumentReference).unwrap();
    assert_eq!(documents.failed, 2);
    assert!(report
        .failures
        .iter()
        .filter(|failure| failure.kind == EntityKind::DocumentReference)
        .all(|failure| failure.class == FailureClass::DependencyFailed));
    assert!(!store.submissions().contains(&EntityKind::DocumentReference));
}

#[tokio::test]
async fn appointments_are_verified() {
    let graph = assemble(json!({
        "seed": 9,
        "base_counts": {"clinics": 1, "practitioners": 1, "patients": 2},
        "per_patient": {"appointments": 2}
    }));
    let options = PublishOptions {
        verify: true,
        ..PublishOptions::default()
    };

    let outcome = Publisher::new(Arc::new(MemoryStore::new()), options)
        .publish(graph)
        .await
        .unwrap();

    assert!(outcome.report.is_success());
    assert!(outcome.report.verification.is_empty());
    assert_eq!(outcome.report.outcome(EntityKind::Appointment).unwrap().created, 4);
}

#[tokio::test]
async fn zero_concurrency_is_rejected() {
    let options = PublishOptions {
        concurrency: 0,
        ..PublishOptions::default()
    };
    let result = Publisher::new(Arc::new(MemoryStore::new()), options)
        .publish(single_condition())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn zero_timeout_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let options = PublishOptions {
        timeout_secs: 0,
        ..PublishOptions::default()
    };
    let result = Publisher::new(store.clone(), options)
        .publish(single_condition())
        .await;
    assert!(result.is_err());
    assert!(store.submissions().is_empty());
}

#[tokio::test]
async fn graph_read_from_file_publishes() {
    let config = validate_config(&json!({
        "seed": 11,
        "base_counts": {"clinics": 2, "practitioners": 3, "patients": 3},
        "per_patient": {
            "encounters": {"min": 1, "max": 2, "document_reference_probability": 1.0},
            "observations": {"min": 2, "max": 3},
            "diagnostic_reports": {"min": 1, "max": 1},
            "appointments": {"min": 1, "max": 1},
            "coverages": {"min": 1, "max": 1, "policy_holder_probability": 1.0}
        }
    }))
    .expect("valid config")
    .config;
    let catalog = CatalogSet::builtin().unwrap();
    let options = GenerateOptions {
        version: FhirVersion::R5,
        ..GenerateOptions::default()
    };
    let assembled = GraphAssembler::new(&catalog, options)
        .assemble(&config)
        .unwrap()
        .graph;

    let dir = std::env::temp_dir().join(format!("fhirseed_input_{}", uuid::Uuid::new_v4()));
    let path = dir.join("graph.json");
    write_graph(&path, &assembled, None).unwrap();
    let graph = read_graph(&path, FhirVersion::R5).unwrap();
    assert_eq!(graph.counts(), assembled.counts());

    let store = Arc::new(MemoryStore::new());
    let outcome = Publisher::new(store.clone(), PublishOptions::default())
        .publish(graph)
        .await
        .unwrap();

    assert!(outcome.report.failures.is_empty());
    assert_eq!(outcome.ids.len(), assembled.len());
    assert_eq!(store.count(EntityKind::Patient), 3);
    assert!(store.count(EntityKind::Binary) > 0);
    assert!(outcome
        .states
        .values()
        .all(|state| *state == RecordState::Linked));

    std::fs::remove_dir_all(&dir).ok();
}
