use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::identifiers::IdentifierMap;
use crate::kind::EntityKind;
use crate::record::RecordGraph;
use crate::reference::LocalId;

/// Validate referential consistency of a record graph.
///
/// This checks:
/// - duplicate local ids within a kind
/// - references along edges the dependency graph does not allow
/// - references whose target record is missing (dangling)
pub fn validate_graph(graph: &RecordGraph, dag: &DependencyGraph) -> Result<()> {
    let mut catalog: BTreeMap<EntityKind, BTreeSet<&LocalId>> = BTreeMap::new();

    for kind in graph.kinds() {
        let mut ids = BTreeSet::new();
        for record in graph.records(kind) {
            if !ids.insert(&record.local_id) {
                return Err(Error::InvalidGraph(format!(
                    "duplicate local id: {}/{}",
                    kind, record.local_id
                )));
            }
        }
        catalog.insert(kind, ids);
    }

    for record in graph.iter() {
        for field in &record.references {
            if !dag.allows(record.kind, field.target.kind) {
                return Err(Error::InvalidGraph(format!(
                    "{}/{} field {} references {} which {} may not depend on",
                    record.kind, record.local_id, field.path, field.target.kind, record.kind
                )));
            }

            let exists = catalog
                .get(&field.target.kind)
                .is_some_and(|ids| ids.contains(&field.target.local_id));
            if !exists {
                return Err(Error::InvalidGraph(format!(
                    "dangling reference: {}/{} field {} points at missing {}",
                    record.kind, record.local_id, field.path, field.target
                )));
            }
        }
    }

    Ok(())
}

/// Check that every linked reference agrees with the identifier map.
pub fn validate_links(graph: &RecordGraph, ids: &IdentifierMap) -> Result<()> {
    for record in graph.iter() {
        for field in &record.references {
            let Some(linked) = field.store_id() else {
                continue;
            };
            let expected = ids.resolve(&field.target)?;
            if linked != expected {
                return Err(Error::InvalidGraph(format!(
                    "{}/{} field {} linked to {} but {} was created as {}",
                    record.kind, record.local_id, field.path, linked, field.target, expected
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::reference::{FieldPath, Reference, ReferenceField};
    use crate::version::FhirVersion;

    fn condition_for(patient: &str) -> Record {
        let mut record = Record::new(EntityKind::Condition, LocalId::new("c1"));
        record.references.push(ReferenceField::new(
            FieldPath::key("subject"),
            Reference::new(EntityKind::Patient, LocalId::new(patient)),
        ));
        record
    }

    #[test]
    fn accepts_resolved_references() {
        let mut graph = RecordGraph::new(FhirVersion::R4);
        graph.push(Record::new(EntityKind::Patient, LocalId::new("p1")));
        graph.push(condition_for("p1"));
        validate_graph(&graph, &DependencyGraph::healthcare()).unwrap();
    }

    #[test]
    fn rejects_dangling_references() {
        let mut graph = RecordGraph::new(FhirVersion::R4);
        graph.push(Record::new(EntityKind::Patient, LocalId::new("p1")));
        graph.push(condition_for("p2"));
        let err = validate_graph(&graph, &DependencyGraph::healthcare()).unwrap_err();
        assert!(err.to_string().contains("dangling"));
    }

    #[test]
    fn rejects_edges_outside_the_dag() {
        let mut graph = RecordGraph::new(FhirVersion::R4);
        let mut patient = Record::new(EntityKind::Patient, LocalId::new("p1"));
        patient.references.push(ReferenceField::new(
            FieldPath::key("generalPractitioner").index(0),
            Reference::new(EntityKind::Condition, LocalId::new("c1")),
        ));
        graph.push(patient);
        graph.push(condition_for("p1"));
        assert!(validate_graph(&graph, &DependencyGraph::healthcare()).is_err());
    }

    #[test]
    fn rejects_duplicate_local_ids() {
        let mut graph = RecordGraph::new(FhirVersion::R4);
        graph.push(Record::new(EntityKind::Patient, LocalId::new("p1")));
        graph.push(Record::new(EntityKind::Patient, LocalId::new("p1")));
        assert!(validate_graph(&graph, &DependencyGraph::healthcare()).is_err());
    }
}
