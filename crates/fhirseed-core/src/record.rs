use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::IdentifierMap;
use crate::kind::EntityKind;
use crate::reference::{LocalId, Reference, ReferenceField};
use crate::version::FhirVersion;

/// One generated resource.
///
/// `body` holds scalar attributes only; links to other records live in
/// `references` and are written into the document at render time.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: EntityKind,
    pub local_id: LocalId,
    pub body: Map<String, Value>,
    pub references: Vec<ReferenceField>,
}

/// (kind, local id, field path, target kind, target local id)
pub type ReferenceTriple = (EntityKind, LocalId, String, EntityKind, LocalId);

impl Record {
    pub fn new(kind: EntityKind, local_id: LocalId) -> Self {
        Self {
            kind,
            local_id,
            body: Map::new(),
            references: Vec::new(),
        }
    }

    pub fn handle(&self) -> Reference {
        Reference::new(self.kind, self.local_id.clone())
    }

    pub fn references_to(&self, kind: EntityKind) -> impl Iterator<Item = &ReferenceField> {
        self.references
            .iter()
            .filter(move |field| field.target.kind == kind)
    }

    /// Rewrite every reference whose target already has a store id.
    ///
    /// Returns the number of fields linked by this call.
    pub fn link_references(&mut self, ids: &IdentifierMap) -> Result<usize> {
        let owner = self.handle();
        let mut linked = 0;
        for field in self.references.iter_mut().filter(|field| !field.is_linked()) {
            if let Some(store_id) = ids.get(field.target.kind, &field.target.local_id) {
                field.link(&owner, store_id.clone())?;
                linked += 1;
            }
        }
        Ok(linked)
    }

    pub fn is_fully_linked(&self) -> bool {
        self.references.iter().all(ReferenceField::is_linked)
    }

    /// Local serialization: own id and every reference are local ids.
    pub fn render_local(&self) -> Result<Value> {
        self.render(Some(self.local_id.as_str()), |field| {
            Ok(field.target.local_id.as_str().to_string())
        })
    }

    /// Payload for a create call. Every reference must already be linked.
    pub fn render_for_store(&self) -> Result<Value> {
        self.render(None, |field| {
            field
                .store_id()
                .map(|id| id.as_str().to_string())
                .ok_or_else(|| Error::Unresolved {
                    kind: field.target.kind,
                    local_id: field.target.local_id.clone(),
                })
        })
    }

    /// Published form: own id and references resolved through `ids`.
    pub fn render_resolved(&self, ids: &IdentifierMap) -> Result<Value> {
        let own = ids.resolve(&self.handle())?;
        self.render(Some(own.as_str()), |field| {
            Ok(ids.resolve(&field.target)?.as_str().to_string())
        })
    }

    fn render<F>(&self, own_id: Option<&str>, resolve: F) -> Result<Value>
    where
        F: Fn(&ReferenceField) -> Result<String>,
    {
        let mut document = Map::new();
        document.insert(
            "resourceType".to_string(),
            Value::String(self.kind.resource_type().to_string()),
        );
        if let Some(id) = own_id {
            document.insert("id".to_string(), Value::String(id.to_string()));
        }
        for (key, value) in &self.body {
            document.insert(key.clone(), value.clone());
        }
        for field in &self.references {
            let id = resolve(field)?;
            field.path.insert(&mut document, field.render(&id))?;
        }
        Ok(Value::Object(document))
    }
}

/// The assembled graph: records per kind in assembly order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordGraph {
    version: FhirVersion,
    records: BTreeMap<EntityKind, Vec<Record>>,
    edges: BTreeSet<(EntityKind, EntityKind)>,
}

impl RecordGraph {
    pub fn new(version: FhirVersion) -> Self {
        Self {
            version,
            records: BTreeMap::new(),
            edges: BTreeSet::new(),
        }
    }

    pub fn version(&self) -> FhirVersion {
        self.version
    }

    /// Append a record, noting the dependency edges it realizes.
    pub fn push(&mut self, record: Record) {
        for field in &record.references {
            self.edges.insert((record.kind, field.target.kind));
        }
        self.records.entry(record.kind).or_default().push(record);
    }

    pub fn records(&self, kind: EntityKind) -> &[Record] {
        self.records.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn records_mut(&mut self, kind: EntityKind) -> &mut [Record] {
        self.records
            .get_mut(&kind)
            .map(Vec::as_mut_slice)
            .unwrap_or(&mut [])
    }

    pub fn find(&self, kind: EntityKind, local_id: &LocalId) -> Option<&Record> {
        self.records(kind)
            .iter()
            .find(|record| &record.local_id == local_id)
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.records(kind).len()
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kinds holding at least one record.
    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.records
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(kind, _)| *kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values().flatten()
    }

    pub fn edges(&self) -> &BTreeSet<(EntityKind, EntityKind)> {
        &self.edges
    }

    pub fn counts(&self) -> BTreeMap<EntityKind, usize> {
        self.records
            .iter()
            .map(|(kind, records)| (*kind, records.len()))
            .collect()
    }

    pub fn reference_triples(&self) -> BTreeSet<ReferenceTriple> {
        self.iter()
            .flat_map(|record| {
                record.references.iter().map(move |field| {
                    (
                        record.kind,
                        record.local_id.clone(),
                        field.path.to_string(),
                        field.target.kind,
                        field.target.local_id.clone(),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::reference::{FieldPath, StoreId};

    fn condition() -> Record {
        let mut record = Record::new(EntityKind::Condition, LocalId::new("c1"));
        record
            .body
            .insert("clinicalStatus".to_string(), json!({"text": "active"}));
        record.references.push(ReferenceField::new(
            FieldPath::key("subject"),
            Reference::new(EntityKind::Patient, LocalId::new("p1")),
        ));
        record
    }

    #[test]
    fn local_render_uses_local_ids() {
        let rendered = condition().render_local().unwrap();
        assert_eq!(rendered["resourceType"], "Condition");
        assert_eq!(rendered["id"], "c1");
        assert_eq!(rendered["subject"]["reference"], "Patient/p1");
    }

    #[test]
    fn store_render_requires_links() {
        let mut record = condition();
        assert!(record.render_for_store().is_err());

        let mut ids = IdentifierMap::new();
        ids.insert(EntityKind::Patient, LocalId::new("p1"), StoreId::new("900"))
            .unwrap();
        assert_eq!(record.link_references(&ids).unwrap(), 1);
        assert_eq!(record.link_references(&ids).unwrap(), 0);

        let rendered = record.render_for_store().unwrap();
        assert!(rendered.get("id").is_none());
        assert_eq!(rendered["subject"]["reference"], "Patient/900");
    }

    #[test]
    fn graph_tracks_realized_edges() {
        let mut graph = RecordGraph::new(FhirVersion::R4);
        graph.push(Record::new(EntityKind::Patient, LocalId::new("p1")));
        graph.push(condition());

        assert_eq!(graph.len(), 2);
        assert!(graph.edges().contains(&(EntityKind::Condition, EntityKind::Patient)));
        assert_eq!(graph.reference_triples().len(), 1);
        assert!(graph.find(EntityKind::Patient, &LocalId::new("p1")).is_some());
    }
}
