use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use fhirseed_core::{
    DependencyGraph, EntityKind, FhirVersion, FieldPath, IdentifierMap, LocalId, PathSegment,
    Record, RecordGraph, Reference, ReferenceField,
};

use crate::errors::GenerationError;
use crate::output::atomic::write_bytes_atomic;

/// Output document: plural kind keys in publish order, records in
/// assembly order.
#[derive(Debug, Clone)]
pub struct GraphDocument {
    sections: Vec<(EntityKind, Vec<Value>)>,
}

impl GraphDocument {
    /// Render every record. Without `ids` the local ids are kept; with
    /// `ids` every id and reference must resolve to a store id.
    pub fn render(graph: &RecordGraph, ids: Option<&IdentifierMap>) -> Result<Self, GenerationError> {
        let order = DependencyGraph::healthcare().publish_order()?;
        let mut sections = Vec::new();
        for kind in order {
            let records = graph.records(kind);
            if records.is_empty() {
                continue;
            }
            let rendered = records
                .iter()
                .map(|record| match ids {
                    Some(ids) => record.render_resolved(ids),
                    None => record.render_local(),
                })
                .collect::<Result<Vec<_>, _>>()?;
            sections.push((kind, rendered));
        }
        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[(EntityKind, Vec<Value>)] {
        &self.sections
    }

    pub fn to_vec_pretty(&self) -> Result<Vec<u8>, GenerationError> {
        let mut data = serde_json::to_vec_pretty(self)?;
        data.push(b'\n');
        Ok(data)
    }
}

impl Serialize for GraphDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for (kind, records) in &self.sections {
            map.serialize_entry(kind.plural(), records)?;
        }
        map.end()
    }
}

/// Write the graph to `path` atomically. Returns the number of bytes written.
pub fn write_graph(
    path: &Path,
    graph: &RecordGraph,
    ids: Option<&IdentifierMap>,
) -> Result<u64, GenerationError> {
    let data = GraphDocument::render(graph, ids)?.to_vec_pretty()?;
    write_bytes_atomic(path, &data)?;
    Ok(data.len() as u64)
}

/// Parse a local serialization back into a graph.
pub fn read_graph(path: &Path, version: FhirVersion) -> Result<RecordGraph, GenerationError> {
    let contents = std::fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&contents)?;
    parse_graph(&document, version)
}

pub fn parse_graph(document: &Value, version: FhirVersion) -> Result<RecordGraph, GenerationError> {
    let sections = document
        .as_object()
        .ok_or_else(|| GenerationError::Document("top level must be an object".to_string()))?;

    if let Some(unknown) = sections
        .keys()
        .find(|key| EntityKind::from_plural(key).is_none())
    {
        return Err(GenerationError::Document(format!("unknown section '{unknown}'")));
    }

    let mut graph = RecordGraph::new(version);
    for kind in DependencyGraph::healthcare().publish_order()? {
        let Some(section) = sections.get(kind.plural()) else {
            continue;
        };
        let resources = section.as_array().ok_or_else(|| {
            GenerationError::Document(format!("'{}' must be an array", kind.plural()))
        })?;
        for resource in resources {
            graph.push(parse_record(kind, resource)?);
        }
    }

    Ok(graph)
}

fn parse_record(kind: EntityKind, resource: &Value) -> Result<Record, GenerationError> {
    let mut resource = resource.clone();
    let object = resource
        .as_object_mut()
        .ok_or_else(|| GenerationError::Document(format!("{kind} entry must be an object")))?;

    match object.remove("resourceType") {
        Some(Value::String(name)) if name == kind.resource_type() => {}
        other => {
            return Err(GenerationError::Document(format!(
                "expected resourceType {kind}, found {}",
                other.unwrap_or(Value::Null)
            )));
        }
    }
    let local_id = match object.remove("id") {
        Some(Value::String(id)) => LocalId::new(id),
        _ => {
            return Err(GenerationError::Document(format!("{kind} entry has no string id")));
        }
    };

    let mut references = Vec::new();
    collect_references(&resource, &mut Vec::new(), &mut references)?;
    for field in &references {
        field.path.take(&mut resource);
        prune(&mut resource, &field.path);
    }

    let body = match resource {
        Value::Object(body) => body,
        _ => Map::new(),
    };
    Ok(Record {
        kind,
        local_id,
        body,
        references,
    })
}

/// Find `{"reference": "Kind/id"}` objects and `Binary/<id>` attachment urls.
fn collect_references(
    value: &Value,
    path: &mut Vec<PathSegment>,
    out: &mut Vec<ReferenceField>,
) -> Result<(), GenerationError> {
    match value {
        Value::Object(object) => {
            if let Some(Value::String(pointer)) = object.get("reference") {
                let target = parse_pointer(pointer)?;
                out.push(ReferenceField::new(FieldPath::from_segments(path.clone()), target));
                return Ok(());
            }
            for (key, child) in object {
                path.push(PathSegment::Key(key.clone()));
                match child {
                    Value::String(url) if key == "url" && url.starts_with("Binary/") => {
                        let target = parse_pointer(url)?;
                        out.push(ReferenceField::url(
                            FieldPath::from_segments(path.clone()),
                            target,
                        ));
                    }
                    _ => collect_references(child, path, out)?,
                }
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(PathSegment::Index(index));
                collect_references(child, path, out)?;
                path.pop();
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_pointer(pointer: &str) -> Result<Reference, GenerationError> {
    let (kind, id) = pointer
        .split_once('/')
        .filter(|(_, id)| !id.is_empty())
        .ok_or_else(|| GenerationError::Document(format!("malformed reference '{pointer}'")))?;
    let kind = EntityKind::from_resource_type(kind)
        .ok_or_else(|| GenerationError::Document(format!("unknown reference kind in '{pointer}'")))?;
    Ok(Reference::new(kind, LocalId::new(id)))
}

/// Drop containers left empty once a reference was taken out of them.
fn prune(root: &mut Value, path: &FieldPath) {
    let mut current = path.parent();
    while let Some(parent) = current {
        if !parent.get(root).is_some_and(is_vacant) {
            break;
        }
        parent.take(root);
        current = parent.parent();
    }
}

fn is_vacant(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(object) => object.is_empty(),
        Value::Array(items) => items.iter().all(is_vacant),
        _ => false,
    }
}
