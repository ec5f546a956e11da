use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::kind::EntityKind;

/// Identifier assigned during assembly; valid only until publish remaps it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned by the remote store on creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed pointer at another record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub kind: EntityKind,
    pub local_id: LocalId,
}

impl Reference {
    pub fn new(kind: EntityKind, local_id: LocalId) -> Self {
        Self { kind, local_id }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.local_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a field inside a rendered resource, e.g. `participant[0].actor`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn key(key: impl Into<String>) -> Self {
        Self(vec![PathSegment::Key(key.into())])
    }

    pub fn field(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Path of the enclosing container, if any.
    pub fn parent(&self) -> Option<Self> {
        match self.0.len() {
            0 | 1 => None,
            len => Some(Self(self.0[..len - 1].to_vec())),
        }
    }

    /// Read the value at this path.
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.0 {
            current = match segment {
                PathSegment::Key(key) => current.as_object()?.get(key)?,
                PathSegment::Index(index) => current.as_array()?.get(*index)?,
            };
        }
        Some(current)
    }

    /// Write `value` at this path, creating intermediate objects and arrays.
    pub fn insert(&self, root: &mut Map<String, Value>, value: Value) -> Result<()> {
        let Some((PathSegment::Key(first), rest)) = self.0.split_first() else {
            return Err(Error::InvalidGraph(format!(
                "reference path '{self}' must start with a field name"
            )));
        };

        let mut slot = root
            .entry(first.clone())
            .or_insert_with(|| empty_container(rest.first()));
        for (position, segment) in rest.iter().enumerate() {
            let next = rest.get(position + 1);
            slot = match segment {
                PathSegment::Key(key) => {
                    if slot.is_null() {
                        *slot = Value::Object(Map::new());
                    }
                    let object = slot.as_object_mut().ok_or_else(|| self.conflict())?;
                    object
                        .entry(key.clone())
                        .or_insert_with(|| empty_container(next))
                }
                PathSegment::Index(index) => {
                    if slot.is_null() {
                        *slot = Value::Array(Vec::new());
                    }
                    let array = slot.as_array_mut().ok_or_else(|| self.conflict())?;
                    while array.len() <= *index {
                        array.push(empty_container(next));
                    }
                    &mut array[*index]
                }
            };
        }

        *slot = value;
        Ok(())
    }

    /// Remove and return the value at this path. Arrays keep their length.
    pub fn take(&self, root: &mut Value) -> Option<Value> {
        let (last, parents) = self.0.split_last()?;
        let mut current = root;
        for segment in parents {
            current = match segment {
                PathSegment::Key(key) => current.as_object_mut()?.get_mut(key)?,
                PathSegment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
            };
        }
        match last {
            PathSegment::Key(key) => current.as_object_mut()?.remove(key),
            PathSegment::Index(index) => current
                .as_array_mut()?
                .get_mut(*index)
                .map(Value::take),
        }
    }

    fn conflict(&self) -> Error {
        Error::InvalidGraph(format!("reference path '{self}' collides with an attribute"))
    }
}

fn empty_container(next: Option<&PathSegment>) -> Value {
    match next {
        Some(PathSegment::Index(_)) => Value::Array(Vec::new()),
        Some(PathSegment::Key(_)) => Value::Object(Map::new()),
        None => Value::Null,
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if position == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// How the pointer is written into the resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStyle {
    /// `{"reference": "Kind/id"}`
    #[default]
    Reference,
    /// Plain string `"Kind/id"`, as used by attachment urls.
    Url,
}

/// A reference held by a record, placed at a version-specific path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceField {
    pub path: FieldPath,
    #[serde(default)]
    pub style: ReferenceStyle,
    pub target: Reference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    store_id: Option<StoreId>,
}

impl ReferenceField {
    pub fn new(path: FieldPath, target: Reference) -> Self {
        Self {
            path,
            style: ReferenceStyle::Reference,
            target,
            store_id: None,
        }
    }

    pub fn url(path: FieldPath, target: Reference) -> Self {
        Self {
            style: ReferenceStyle::Url,
            ..Self::new(path, target)
        }
    }

    pub fn store_id(&self) -> Option<&StoreId> {
        self.store_id.as_ref()
    }

    pub fn is_linked(&self) -> bool {
        self.store_id.is_some()
    }

    /// Rewrite this reference to the target's store id. Allowed once.
    pub fn link(&mut self, owner: &Reference, store_id: StoreId) -> Result<()> {
        if self.store_id.is_some() {
            return Err(Error::AlreadyLinked {
                kind: owner.kind,
                local_id: owner.local_id.clone(),
                path: self.path.to_string(),
            });
        }
        self.store_id = Some(store_id);
        Ok(())
    }

    pub(crate) fn render(&self, id: &str) -> Value {
        let pointer = format!("{}/{}", self.target.kind, id);
        match self.style {
            ReferenceStyle::Reference => {
                let mut object = Map::new();
                object.insert("reference".to_string(), Value::String(pointer));
                Value::Object(object)
            }
            ReferenceStyle::Url => Value::String(pointer),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn insert_merges_into_existing_array_entries() {
        let mut body = json!({"participant": [{"status": "accepted"}]})
            .as_object()
            .cloned()
            .unwrap();
        let path = FieldPath::key("participant").index(0).field("actor");
        path.insert(&mut body, json!({"reference": "Practitioner/p1"}))
            .unwrap();

        assert_eq!(
            Value::Object(body),
            json!({"participant": [{"status": "accepted", "actor": {"reference": "Practitioner/p1"}}]})
        );
    }

    #[test]
    fn insert_builds_missing_containers() {
        let mut body = Map::new();
        let path = FieldPath::key("context").field("encounter").index(1);
        path.insert(&mut body, json!("x")).unwrap();
        assert_eq!(Value::Object(body), json!({"context": {"encounter": [null, "x"]}}));
    }

    #[test]
    fn insert_rejects_collisions_with_scalars() {
        let mut body = json!({"subject": "text"}).as_object().cloned().unwrap();
        let path = FieldPath::key("subject").field("reference");
        assert!(path.insert(&mut body, json!("Patient/1")).is_err());
    }

    #[test]
    fn take_and_display() {
        let mut value = json!({"result": [{"reference": "Observation/a"}, {"reference": "Observation/b"}]});
        let path = FieldPath::key("result").index(1);
        assert_eq!(path.to_string(), "result[1]");
        assert_eq!(path.take(&mut value), Some(json!({"reference": "Observation/b"})));
        assert_eq!(path.get(&value), Some(&Value::Null));
    }

    #[test]
    fn parent_drops_the_last_segment() {
        let path = FieldPath::key("performer").index(0).field("actor");
        assert_eq!(path.parent().map(|parent| parent.to_string()), Some("performer[0]".to_string()));
        assert_eq!(FieldPath::key("subject").parent(), None);
    }

    #[test]
    fn link_only_once() {
        let owner = Reference::new(EntityKind::Condition, LocalId::new("c1"));
        let mut field = ReferenceField::new(
            FieldPath::key("subject"),
            Reference::new(EntityKind::Patient, LocalId::new("p1")),
        );
        field.link(&owner, StoreId::new("42")).unwrap();
        assert!(matches!(
            field.link(&owner, StoreId::new("43")),
            Err(Error::AlreadyLinked { .. })
        ));
        assert_eq!(field.store_id().map(StoreId::as_str), Some("42"));
    }
}
