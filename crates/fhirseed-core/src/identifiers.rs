use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kind::EntityKind;
use crate::reference::{LocalId, Reference, StoreId};

/// Mapping from (kind, local id) to the id the store assigned.
///
/// An entry exists exactly when the record was created at the store, so
/// entries are only ever added, and each key at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMap {
    entries: BTreeMap<(EntityKind, LocalId), StoreId>,
}

/// Flat form used when the map is written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierEntry {
    pub kind: EntityKind,
    pub local_id: LocalId,
    pub store_id: StoreId,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, local_id: LocalId, store_id: StoreId) -> Result<()> {
        let key = (kind, local_id);
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateIdentifier {
                kind,
                local_id: key.1,
            });
        }
        self.entries.insert(key, store_id);
        Ok(())
    }

    pub fn get(&self, kind: EntityKind, local_id: &LocalId) -> Option<&StoreId> {
        self.entries.get(&(kind, local_id.clone()))
    }

    pub fn resolve(&self, reference: &Reference) -> Result<&StoreId> {
        self.get(reference.kind, &reference.local_id)
            .ok_or_else(|| Error::Unresolved {
                kind: reference.kind,
                local_id: reference.local_id.clone(),
            })
    }

    pub fn contains(&self, kind: EntityKind, local_id: &LocalId) -> bool {
        self.get(kind, local_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entries.keys().filter(|(entry_kind, _)| *entry_kind == kind).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, &LocalId, &StoreId)> {
        self.entries
            .iter()
            .map(|((kind, local_id), store_id)| (*kind, local_id, store_id))
    }

    pub fn to_entries(&self) -> Vec<IdentifierEntry> {
        self.iter()
            .map(|(kind, local_id, store_id)| IdentifierEntry {
                kind,
                local_id: local_id.clone(),
                store_id: store_id.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_for_same_key_fails() {
        let mut ids = IdentifierMap::new();
        ids.insert(EntityKind::Patient, LocalId::new("a"), StoreId::new("1"))
            .unwrap();
        let err = ids
            .insert(EntityKind::Patient, LocalId::new("a"), StoreId::new("2"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentifier { .. }));
        assert_eq!(
            ids.get(EntityKind::Patient, &LocalId::new("a")),
            Some(&StoreId::new("1"))
        );
    }

    #[test]
    fn same_local_id_under_different_kinds_is_distinct() {
        let mut ids = IdentifierMap::new();
        ids.insert(EntityKind::Patient, LocalId::new("a"), StoreId::new("1"))
            .unwrap();
        ids.insert(EntityKind::Condition, LocalId::new("a"), StoreId::new("2"))
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.count(EntityKind::Condition), 1);
    }
}
