use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use fhirseed_core::{EntityKind, StoreId};

use crate::transport::{Created, Issue, StoreError, StoreTransport};

/// Scripted response for every create of one kind.
#[derive(Debug, Clone)]
pub enum StoreBehavior {
    /// Reject with these issues.
    Reject(Vec<Issue>),
    /// Create, attaching these issues to the response.
    Warn(Vec<Issue>),
    /// Wait before answering.
    Delay(Duration),
    /// Fail as if the connection dropped.
    Unreachable,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    resources: BTreeMap<(EntityKind, String), Value>,
    submissions: Vec<EntityKind>,
    behaviors: BTreeMap<EntityKind, StoreBehavior>,
    validation: BTreeMap<EntityKind, Vec<Issue>>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// In-process store. Assigns numeric ids and rejects any resource that
/// points at something it does not hold.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(self, kind: EntityKind, behavior: StoreBehavior) -> Self {
        self.lock().behaviors.insert(kind, behavior);
        self
    }

    pub fn with_validation(self, kind: EntityKind, issues: Vec<Issue>) -> Self {
        self.lock().validation.insert(kind, issues);
        self
    }

    /// Kinds of every create call, in arrival order, failed ones included.
    pub fn submissions(&self) -> Vec<EntityKind> {
        self.lock().submissions.clone()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.lock()
            .resources
            .keys()
            .filter(|(stored, _)| *stored == kind)
            .count()
    }

    pub fn get(&self, kind: EntityKind, store_id: &StoreId) -> Option<Value> {
        self.lock()
            .resources
            .get(&(kind, store_id.as_str().to_string()))
            .cloned()
    }

    /// Most creates that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.lock().peak_in_flight
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates currently running.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    fn begin(&self, kind: EntityKind) -> (InFlight<'_>, Option<StoreBehavior>) {
        let mut state = self.lock();
        state.submissions.push(kind);
        state.in_flight += 1;
        state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        let behavior = state.behaviors.get(&kind).cloned();
        (InFlight { store: self }, behavior)
    }

    fn store(&self, kind: EntityKind, resource: &Value) -> Result<Created, StoreError> {
        let mut state = self.lock();
        let mut pointers = BTreeSet::new();
        collect_pointers(resource, &mut pointers);
        for pointer in &pointers {
            let known = pointer.split_once('/').is_some_and(|(name, id)| {
                EntityKind::from_resource_type(name)
                    .is_some_and(|target| state.resources.contains_key(&(target, id.to_string())))
            });
            if !known {
                return Err(StoreError::rejected(
                    Issue::error(format!("reference {pointer} does not exist"))
                        .at(format!("{kind}")),
                ));
            }
        }
        if resource.get("resourceType").and_then(Value::as_str) != Some(kind.resource_type()) {
            return Err(StoreError::rejected(Issue::error(format!(
                "expected a {kind} resource"
            ))));
        }

        state.next_id += 1;
        let id = state.next_id.to_string();
        let mut stored = resource.clone();
        if let Some(object) = stored.as_object_mut() {
            object.insert("id".to_string(), Value::String(id.clone()));
        }
        state.resources.insert((kind, id.clone()), stored);

        let issues = match state.behaviors.get(&kind) {
            Some(StoreBehavior::Warn(issues)) => issues.clone(),
            _ => Vec::new(),
        };
        Ok(Created {
            store_id: StoreId::new(id),
            issues,
        })
    }
}

#[async_trait]
impl StoreTransport for MemoryStore {
    async fn create(&self, kind: EntityKind, resource: &Value) -> Result<Created, StoreError> {
        let (_in_flight, behavior) = self.begin(kind);

        match behavior {
            Some(StoreBehavior::Reject(issues)) => Err(StoreError::Rejection { issues }),
            Some(StoreBehavior::Unreachable) => {
                Err(StoreError::Transport("connection refused".to_string()))
            }
            Some(StoreBehavior::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                self.store(kind, resource)
            }
            Some(StoreBehavior::Warn(_)) | None => {
                tokio::task::yield_now().await;
                self.store(kind, resource)
            }
        }
    }

    async fn search(
        &self,
        kind: EntityKind,
        query: &[(&str, &str)],
    ) -> Result<Vec<Value>, StoreError> {
        let limit = query
            .iter()
            .find(|(name, _)| *name == "_count")
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        Ok(self
            .lock()
            .resources
            .iter()
            .filter(|((stored, _), _)| *stored == kind)
            .map(|(_, resource)| resource.clone())
            .take(limit)
            .collect())
    }

    async fn validate(&self, kind: EntityKind, _resource: &Value) -> Result<Vec<Issue>, StoreError> {
        Ok(self.lock().validation.get(&kind).cloned().unwrap_or_default())
    }

    async fn delete(&self, kind: EntityKind, store_id: &StoreId) -> Result<(), StoreError> {
        match self
            .lock()
            .resources
            .remove(&(kind, store_id.as_str().to_string()))
        {
            Some(_) => Ok(()),
            None => Err(StoreError::rejected(Issue::error(format!(
                "{kind}/{store_id} not found"
            )))),
        }
    }
}

/// Counts one running create until dropped, cancelled calls included.
struct InFlight<'s> {
    store: &'s MemoryStore,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.store.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

fn collect_pointers(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(object) => {
            for (key, child) in object {
                match child {
                    Value::String(pointer) if key == "reference" => {
                        out.insert(pointer.clone());
                    }
                    Value::String(url) if key == "url" && url.starts_with("Binary/") => {
                        out.insert(url.clone());
                    }
                    _ => collect_pointers(child, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_pointers(item, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn unknown_references_are_rejected() {
        let store = MemoryStore::new();
        let patient = store
            .create(EntityKind::Patient, &json!({"resourceType": "Patient"}))
            .await
            .unwrap();

        let good = json!({
            "resourceType": "Condition",
            "subject": {"reference": format!("Patient/{}", patient.store_id)}
        });
        store.create(EntityKind::Condition, &good).await.unwrap();

        let bad = json!({"resourceType": "Condition", "subject": {"reference": "Patient/nope"}});
        let err = store.create(EntityKind::Condition, &bad).await.unwrap_err();
        assert!(err.to_string().contains("Patient/nope"));
        assert_eq!(store.count(EntityKind::Condition), 1);
    }

    #[tokio::test]
    async fn search_honours_count() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store
                .create(EntityKind::Patient, &json!({"resourceType": "Patient"}))
                .await
                .unwrap();
        }
        let found = store.search(EntityKind::Patient, &[("_count", "1")]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], "1");
    }

    #[tokio::test]
    async fn deleted_records_are_gone() {
        let store = MemoryStore::new();
        let created = store
            .create(EntityKind::Patient, &json!({"resourceType": "Patient"}))
            .await
            .unwrap();

        store.delete(EntityKind::Patient, &created.store_id).await.unwrap();
        assert_eq!(store.count(EntityKind::Patient), 0);
        assert!(store.delete(EntityKind::Patient, &created.store_id).await.is_err());
    }

    #[tokio::test]
    async fn cancelled_creates_leave_no_count_behind() {
        let store = MemoryStore::new()
            .with_behavior(EntityKind::Patient, StoreBehavior::Delay(Duration::from_secs(5)));
        let patient = json!({"resourceType": "Patient"});
        let create = store.create(EntityKind::Patient, &patient);
        let timed_out = tokio::time::timeout(Duration::from_millis(20), create).await;

        assert!(timed_out.is_err());
        assert_eq!(store.in_flight(), 0);
        assert_eq!(store.peak_in_flight(), 1);
        assert_eq!(store.count(EntityKind::Patient), 0);
    }
}
