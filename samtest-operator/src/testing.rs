//! In-memory cluster for tests.
//!
//! [`InMemoryCluster`] implements [`ClusterClient`] over a map of JSON
//! documents. It assigns uids and resourceVersions, rejects writes carrying a
//! stale resourceVersion with a 409, journals every write and event, and can
//! be told to fail selected verbs.
//!
//! ```
//! use samtest_operator::testing::{Failure, InMemoryCluster, Verb};
//!
//! let cluster = InMemoryCluster::new();
//! cluster.fail(Failure::new(Verb::Create).kind("Service"));
//! assert_eq!(cluster.write_count(), 0);
//! ```

use crate::controller::{ClusterClient, EventKind, EventTemplate};
use crate::crd::Samtest;
use crate::error::{OperatorError, OperatorResult};
use crate::resources::ManagedObject;
use async_trait::async_trait;
use kube::core::ErrorResponse;
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// API verbs the cluster serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Read an object or record.
    Get,
    /// Create an object.
    Create,
    /// Replace an object.
    Update,
    /// Write the status of a record.
    UpdateStatus,
    /// Publish an event.
    Event,
}

/// A failure rule. Matching calls return an API error instead of executing.
#[derive(Debug, Clone)]
pub struct Failure {
    verb: Verb,
    kind: Option<String>,
    code: u16,
}

impl Failure {
    /// Fail every call of `verb` with HTTP 500.
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            kind: None,
            code: 500,
        }
    }

    /// Restrict the rule to one kind, e.g. `"Service"` or `"Samtest"`.
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Use a different HTTP status code.
    pub fn code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    fn matches(&self, verb: Verb, kind: &str) -> bool {
        self.verb == verb && self.kind.as_deref().is_none_or(|k| k == kind)
    }
}

/// A successful write, as journaled by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    /// Verb used.
    pub verb: Verb,
    /// Kind written.
    pub kind: String,
    /// Object name.
    pub name: String,
}

/// An event published on a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Name of the record the event is attached to.
    pub record: String,
    /// Severity.
    pub kind: EventKind,
    /// Event reason.
    pub reason: String,
    /// Event message.
    pub message: String,
}

type Key = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, serde_json::Value>,
    next_uid: u64,
    next_version: u64,
    writes: Vec<Write>,
    events: Vec<RecordedEvent>,
    failures: Vec<Failure>,
}

impl State {
    fn check(&self, verb: Verb, kind: &str) -> OperatorResult<()> {
        match self.failures.iter().find(|f| f.matches(verb, kind)) {
            Some(f) => Err(api_error(
                f.code,
                "InternalError",
                format!("injected {verb:?} failure for {kind}"),
            )),
            None => Ok(()),
        }
    }

    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn assign_uid(&mut self) -> String {
        self.next_uid += 1;
        format!("00000000-0000-0000-0000-{:012}", self.next_uid)
    }

    fn load<K>(&self, key: &Key) -> OperatorResult<Option<K>>
    where
        K: DeserializeOwned,
    {
        self.objects
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(OperatorError::from)
    }

    fn store<K: Serialize>(&mut self, key: Key, object: &K) -> OperatorResult<()> {
        self.objects.insert(key, serde_json::to_value(object)?);
        Ok(())
    }

    /// Fail with 409 unless `incoming` is absent or equals the stored version.
    fn check_version<K: Resource>(
        &self,
        kind: &str,
        stored: &K,
        incoming: &K,
    ) -> OperatorResult<()> {
        match incoming.resource_version() {
            Some(v) if Some(&v) != stored.meta().resource_version.as_ref() => Err(api_error(
                409,
                "Conflict",
                format!(
                    "Operation cannot be fulfilled on {kind} \"{}\": the object has been modified",
                    stored.name_any()
                ),
            )),
            _ => Ok(()),
        }
    }
}

fn api_error(code: u16, reason: &str, message: String) -> OperatorError {
    OperatorError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message,
        reason: reason.into(),
        code,
    }))
}

fn key_of<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> Key {
    (
        K::kind(&()).into_owned(),
        namespace.to_string(),
        name.to_string(),
    )
}

/// In-memory [`ClusterClient`].
#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    /// An empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a Samtest as if a user had applied it. Not journaled.
    ///
    /// Missing uid and generation are filled in; the resourceVersion is
    /// always assigned by the cluster.
    pub fn insert_record(&self, mut record: Samtest) -> Samtest {
        let mut state = self.state.lock();
        if record.metadata.uid.is_none() {
            record.metadata.uid = Some(state.assign_uid());
        }
        record.metadata.generation.get_or_insert(1);
        record.metadata.resource_version = Some(state.bump_version());

        let key = key_of::<Samtest>(&record.namespace().unwrap_or_default(), &record.name_any());
        if let Ok(value) = serde_json::to_value(&record) {
            state.objects.insert(key, value);
        }
        record
    }

    /// Store an object as if another actor had created it. Not journaled.
    pub fn insert<K: ManagedObject>(&self, mut object: K) -> K {
        let mut state = self.state.lock();
        let meta = object.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(state.assign_uid());
        }
        meta.resource_version = Some(state.bump_version());

        let key = key_of::<K>(&object.namespace().unwrap_or_default(), &object.name_any());
        if let Ok(value) = serde_json::to_value(&object) {
            state.objects.insert(key, value);
        }
        object
    }

    /// Current state of a Samtest.
    pub fn record(&self, namespace: &str, name: &str) -> Option<Samtest> {
        self.object(namespace, name)
    }

    /// Current state of an object.
    pub fn object<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.state
            .lock()
            .load(&key_of::<K>(namespace, name))
            .ok()
            .flatten()
    }

    /// Edit an object in place as another actor would. Bumps the
    /// resourceVersion. Not journaled. Returns false if the object is absent.
    pub fn modify<K, F>(&self, namespace: &str, name: &str, edit: F) -> bool
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
        F: FnOnce(&mut K),
    {
        let key = key_of::<K>(namespace, name);
        let mut state = self.state.lock();
        let Some(mut object) = state.load::<K>(&key).ok().flatten() else {
            return false;
        };
        edit(&mut object);
        object.meta_mut().resource_version = Some(state.bump_version());
        state.store(key, &object).is_ok()
    }

    /// Edit the spec of a Samtest as a user would. Bumps generation and
    /// resourceVersion.
    pub fn edit_spec<F>(&self, namespace: &str, name: &str, edit: F) -> bool
    where
        F: FnOnce(&mut Samtest),
    {
        self.modify::<Samtest, _>(namespace, name, |record| {
            edit(record);
            let generation = record.metadata.generation.unwrap_or(0);
            record.metadata.generation = Some(generation + 1);
        })
    }

    /// Install a failure rule. Rules stay until [`clear_failures`](Self::clear_failures).
    pub fn fail(&self, failure: Failure) {
        self.state.lock().failures.push(failure);
    }

    /// Remove every failure rule.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Every journaled write, oldest first.
    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().writes.clone()
    }

    /// Number of journaled writes.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    /// Journaled writes of one verb.
    pub fn writes_of(&self, verb: Verb) -> Vec<Write> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.verb == verb)
            .cloned()
            .collect()
    }

    /// Every published event, oldest first.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.state.lock().events.clone()
    }

    /// Reasons of every published event, oldest first.
    pub fn event_reasons(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .map(|e| e.reason.clone())
            .collect()
    }

    /// Forget journaled writes and events. Stored objects are kept.
    pub fn clear_journal(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.events.clear();
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn get_record(&self, namespace: &str, name: &str) -> OperatorResult<Option<Samtest>> {
        let state = self.state.lock();
        state.check(Verb::Get, &Samtest::kind(&()))?;
        state.load(&key_of::<Samtest>(namespace, name))
    }

    async fn update_record_status(&self, record: &Samtest) -> OperatorResult<Samtest> {
        let kind = Samtest::kind(&()).into_owned();
        let name = record.name_any();
        let key = key_of::<Samtest>(&record.namespace().unwrap_or_default(), &name);

        let mut state = self.state.lock();
        state.check(Verb::UpdateStatus, &kind)?;
        let Some(mut stored) = state.load::<Samtest>(&key)? else {
            return Err(api_error(404, "NotFound", format!("{kind} \"{name}\" not found")));
        };
        state.check_version(&kind, &stored, record)?;

        stored.status = record.status.clone();
        stored.metadata.resource_version = Some(state.bump_version());
        state.store(key, &stored)?;
        state.writes.push(Write {
            verb: Verb::UpdateStatus,
            kind,
            name,
        });
        Ok(stored)
    }

    async fn get_object<K: ManagedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<K>> {
        let state = self.state.lock();
        state.check(Verb::Get, &K::kind(&()))?;
        state.load(&key_of::<K>(namespace, name))
    }

    async fn create_object<K: ManagedObject>(&self, object: &K) -> OperatorResult<K> {
        let kind = K::kind(&()).into_owned();
        let name = object.name_any();
        let key = key_of::<K>(&object.namespace().unwrap_or_default(), &name);

        let mut state = self.state.lock();
        state.check(Verb::Create, &kind)?;
        if state.objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{kind} \"{name}\" already exists"),
            ));
        }

        let mut created = object.clone();
        let uid = state.assign_uid();
        let version = state.bump_version();
        let meta = created.meta_mut();
        meta.uid = Some(uid);
        meta.resource_version = Some(version);
        state.store(key, &created)?;
        state.writes.push(Write {
            verb: Verb::Create,
            kind,
            name,
        });
        Ok(created)
    }

    async fn update_object<K: ManagedObject>(&self, object: &K) -> OperatorResult<K> {
        let kind = K::kind(&()).into_owned();
        let name = object.name_any();
        let key = key_of::<K>(&object.namespace().unwrap_or_default(), &name);

        let mut state = self.state.lock();
        state.check(Verb::Update, &kind)?;
        let Some(stored) = state.load::<K>(&key)? else {
            return Err(api_error(404, "NotFound", format!("{kind} \"{name}\" not found")));
        };
        state.check_version(&kind, &stored, object)?;

        let mut updated = object.clone();
        let version = state.bump_version();
        let meta = updated.meta_mut();
        meta.uid = stored.meta().uid.clone();
        meta.resource_version = Some(version);
        state.store(key, &updated)?;
        state.writes.push(Write {
            verb: Verb::Update,
            kind,
            name,
        });
        Ok(updated)
    }

    async fn record_event(&self, record: &Samtest, event: &EventTemplate) -> OperatorResult<()> {
        let mut state = self.state.lock();
        state.check(Verb::Event, &Samtest::kind(&()))?;
        state.events.push(RecordedEvent {
            record: record.name_any(),
            kind: event.kind,
            reason: event.reason.clone(),
            message: event.message.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fixtures::record;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_identity_and_journals() {
        let cluster = InMemoryCluster::new();
        let created = cluster.create_object(&config_map("a")).await.unwrap();

        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version.is_some());
        assert_eq!(cluster.writes_of(Verb::Create).len(), 1);
        assert!(cluster.object::<ConfigMap>("default", "a").is_some());
    }

    #[tokio::test]
    async fn create_rejects_existing() {
        let cluster = InMemoryCluster::new();
        cluster.insert(config_map("a"));
        let err = cluster.create_object(&config_map("a")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn stale_update_is_a_conflict() {
        let cluster = InMemoryCluster::new();
        let stale = cluster.insert(config_map("a"));
        cluster.modify::<ConfigMap, _>("default", "a", |cm| {
            cm.data = Some(BTreeMap::from([("k".to_string(), "v".to_string())]));
        });

        let err = cluster.update_object(&stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(cluster.write_count(), 0);
    }

    #[tokio::test]
    async fn status_update_keeps_spec() {
        let cluster = InMemoryCluster::new();
        let stored = cluster.insert_record(record("sample", "app:1.2", 2));

        let mut changed = stored.clone();
        changed.spec.replicas = 9;
        changed.status = Some(Default::default());
        let updated = cluster.update_record_status(&changed).await.unwrap();

        assert_eq!(updated.spec.replicas, 2);
        assert!(updated.status.is_some());
        assert_ne!(updated.resource_version(), stored.resource_version());
    }

    #[tokio::test]
    async fn failures_match_verb_and_kind() {
        let cluster = InMemoryCluster::new();
        cluster.fail(Failure::new(Verb::Create).kind("Service").code(503));

        assert!(cluster.create_object(&config_map("a")).await.is_ok());

        cluster.fail(Failure::new(Verb::Create).kind("ConfigMap"));
        let err = cluster.create_object(&config_map("b")).await.unwrap_err();
        assert_eq!(err.api_code(), Some(500));

        cluster.clear_failures();
        assert!(cluster.create_object(&config_map("b")).await.is_ok());
    }

    #[test]
    fn edit_spec_bumps_generation() {
        let cluster = InMemoryCluster::new();
        cluster.insert_record(record("sample", "app:1.2", 2));
        assert!(cluster.edit_spec("default", "sample", |r| r.spec.replicas = 3));

        let stored = cluster.record("default", "sample").unwrap();
        assert_eq!(stored.metadata.generation, Some(2));
        assert_eq!(stored.spec.replicas, 3);
        assert!(!cluster.edit_spec("default", "missing", |_| {}));
    }
}
