//! Cluster API seam used by the reconcilers.
//!
//! [`ClusterClient`] is the set of framework operations the engine consumes.
//! [`KubeClusterClient`] implements it on top of `kube::Api`; tests use the
//! in-memory implementation from [`crate::testing`].

use super::events::{EventKind, EventTemplate};
use crate::crd::Samtest;
use crate::error::OperatorResult;
use crate::resources::ManagedObject;
use async_trait::async_trait;
use kube::api::{Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource, ResourceExt};

/// Operations the reconciliation engine needs from the cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Fetch a Samtest. `Ok(None)` when it does not exist.
    async fn get_record(&self, namespace: &str, name: &str) -> OperatorResult<Option<Samtest>>;

    /// Persist the status sub-record of a Samtest.
    ///
    /// The write is conditional on `record`'s resourceVersion; a stale record
    /// yields a conflict error.
    async fn update_record_status(&self, record: &Samtest) -> OperatorResult<Samtest>;

    /// Fetch a managed object. `Ok(None)` when it does not exist.
    async fn get_object<K: ManagedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<K>>;

    /// Create a managed object.
    async fn create_object<K: ManagedObject>(&self, object: &K) -> OperatorResult<K>;

    /// Replace a managed object (conditional on its resourceVersion).
    async fn update_object<K: ManagedObject>(&self, object: &K) -> OperatorResult<K>;

    /// Publish an event attached to a Samtest.
    async fn record_event(&self, record: &Samtest, event: &EventTemplate) -> OperatorResult<()>;
}

/// [`ClusterClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    reporter: Reporter,
    field_manager: String,
}

impl KubeClusterClient {
    /// Create a client that writes as `field_manager` and reports events as
    /// `reporter`.
    pub fn new(client: Client, reporter: Reporter, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            reporter,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_record(&self, namespace: &str, name: &str) -> OperatorResult<Option<Samtest>> {
        let api: Api<Samtest> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update_record_status(&self, record: &Samtest) -> OperatorResult<Samtest> {
        let namespace = record.namespace().unwrap_or_default();
        let api: Api<Samtest> = Api::namespaced(self.client.clone(), &namespace);

        // resourceVersion in a merge patch makes the write conditional.
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": record.resource_version() },
            "status": record.status.clone().unwrap_or_default(),
        });

        let updated = api
            .patch_status(
                &record.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(updated)
    }

    async fn get_object<K: ManagedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_object<K: ManagedObject>(&self, object: &K) -> OperatorResult<K> {
        let namespace = object.namespace().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.create(&self.post_params(), object).await?)
    }

    async fn update_object<K: ManagedObject>(&self, object: &K) -> OperatorResult<K> {
        let namespace = object.namespace().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api
            .replace(&object.name_any(), &self.post_params(), object)
            .await?)
    }

    async fn record_event(&self, record: &Samtest, event: &EventTemplate) -> OperatorResult<()> {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            record.object_ref(&()),
        );

        recorder
            .publish(Event {
                type_: match event.kind {
                    EventKind::Normal => EventType::Normal,
                    EventKind::Warning => EventType::Warning,
                },
                reason: event.reason.clone(),
                note: Some(event.message.clone()),
                action: "Reconcile".into(),
                secondary: None,
            })
            .await?;
        Ok(())
    }
}
