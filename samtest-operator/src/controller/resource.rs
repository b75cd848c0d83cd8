//! Per-resource reconciler.
//!
//! Drives one managed object toward the state its descriptor generates:
//!
//! ```text
//! get ──► Absent ──► Creating ──► Synced | Failed
//!   ├───► Unowned ─► (adopt) ───► Synced | Failed
//!   ├───► owned, equivalent ────► Synced
//!   └───► owned, drifted ───────► Drifted ─► Synced | Failed
//! ```
//!
//! Events are published as transitions happen. Conditions are not written
//! here; they are returned in the [`ResourceOutcome`] and applied by the
//! orchestrator after every resource has finished.

use super::client::ClusterClient;
use super::events::EventEmitter;
use super::reason::ResourceReason;
use crate::crd::Samtest;
use crate::error::OperatorError;
use crate::resources::{
    Endpoint, ManagedObject, ManagedResource, Workload, is_owned_by, set_owner_link,
};
use async_trait::async_trait;
use kube::Resource;
use std::sync::Arc;

/// Inputs shared by every resource reconciled in one pass.
pub struct PassContext<C> {
    /// Cluster API.
    pub client: Arc<C>,
    /// The Samtest being reconciled, as loaded at the start of the pass.
    pub record: Arc<Samtest>,
    /// Event publisher.
    pub events: EventEmitter<C>,
}

impl<C> Clone for PassContext<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            record: Arc::clone(&self.record),
            events: self.events.clone(),
        }
    }
}

/// State of a managed object within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Not found in the cluster.
    Absent,
    /// Create issued.
    Creating,
    /// Exists but is not controlled by the Samtest.
    Unowned,
    /// Owned, but managed fields differ from the desired state.
    Drifted,
    /// In the desired state.
    Synced,
    /// Could not be converged.
    Failed,
}

/// Result of reconciling one managed object.
#[derive(Debug)]
pub struct ResourceOutcome {
    /// Descriptor kind.
    pub kind: &'static str,
    /// Object name.
    pub name: String,
    /// Final state.
    pub state: ResourceState,
    /// Transitions taken, in order. Each maps to one condition update.
    pub transitions: Vec<ResourceReason>,
    /// Set when `state` is [`ResourceState::Failed`].
    pub error: Option<OperatorError>,
}

impl ResourceOutcome {
    fn new(kind: &'static str, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            state: ResourceState::Absent,
            transitions: Vec::new(),
            error: None,
        }
    }

    /// An outcome for a task that never reported back.
    pub fn lost(error: OperatorError) -> Self {
        Self {
            kind: "Unknown",
            name: String::new(),
            state: ResourceState::Failed,
            transitions: Vec::new(),
            error: Some(error),
        }
    }

    fn enter(&mut self, state: ResourceState) {
        self.state = state;
    }

    fn synced(mut self) -> Self {
        self.state = ResourceState::Synced;
        self
    }

    fn failed(mut self, error: OperatorError) -> Self {
        self.state = ResourceState::Failed;
        self.error = Some(error);
        self
    }

    /// Whether the object ended in the desired state.
    pub fn is_synced(&self) -> bool {
        self.state == ResourceState::Synced
    }
}

/// Converge one managed object.
pub async fn reconcile_resource<C, R>(pass: &PassContext<C>, resource: &R) -> ResourceOutcome
where
    C: ClusterClient,
    R: ManagedResource,
{
    let kind = resource.kind();
    let name = resource.name().to_string();
    let namespace = resource.namespace().to_string();
    let mut outcome = ResourceOutcome::new(kind, name.clone());

    let observed = match pass
        .client
        .get_object::<R::Object>(&namespace, &name)
        .await
    {
        Ok(observed) => observed,
        Err(e) => {
            tracing::error!(kind, name = %name, error = %e, "Failed to read managed object");
            return outcome.failed(e);
        }
    };

    let Some(mut observed) = observed else {
        return create(pass, resource, outcome).await;
    };

    if !is_owned_by(observed.meta(), &pass.record) {
        outcome.enter(ResourceState::Unowned);
        tracing::info!(kind, name = %name, "Adopting existing object");

        if let Err(e) = set_owner_link(&pass.record, observed.meta_mut()) {
            tracing::error!(kind, name = %name, error = %e, "Cannot link object to owner");
            return outcome.failed(e);
        }
        return update(pass, observed, ResourceReason::Adopted, outcome).await;
    }

    if resource.is_equivalent(&observed) {
        tracing::debug!(kind, name = %name, "Object in desired state");
        return outcome.synced();
    }

    outcome.enter(ResourceState::Drifted);
    tracing::info!(kind, name = %name, "Object out of sync, updating");
    pass.events
        .emit(&pass.record, ResourceReason::OutOfSync, kind, &name)
        .await;
    outcome.transitions.push(ResourceReason::OutOfSync);

    resource.merge_managed(&mut observed);
    update(pass, observed, ResourceReason::Reconciled, outcome).await
}

async fn create<C, R>(
    pass: &PassContext<C>,
    resource: &R,
    mut outcome: ResourceOutcome,
) -> ResourceOutcome
where
    C: ClusterClient,
    R: ManagedResource,
{
    let kind = outcome.kind;
    let name = outcome.name.clone();
    outcome.enter(ResourceState::Creating);

    let mut desired = resource.generate();
    if let Err(e) = set_owner_link(&pass.record, desired.meta_mut()) {
        tracing::error!(kind, name = %name, error = %e, "Cannot link object to owner");
        return outcome.failed(e);
    }

    match pass.client.create_object(&desired).await {
        Ok(_) => {
            tracing::info!(kind, name = %name, "Created object");
            pass.events
                .emit(&pass.record, ResourceReason::Created, kind, &name)
                .await;
            outcome.transitions.push(ResourceReason::Created);
            outcome.synced()
        }
        Err(e) => {
            tracing::error!(kind, name = %name, error = %e, "Failed to create object");
            pass.events
                .emit(&pass.record, ResourceReason::CreateFailed, kind, &name)
                .await;
            outcome.transitions.push(ResourceReason::CreateFailed);
            outcome.failed(e)
        }
    }
}

async fn update<C, K>(
    pass: &PassContext<C>,
    object: K,
    success: ResourceReason,
    mut outcome: ResourceOutcome,
) -> ResourceOutcome
where
    C: ClusterClient,
    K: ManagedObject,
{
    let kind = outcome.kind;
    let name = outcome.name.clone();

    match pass.client.update_object(&object).await {
        Ok(_) => {
            tracing::info!(kind, name = %name, reason = ?success, "Updated object");
            pass.events.emit(&pass.record, success, kind, &name).await;
            outcome.transitions.push(success);
            outcome.synced()
        }
        Err(e) => {
            tracing::error!(kind, name = %name, error = %e, "Failed to update object");
            pass.events
                .emit(&pass.record, ResourceReason::UpdateFailed, kind, &name)
                .await;
            outcome.transitions.push(ResourceReason::UpdateFailed);
            outcome.failed(e)
        }
    }
}

/// A descriptor bound to one Samtest, with its object type erased so
/// descriptors of different kinds can share one task set.
#[async_trait]
pub trait BoundResource<C: ClusterClient>: Send + Sync {
    /// Descriptor kind.
    fn resource_kind(&self) -> &'static str;

    /// Converge the object.
    async fn run(&self, pass: &PassContext<C>) -> ResourceOutcome;
}

#[async_trait]
impl<C, R> BoundResource<C> for R
where
    C: ClusterClient,
    R: ManagedResource,
{
    fn resource_kind(&self) -> &'static str {
        ManagedResource::kind(self)
    }

    async fn run(&self, pass: &PassContext<C>) -> ResourceOutcome {
        reconcile_resource(pass, self).await
    }
}

type Binder<C> = fn(&Samtest) -> Box<dyn BoundResource<C>>;

fn bind<C, R>(record: &Samtest) -> Box<dyn BoundResource<C>>
where
    C: ClusterClient,
    R: ManagedResource,
{
    Box::new(R::instantiate(record))
}

/// The ordered list of descriptors a Samtest owns.
///
/// Order is only used to apply per-resource conditions deterministically;
/// resources are reconciled concurrently.
pub struct ResourceSet<C> {
    binders: Vec<Binder<C>>,
}

impl<C: ClusterClient> ResourceSet<C> {
    /// An empty set.
    pub fn new() -> Self {
        Self {
            binders: Vec::new(),
        }
    }

    /// The Deployment and the Service.
    pub fn standard() -> Self {
        Self::new().with::<Workload>().with::<Endpoint>()
    }

    /// Append a descriptor.
    pub fn with<R: ManagedResource>(mut self) -> Self {
        self.binders.push(bind::<C, R>);
        self
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.binders.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }

    /// Bind every descriptor to `record`.
    pub fn bind(&self, record: &Samtest) -> Vec<Box<dyn BoundResource<C>>> {
        self.binders.iter().map(|binder| binder(record)).collect()
    }
}

impl<C: ClusterClient> Default for ResourceSet<C> {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::events::DefaultEvents;
    use crate::resources::fixtures::record;
    use crate::testing::{Failure, InMemoryCluster, Verb};
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::Service;

    fn pass(cluster: &Arc<InMemoryCluster>, record: Samtest) -> PassContext<InMemoryCluster> {
        PassContext {
            client: Arc::clone(cluster),
            record: Arc::new(record),
            events: EventEmitter::new(Arc::clone(cluster), Arc::new(DefaultEvents)),
        }
    }

    #[tokio::test]
    async fn absent_object_is_created_with_owner_link() {
        let cluster = Arc::new(InMemoryCluster::new());
        let ctx = pass(&cluster, record("sample", "app:1.2", 2));
        let workload = Workload::instantiate(&ctx.record);

        let outcome = reconcile_resource(&ctx, &workload).await;

        assert_eq!(outcome.state, ResourceState::Synced);
        assert_eq!(outcome.transitions, vec![ResourceReason::Created]);
        let created: Deployment = cluster.object("default", "sample").unwrap();
        assert!(is_owned_by(&created.metadata, &ctx.record));
        assert_eq!(cluster.event_reasons(), vec!["DeploymentCreated"]);
    }

    #[tokio::test]
    async fn equivalent_object_is_left_alone() {
        let cluster = Arc::new(InMemoryCluster::new());
        let ctx = pass(&cluster, record("sample", "app:1.2", 2));
        let endpoint = Endpoint::instantiate(&ctx.record);
        reconcile_resource(&ctx, &endpoint).await;
        cluster.clear_journal();

        let outcome = reconcile_resource(&ctx, &endpoint).await;

        assert!(outcome.is_synced());
        assert!(outcome.transitions.is_empty());
        assert_eq!(cluster.write_count(), 0);
        assert!(cluster.event_reasons().is_empty());
    }

    #[tokio::test]
    async fn create_failure_emits_create_error() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.fail(Failure::new(Verb::Create).kind("Service"));
        let ctx = pass(&cluster, record("sample", "app:1.2", 2));

        let outcome = reconcile_resource(&ctx, &Endpoint::instantiate(&ctx.record)).await;

        assert_eq!(outcome.state, ResourceState::Failed);
        assert!(outcome.error.is_some());
        assert_eq!(outcome.transitions, vec![ResourceReason::CreateFailed]);
        assert_eq!(cluster.event_reasons(), vec!["ServiceCreateError"]);
        assert!(cluster.object::<Service>("default", "sample").is_none());
    }

    #[tokio::test]
    async fn read_failure_fails_without_event() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.fail(Failure::new(Verb::Get).kind("Deployment"));
        let ctx = pass(&cluster, record("sample", "app:1.2", 2));

        let outcome = reconcile_resource(&ctx, &Workload::instantiate(&ctx.record)).await;

        assert_eq!(outcome.state, ResourceState::Failed);
        assert!(outcome.transitions.is_empty());
        assert!(cluster.event_reasons().is_empty());
    }

    #[tokio::test]
    async fn missing_owner_uid_fails_before_writing() {
        let cluster = Arc::new(InMemoryCluster::new());
        let mut owner = record("sample", "app:1.2", 2);
        owner.metadata.uid = None;
        let ctx = pass(&cluster, owner);

        let outcome = reconcile_resource(&ctx, &Workload::instantiate(&ctx.record)).await;

        assert!(matches!(
            outcome.error,
            Some(OperatorError::MissingOwnerUid { .. })
        ));
        assert_eq!(cluster.write_count(), 0);
    }

    #[test]
    fn standard_set_binds_in_order() {
        let set = ResourceSet::<InMemoryCluster>::standard();
        let kinds: Vec<&str> = set
            .bind(&record("sample", "app:1.2", 1))
            .iter()
            .map(|r| r.resource_kind())
            .collect();
        assert_eq!(kinds, vec!["Deployment", "Service"]);
    }
}
