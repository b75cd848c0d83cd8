//! Kubernetes controller for Samtest resources.
//!
//! - [`SamtestController`]: reconciles one Samtest per call
//! - [`ClusterClient`]: the cluster operations it needs, implemented by
//!   [`KubeClusterClient`] and by [`crate::testing::InMemoryCluster`]
//! - [`ConditionRegistry`] / [`EventRegistry`]: outcome to status and event tables
//!
//! # Usage with kube-runtime
//!
//! ```ignore
//! use samtest_operator::controller::{ControllerContext, error_policy, reconcile};
//!
//! Controller::new(samtests, watcher_config)
//!     .owns(deployments, watcher_config)
//!     .owns(services, watcher_config)
//!     .run(reconcile, error_policy, context)
//!     .for_each(|_| futures::future::ready(()))
//!     .await;
//! ```

mod client;
mod conditions;
mod events;
mod reason;
mod resource;
mod samtest;

pub use client::{ClusterClient, KubeClusterClient};
pub use conditions::{
    ConditionRegistry, ConditionTemplate, DefaultConditions, FAILED, PROGRESSING, READY,
    resource_condition_type,
};
pub use events::{DefaultEvents, EventEmitter, EventKind, EventRegistry, EventTemplate};
pub use reason::{PassReason, ResourceReason};
pub use resource::{
    BoundResource, PassContext, ResourceOutcome, ResourceSet, ResourceState, reconcile_resource,
};
pub use samtest::SamtestController;

use crate::crd::Samtest;
use crate::error::{OperatorError, OperatorResult};
use kube::ResourceExt;
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

/// Shared context handed to every reconcile call by the runtime.
pub struct ControllerContext<C = KubeClusterClient> {
    /// The Samtest controller.
    pub controller: SamtestController<C>,
    /// Delay before retrying a failed pass.
    pub error_requeue: Duration,
}

impl<C: ClusterClient> ControllerContext<C> {
    /// Create a new controller context.
    pub fn new(controller: SamtestController<C>, error_requeue: Duration) -> Self {
        Self {
            controller,
            error_requeue,
        }
    }
}

/// Result type for reconciliation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(Duration),
    /// Don't requeue (reconciliation complete).
    Done,
}

impl From<ReconcileAction> for Action {
    fn from(action: ReconcileAction) -> Self {
        match action {
            ReconcileAction::Requeue(duration) => Action::requeue(duration),
            ReconcileAction::Done => Action::await_change(),
        }
    }
}

/// Reconcile entry point for `kube::runtime::Controller::run`.
pub async fn reconcile<C: ClusterClient>(
    samtest: Arc<Samtest>,
    ctx: Arc<ControllerContext<C>>,
) -> OperatorResult<Action> {
    let namespace = samtest
        .namespace()
        .ok_or_else(|| OperatorError::InvalidConfig("Samtest must be namespaced".into()))?;
    let action = ctx
        .controller
        .reconcile(&namespace, &samtest.name_any())
        .await?;
    Ok(action.into())
}

/// Error policy for the Samtest controller: log and retry after the
/// configured delay.
pub fn error_policy<C: ClusterClient>(
    samtest: Arc<Samtest>,
    error: &OperatorError,
    ctx: Arc<ControllerContext<C>>,
) -> Action {
    tracing::error!(name = %samtest.name_any(), error = %error, "Reconciliation error");
    Action::requeue(ctx.error_requeue)
}
