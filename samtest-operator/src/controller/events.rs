//! Event templates and the emitter that publishes them on a Samtest.

use super::client::ClusterClient;
use super::reason::ResourceReason;
use crate::crd::Samtest;
use kube::ResourceExt;
use std::sync::Arc;

/// Event severity. Fixed by the Kubernetes event API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Expected progress.
    Normal,
    /// Something went wrong or needed correcting.
    Warning,
}

/// A fully rendered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    /// Severity.
    pub kind: EventKind,
    /// CamelCase reason, e.g. `DeploymentCreated`.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

/// Maps a resource outcome to the event recorded for it.
pub trait EventRegistry: Send + Sync {
    /// Render the event for `reason` on the object `kind` `namespace/name`.
    fn resource_event(
        &self,
        reason: ResourceReason,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> EventTemplate;
}

/// The stock event table.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvents;

impl EventRegistry for DefaultEvents {
    fn resource_event(
        &self,
        reason: ResourceReason,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> EventTemplate {
        let (event_kind, suffix, message) = match reason {
            ResourceReason::Created => (
                EventKind::Normal,
                "Created",
                format!("{kind} {namespace}/{name} has been created successfully"),
            ),
            ResourceReason::CreateFailed => (
                EventKind::Warning,
                "CreateError",
                format!("An error occurred whilst creating {kind} {namespace}/{name}"),
            ),
            ResourceReason::Adopted => (
                EventKind::Normal,
                "Updated",
                format!("{kind} {namespace}/{name} has been adopted"),
            ),
            ResourceReason::OutOfSync => (
                EventKind::Warning,
                "OutOfSync",
                format!("{kind} {namespace}/{name} is out of sync with the desired spec"),
            ),
            ResourceReason::Reconciled => (
                EventKind::Normal,
                "Updated",
                format!("{kind} {namespace}/{name} has been updated successfully"),
            ),
            ResourceReason::UpdateFailed => (
                EventKind::Warning,
                "UpdateError",
                format!("An error occurred whilst updating {kind} {namespace}/{name}"),
            ),
        };

        EventTemplate {
            kind: event_kind,
            reason: format!("{kind}{suffix}"),
            message,
        }
    }
}

/// Publishes registry events through a [`ClusterClient`].
///
/// Events are telemetry: a failure to publish is logged and otherwise ignored.
pub struct EventEmitter<C> {
    client: Arc<C>,
    registry: Arc<dyn EventRegistry>,
}

impl<C> Clone for EventEmitter<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<C: ClusterClient> EventEmitter<C> {
    /// Create an emitter publishing through `client`.
    pub fn new(client: Arc<C>, registry: Arc<dyn EventRegistry>) -> Self {
        Self { client, registry }
    }

    /// Record the event for `reason` on `record`.
    pub async fn emit(&self, record: &Samtest, reason: ResourceReason, kind: &str, name: &str) {
        let namespace = record.namespace().unwrap_or_default();
        let event = self
            .registry
            .resource_event(reason, kind, &namespace, name);

        if let Err(e) = self.client.record_event(record, &event).await {
            tracing::warn!(
                record = %record.name_any(),
                reason = %event.reason,
                error = %e,
                "Failed to publish event"
            );
        }
    }
}
