//! Status condition templates.

use super::reason::{PassReason, ResourceReason};
use crate::crd::{ConditionStatus, SamtestCondition};

/// Condition type set when every resource is in the desired state.
pub const READY: &str = "Ready";

/// Condition type set while a pass converges resources.
pub const PROGRESSING: &str = "Progressing";

/// Condition type set when a pass could not converge every resource.
pub const FAILED: &str = "Failed";

const PASS_TYPES: [&str; 3] = [READY, PROGRESSING, FAILED];

/// A condition before it is stamped with a generation and transition time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionTemplate {
    /// Condition type.
    pub condition_type: String,
    /// Condition status.
    pub status: ConditionStatus,
    /// CamelCase reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

impl ConditionTemplate {
    /// Turn the template into a status condition for `generation`.
    pub fn into_condition(self, generation: Option<i64>) -> SamtestCondition {
        SamtestCondition {
            condition_type: self.condition_type,
            status: self.status,
            last_transition_time: None,
            reason: self.reason,
            message: self.message,
            observed_generation: generation,
        }
    }
}

/// Maps outcomes to status conditions.
pub trait ConditionRegistry: Send + Sync {
    /// Condition describing a whole pass.
    fn pass_condition(&self, reason: PassReason) -> ConditionTemplate;

    /// Condition describing one managed resource.
    fn resource_condition(
        &self,
        reason: ResourceReason,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> ConditionTemplate;

    /// Every condition a pass-level transition writes.
    ///
    /// `Ready` and `Failed` are terminal: they set their own type and clear
    /// the other pass-level types with the same reason. `Progressing` only
    /// touches itself so the previous verdict stays visible during the pass.
    fn pass_transition(&self, reason: PassReason) -> Vec<ConditionTemplate> {
        let primary = self.pass_condition(reason);
        if reason == PassReason::ProgressingResources {
            return vec![primary];
        }

        let cleared = PASS_TYPES
            .iter()
            .filter(|t| **t != primary.condition_type)
            .map(|t| ConditionTemplate {
                condition_type: (*t).to_string(),
                status: ConditionStatus::False,
                reason: primary.reason.clone(),
                message: primary.message.clone(),
            })
            .collect::<Vec<_>>();

        std::iter::once(primary).chain(cleared).collect()
    }
}

/// The stock condition table.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConditions;

impl ConditionRegistry for DefaultConditions {
    fn pass_condition(&self, reason: PassReason) -> ConditionTemplate {
        let (condition_type, reason, message) = match reason {
            PassReason::ResourcesReady => (
                READY,
                "ResourcesReady",
                "Resources all ready and in desired state",
            ),
            PassReason::ProgressingResources => (
                PROGRESSING,
                "ProgressingResources",
                "Progressing resources to sync with the desired state",
            ),
            PassReason::ResourcesFailed => (
                FAILED,
                "ResourcesFailed",
                "Failed to provision resources",
            ),
        };

        ConditionTemplate {
            condition_type: condition_type.to_string(),
            status: ConditionStatus::True,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    fn resource_condition(
        &self,
        reason: ResourceReason,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> ConditionTemplate {
        let (status, reason, message) = match reason {
            ResourceReason::Created => (
                ConditionStatus::True,
                "Created",
                format!("{kind} {namespace}/{name} has been created successfully"),
            ),
            ResourceReason::CreateFailed => (
                ConditionStatus::False,
                "CreateError",
                format!("{kind} {namespace}/{name} could not be created"),
            ),
            ResourceReason::Adopted => (
                ConditionStatus::True,
                "Adopted",
                format!("{kind} {namespace}/{name} has been adopted"),
            ),
            ResourceReason::OutOfSync => (
                ConditionStatus::False,
                "OutOfSync",
                format!("{kind} {namespace}/{name} is out of sync with the desired spec"),
            ),
            ResourceReason::Reconciled => (
                ConditionStatus::True,
                "Reconciled",
                format!("{kind} {namespace}/{name} has been reconciled to the desired spec"),
            ),
            ResourceReason::UpdateFailed => (
                ConditionStatus::False,
                "UpdateError",
                format!("{kind} {namespace}/{name} could not be updated"),
            ),
        };

        ConditionTemplate {
            condition_type: resource_condition_type(kind),
            status,
            reason: reason.to_string(),
            message,
        }
    }
}

/// Condition type tracking one managed kind, e.g. `DeploymentSynced`.
pub fn resource_condition_type(kind: &str) -> String {
    format!("{kind}Synced")
}
