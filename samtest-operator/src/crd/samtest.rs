//! Samtest Custom Resource Definition.
//!
//! Declares the desired workload (image and replica count) that the operator
//! converges a Deployment and a Service toward.

use chrono::{DateTime, SecondsFormat, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Samtest is the Schema for the samtests API.
///
/// A Samtest owns one Deployment and one Service, both named after it. Setting
/// `suspend` freezes reconciliation, leaving the last reported status in place.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cache.k8s.capitalontap.com",
    version = "v1alpha1",
    kind = "Samtest",
    plural = "samtests",
    namespaced,
    status = "SamtestStatus",
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Suspended", "type":"boolean", "jsonPath":".spec.suspend"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SamtestSpec {
    /// Stop reconciling this resource.
    #[serde(default)]
    pub suspend: bool,

    /// Container image in `repository:tag` form.
    #[schemars(regex(pattern = r"^(.*):(.*)$"))]
    pub image: String,

    /// Desired number of pods.
    #[schemars(range(min = 0))]
    pub replicas: i32,
}

/// Samtest status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SamtestStatus {
    /// Conditions representing the outcome of the last completed reconcile pass.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<SamtestCondition>,

    /// Generation of the spec that the last successful pass converged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Status of a condition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// Not yet determined.
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition representing one aspect of the resource state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SamtestCondition {
    /// Type of condition (Ready, Progressing, Failed, <Kind>Synced).
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status of the condition.
    pub status: ConditionStatus,

    /// Last time the status changed (RFC 3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// Machine-readable reason in CamelCase.
    pub reason: String,

    /// Human-readable message.
    pub message: String,

    /// Generation of the spec the condition was computed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl SamtestCondition {
    /// Same type, status, reason, message and generation; the timestamp is ignored.
    fn same_as(&self, other: &SamtestCondition) -> bool {
        self.condition_type == other.condition_type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}

impl SamtestStatus {
    /// Look up a condition by type.
    pub fn condition(&self, condition_type: &str) -> Option<&SamtestCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Whether the condition of this type is present with status `True`.
    pub fn is_true(&self, condition_type: &str) -> bool {
        self.condition(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Set a condition, replacing any existing entry of the same type in place.
    ///
    /// `lastTransitionTime` is only moved to `now` when the status flips (or the
    /// type is new). Returns whether anything observable changed.
    pub fn set_condition(&mut self, mut condition: SamtestCondition, now: DateTime<Utc>) -> bool {
        let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);

        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) => {
                if existing.same_as(&condition) {
                    return false;
                }
                condition.last_transition_time = if existing.status == condition.status {
                    existing.last_transition_time.clone()
                } else {
                    Some(stamp)
                };
                *existing = condition;
                true
            }
            None => {
                condition.last_transition_time = Some(stamp);
                self.conditions.push(condition);
                true
            }
        }
    }
}
