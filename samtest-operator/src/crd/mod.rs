//! Custom Resource Definitions for the Samtest operator.
//!
//! - [`Samtest`]: desired image and replica count for one workload

mod samtest;

pub use samtest::{ConditionStatus, Samtest, SamtestCondition, SamtestSpec, SamtestStatus};
