//! Samtest Kubernetes Operator
//!
//! Converges a Deployment and a Service toward the desired state declared by
//! each `Samtest` custom resource, and reports the outcome of every pass
//! through status conditions and events.
//!
//! # Custom Resource Definition
//!
//! - **Samtest**: container image and replica count of one workload
//!
//! # Example
//!
//! ```yaml
//! apiVersion: cache.k8s.capitalontap.com/v1alpha1
//! kind: Samtest
//! metadata:
//!   name: sample
//! spec:
//!   image: app:1.2
//!   replicas: 2
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod observability;
pub mod resources;
pub mod testing;

pub use config::OperatorConfig;
pub use crd::{Samtest, SamtestSpec, SamtestStatus};
pub use error::{OperatorError, OperatorResult};
