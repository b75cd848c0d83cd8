//! Descriptors for the Kubernetes objects a Samtest owns.
//!
//! Each managed kind implements [`ManagedResource`]: it binds to one
//! [`Samtest`], generates the fully specified desired object, and knows which
//! fields of that object it owns. Comparison and merging are restricted to
//! those fields so values assigned by other controllers (a Service's cluster
//! IP, a Deployment's extra sidecars) never register as drift and survive
//! updates untouched.

mod deployment;
mod service;

pub use deployment::Workload;
pub use service::Endpoint;

use crate::crd::Samtest;
use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Label map as used by Kubernetes object metadata and selectors.
pub type Labels = BTreeMap<String, String>;

/// Value of `app.kubernetes.io/name` on everything the operator creates.
pub const APP_NAME: &str = "samtest";

/// Value of `app.kubernetes.io/managed-by` on everything the operator creates.
pub const MANAGED_BY: &str = "samtest-operator";

/// A namespaced Kubernetes object type the operator can read and write.
pub trait ManagedObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> ManagedObject for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Definition of one managed kind, bound to a single Samtest.
pub trait ManagedResource: Send + Sync + 'static {
    /// The Kubernetes object type this descriptor produces.
    type Object: ManagedObject;

    /// Bind the descriptor to a Samtest's fields. Pure.
    fn instantiate(record: &Samtest) -> Self
    where
        Self: Sized;

    /// Stable kind discriminator used in logs, event reasons and condition types.
    fn kind(&self) -> &'static str;

    /// Name of the managed object.
    fn name(&self) -> &str;

    /// Namespace of the managed object.
    fn namespace(&self) -> &str;

    /// Produce the fully specified desired object.
    fn generate(&self) -> Self::Object;

    /// Compare the fields this descriptor owns against an observed object.
    fn is_equivalent(&self, observed: &Self::Object) -> bool;

    /// Overwrite the owned fields of `observed` with desired values, leaving
    /// every other field as it is.
    fn merge_managed(&self, observed: &mut Self::Object);
}

/// Fields of a Samtest that descriptors derive their objects from.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Object name (same as the Samtest).
    pub name: String,
    /// Object namespace (same as the Samtest).
    pub namespace: String,
    /// Container image.
    pub image: String,
    /// Replica count.
    pub replicas: i32,
}

impl Binding {
    /// Capture the fields of a Samtest.
    pub fn from_record(record: &Samtest) -> Self {
        Self {
            name: record.name_any(),
            namespace: record.namespace().unwrap_or_default(),
            image: record.spec.image.clone(),
            replicas: record.spec.replicas,
        }
    }

    /// Labels used both as selector and as pod template labels.
    pub fn selector_labels(&self) -> Labels {
        Labels::from([
            ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
            ("app.kubernetes.io/instance".to_string(), self.name.clone()),
        ])
    }

    /// Labels placed on the managed objects themselves.
    pub fn object_labels(&self) -> Labels {
        let mut labels = self.selector_labels();
        labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        );
        labels
    }

    /// Metadata for a generated object.
    pub fn object_meta(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.object_labels()),
            ..Default::default()
        }
    }
}

/// Whether every entry of `wanted` is present in `actual`.
pub fn labels_contain(actual: Option<&Labels>, wanted: &Labels) -> bool {
    wanted
        .iter()
        .all(|(k, v)| actual.and_then(|a| a.get(k)) == Some(v))
}

/// Insert every entry of `wanted` into `target`, keeping unrelated labels.
pub fn merge_labels(target: &mut Option<Labels>, wanted: &Labels) {
    let labels = target.get_or_insert_with(Labels::new);
    for (k, v) in wanted {
        labels.insert(k.clone(), v.clone());
    }
}

/// Build the controller owner reference pointing at `owner`.
pub fn owner_link(owner: &Samtest) -> OperatorResult<OwnerReference> {
    let reference = owner
        .controller_owner_ref(&())
        .ok_or_else(|| OperatorError::MissingOwnerUid {
            kind: Samtest::kind(&()).to_string(),
            name: owner.name_any(),
            namespace: owner.namespace().unwrap_or_default(),
        })?;

    Ok(OwnerReference {
        block_owner_deletion: Some(true),
        ..reference
    })
}

/// Record `owner` as the single controller of the object described by `meta`.
///
/// Any other controller reference is dropped, non-controller references are
/// kept.
pub fn set_owner_link(owner: &Samtest, meta: &mut ObjectMeta) -> OperatorResult<()> {
    let link = owner_link(owner)?;
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| r.controller != Some(true) && r.uid != link.uid);
    refs.push(link);
    Ok(())
}

/// Whether `owner` is recorded as the controller of the object.
pub fn is_owned_by(meta: &ObjectMeta, owner: &Samtest) -> bool {
    let Some(uid) = owner.meta().uid.as_deref() else {
        return false;
    };
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| r.controller == Some(true) && r.uid == uid)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::crd::{Samtest, SamtestSpec};

    /// A Samtest as returned by the API server (uid and generation set).
    pub fn record(name: &str, image: &str, replicas: i32) -> Samtest {
        let mut record = Samtest::new(
            name,
            SamtestSpec {
                suspend: false,
                image: image.to_string(),
                replicas,
            },
        );
        record.metadata.namespace = Some("default".to_string());
        record.metadata.uid = Some(format!("uid-{name}"));
        record.metadata.generation = Some(1);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn binding_captures_record_fields() {
        let binding = Binding::from_record(&record("sample", "app:1.2", 2));
        assert_eq!(binding.name, "sample");
        assert_eq!(binding.namespace, "default");
        assert_eq!(binding.image, "app:1.2");
        assert_eq!(binding.replicas, 2);
    }

    #[test]
    fn object_labels_extend_selector() {
        let binding = Binding::from_record(&record("sample", "app:1.2", 2));
        let selector = binding.selector_labels();
        let labels = binding.object_labels();
        assert!(labels_contain(Some(&labels), &selector));
        assert_eq!(
            labels.get("app.kubernetes.io/managed-by").map(String::as_str),
            Some(MANAGED_BY)
        );
    }

    #[test]
    fn owner_link_requires_uid() {
        let mut owner = record("sample", "app:1.2", 1);
        owner.metadata.uid = None;
        assert!(matches!(
            owner_link(&owner),
            Err(OperatorError::MissingOwnerUid { .. })
        ));
    }

    #[test]
    fn set_owner_link_replaces_foreign_controller() {
        let owner = record("sample", "app:1.2", 1);
        let other = record("other", "app:1.2", 1);
        let mut meta = ObjectMeta::default();

        set_owner_link(&other, &mut meta).unwrap();
        meta.owner_references.as_mut().unwrap().push(OwnerReference {
            api_version: "v1".into(),
            kind: "ConfigMap".into(),
            name: "bystander".into(),
            uid: "uid-bystander".into(),
            ..Default::default()
        });
        assert!(!is_owned_by(&meta, &owner));

        set_owner_link(&owner, &mut meta).unwrap();
        let refs = meta.owner_references.as_ref().unwrap();
        assert_eq!(refs.len(), 2);
        assert!(is_owned_by(&meta, &owner));
        assert!(!is_owned_by(&meta, &other));
        assert!(refs.iter().any(|r| r.name == "bystander"));

        let link = refs.iter().find(|r| r.uid == "uid-sample").unwrap();
        assert_eq!(link.kind, "Samtest");
        assert_eq!(link.block_owner_deletion, Some(true));
    }

    #[test]
    fn set_owner_link_is_stable() {
        let owner = record("sample", "app:1.2", 1);
        let mut meta = ObjectMeta::default();
        set_owner_link(&owner, &mut meta).unwrap();
        let once = meta.clone();
        set_owner_link(&owner, &mut meta).unwrap();
        assert_eq!(meta, once);
    }

    #[test]
    fn merge_labels_keeps_unrelated() {
        let mut target = Some(Labels::from([("team".to_string(), "a".to_string())]));
        let wanted = Labels::from([("app".to_string(), "x".to_string())]);
        merge_labels(&mut target, &wanted);
        let merged = target.unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("team").map(String::as_str), Some("a"));
    }
}
