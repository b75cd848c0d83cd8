//! Workload descriptor: the Deployment running the Samtest image.

use super::{Binding, Labels, ManagedResource, labels_contain, merge_labels};
use crate::crd::Samtest;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

/// Name of the container the operator manages inside the pod template.
pub const CONTAINER_NAME: &str = "main";

/// Name of the container port the Service targets.
pub const HTTP_PORT_NAME: &str = "http";

/// Port the container listens on.
pub const CONTAINER_PORT: i32 = 8080;

/// Deployment managed for a Samtest.
///
/// Owned fields: the operator's labels, `spec.replicas`, the pod template
/// labels, and the image and ports of the `main` container. `spec.selector` is
/// immutable once created, so it is written by [`ManagedResource::generate`]
/// only.
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    binding: Binding,
}

impl Workload {
    fn ports(&self) -> Vec<ContainerPort> {
        vec![ContainerPort {
            name: Some(HTTP_PORT_NAME.to_string()),
            container_port: CONTAINER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]
    }

    fn container(&self) -> Container {
        Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(self.binding.image.clone()),
            ports: Some(self.ports()),
            ..Default::default()
        }
    }

    fn container_matches(&self, container: &Container) -> bool {
        container.image.as_deref() == Some(self.binding.image.as_str())
            && self.ports().iter().all(|want| {
                container
                    .ports
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .any(|have| same_port(have, want))
            })
    }

    fn merge_container(&self, container: &mut Container) {
        container.image = Some(self.binding.image.clone());
        let ports = container.ports.get_or_insert_with(Vec::new);
        for want in self.ports() {
            match ports.iter_mut().find(|p| p.name == want.name) {
                Some(have) => {
                    have.container_port = want.container_port;
                    have.protocol = want.protocol.clone();
                }
                None => ports.push(want),
            }
        }
    }
}

/// Protocol defaults to TCP on the API server.
fn same_port(have: &ContainerPort, want: &ContainerPort) -> bool {
    have.name == want.name
        && have.container_port == want.container_port
        && have.protocol.as_deref().unwrap_or("TCP") == want.protocol.as_deref().unwrap_or("TCP")
}

impl ManagedResource for Workload {
    type Object = Deployment;

    fn instantiate(record: &Samtest) -> Self {
        Self {
            binding: Binding::from_record(record),
        }
    }

    fn kind(&self) -> &'static str {
        "Deployment"
    }

    fn name(&self) -> &str {
        &self.binding.name
    }

    fn namespace(&self) -> &str {
        &self.binding.namespace
    }

    fn generate(&self) -> Deployment {
        let selector = self.binding.selector_labels();

        Deployment {
            metadata: self.binding.object_meta(),
            spec: Some(DeploymentSpec {
                replicas: Some(self.binding.replicas),
                selector: LabelSelector {
                    match_labels: Some(selector.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(selector),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![self.container()],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn is_equivalent(&self, observed: &Deployment) -> bool {
        let Some(spec) = observed.spec.as_ref() else {
            return false;
        };
        let selector = self.binding.selector_labels();

        let template_labels: Option<&Labels> = spec
            .template
            .metadata
            .as_ref()
            .and_then(|m| m.labels.as_ref());

        let main_in_sync = spec
            .template
            .spec
            .as_ref()
            .and_then(|pod| pod.containers.iter().find(|c| c.name == CONTAINER_NAME))
            .is_some_and(|c| self.container_matches(c));

        labels_contain(
            observed.metadata.labels.as_ref(),
            &self.binding.object_labels(),
        ) && spec.replicas == Some(self.binding.replicas)
            && labels_contain(template_labels, &selector)
            && main_in_sync
    }

    fn merge_managed(&self, observed: &mut Deployment) {
        let selector = self.binding.selector_labels();
        merge_labels(&mut observed.metadata.labels, &self.binding.object_labels());

        let spec = observed.spec.get_or_insert_with(Default::default);
        spec.replicas = Some(self.binding.replicas);

        let template_meta = spec.template.metadata.get_or_insert_with(Default::default);
        merge_labels(&mut template_meta.labels, &selector);

        let pod = spec.template.spec.get_or_insert_with(Default::default);
        match pod.containers.iter_mut().find(|c| c.name == CONTAINER_NAME) {
            Some(container) => self.merge_container(container),
            None => pod.containers.push(self.container()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::fixtures::record;
    use k8s_openapi::api::core::v1::ResourceRequirements;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn workload() -> Workload {
        Workload::instantiate(&record("sample", "app:1.2", 2))
    }

    /// What the API server hands back: defaults filled in, extra fields set by
    /// other actors.
    fn observed() -> Deployment {
        let mut deploy = workload().generate();
        deploy.metadata.resource_version = Some("7".into());
        deploy
            .metadata
            .labels
            .as_mut()
            .unwrap()
            .insert("team".into(), "payments".into());
        let spec = deploy.spec.as_mut().unwrap();
        spec.revision_history_limit = Some(10);
        let pod = spec.template.spec.as_mut().unwrap();
        pod.containers[0].resources = Some(ResourceRequirements {
            limits: Some([("cpu".to_string(), Quantity("500m".into()))].into()),
            ..Default::default()
        });
        pod.containers.push(Container {
            name: "sidecar".into(),
            image: Some("proxy:1".into()),
            ..Default::default()
        });
        deploy
    }

    #[test]
    fn generate_names_and_image() {
        let deploy = workload().generate();
        assert_eq!(deploy.metadata.name.as_deref(), Some("sample"));
        assert_eq!(deploy.metadata.namespace.as_deref(), Some("default"));

        let spec = deploy.spec.unwrap();
        assert_eq!(spec.replicas, Some(2));
        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, CONTAINER_NAME);
        assert_eq!(containers[0].image.as_deref(), Some("app:1.2"));
    }

    #[test]
    fn selector_matches_template_labels() {
        for (name, replicas) in [("sample", 2), ("a-very-long-name", 0), ("x", 5)] {
            let deploy = Workload::instantiate(&record(name, "app:1", replicas)).generate();
            let spec = deploy.spec.unwrap();
            assert_eq!(
                spec.selector.match_labels,
                spec.template.metadata.unwrap().labels
            );
        }
    }

    #[test]
    fn generated_object_is_equivalent() {
        let w = workload();
        assert!(w.is_equivalent(&w.generate()));
    }

    #[test]
    fn unmanaged_fields_do_not_count_as_drift() {
        assert!(workload().is_equivalent(&observed()));
    }

    #[test]
    fn image_change_is_drift() {
        let mut deploy = observed();
        deploy.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0].image =
            Some("app:1.1".into());
        assert!(!workload().is_equivalent(&deploy));
    }

    #[test]
    fn replica_change_is_drift() {
        let mut deploy = observed();
        deploy.spec.as_mut().unwrap().replicas = Some(5);
        assert!(!workload().is_equivalent(&deploy));
    }

    #[test]
    fn missing_main_container_is_drift() {
        let mut deploy = observed();
        deploy.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0].name =
            "renamed".into();
        assert!(!workload().is_equivalent(&deploy));
    }

    #[test]
    fn merge_overwrites_managed_and_keeps_the_rest() {
        let w = workload();
        let mut deploy = observed();
        {
            let spec = deploy.spec.as_mut().unwrap();
            spec.replicas = Some(9);
            spec.template.spec.as_mut().unwrap().containers[0].image = Some("app:0.1".into());
        }

        w.merge_managed(&mut deploy);
        assert!(w.is_equivalent(&deploy));

        let mut expected = observed();
        expected.spec.as_mut().unwrap().replicas = Some(2);
        assert_eq!(deploy, expected);
    }

    #[test]
    fn foreign_selector_is_left_alone() {
        let w = workload();
        let mut deploy = observed();
        let foreign = Labels::from([("app".to_string(), "legacy".to_string())]);
        {
            let spec = deploy.spec.as_mut().unwrap();
            spec.selector.match_labels = Some(foreign.clone());
            merge_labels(&mut spec.template.metadata.as_mut().unwrap().labels, &foreign);
        }
        assert!(w.is_equivalent(&deploy));

        deploy.spec.as_mut().unwrap().replicas = Some(9);
        w.merge_managed(&mut deploy);

        let spec = deploy.spec.unwrap();
        assert_eq!(spec.selector.match_labels, Some(foreign.clone()));
        let template_labels = spec.template.metadata.unwrap().labels;
        assert!(labels_contain(template_labels.as_ref(), &foreign));
        assert_eq!(spec.replicas, Some(2));
    }

    #[test]
    fn merge_adds_missing_main_container() {
        let w = workload();
        let mut deploy = observed();
        deploy
            .spec
            .as_mut()
            .unwrap()
            .template
            .spec
            .as_mut()
            .unwrap()
            .containers
            .retain(|c| c.name != CONTAINER_NAME);

        w.merge_managed(&mut deploy);
        let containers = &deploy.spec.unwrap().template.spec.unwrap().containers;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "sidecar");
        assert_eq!(containers[1].image.as_deref(), Some("app:1.2"));
    }
}
