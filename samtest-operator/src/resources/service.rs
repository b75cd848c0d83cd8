//! Network endpoint descriptor: the ClusterIP Service in front of the workload.

use super::deployment::HTTP_PORT_NAME;
use super::{Binding, ManagedResource, labels_contain, merge_labels};
use crate::crd::Samtest;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Port the Service exposes.
pub const SERVICE_PORT: i32 = 80;

const SERVICE_TYPE: &str = "ClusterIP";

/// Service managed for a Samtest.
///
/// Owned fields: the operator's labels, `spec.type`, `spec.selector` and
/// `spec.ports`. Everything the API server assigns (`clusterIP`,
/// `clusterIPs`, `ipFamilies`, node ports) is left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    binding: Binding,
}

impl Endpoint {
    fn ports(&self) -> Vec<ServicePort> {
        vec![ServicePort {
            name: Some(HTTP_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            port: SERVICE_PORT,
            target_port: Some(IntOrString::String(HTTP_PORT_NAME.to_string())),
            ..Default::default()
        }]
    }
}

fn same_port(have: &ServicePort, want: &ServicePort) -> bool {
    have.name == want.name
        && have.port == want.port
        && have.target_port == want.target_port
        && have.protocol.as_deref().unwrap_or("TCP") == want.protocol.as_deref().unwrap_or("TCP")
}

impl ManagedResource for Endpoint {
    type Object = Service;

    fn instantiate(record: &Samtest) -> Self {
        Self {
            binding: Binding::from_record(record),
        }
    }

    fn kind(&self) -> &'static str {
        "Service"
    }

    fn name(&self) -> &str {
        &self.binding.name
    }

    fn namespace(&self) -> &str {
        &self.binding.namespace
    }

    fn generate(&self) -> Service {
        Service {
            metadata: self.binding.object_meta(),
            spec: Some(ServiceSpec {
                type_: Some(SERVICE_TYPE.to_string()),
                selector: Some(self.binding.selector_labels()),
                ports: Some(self.ports()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn is_equivalent(&self, observed: &Service) -> bool {
        let Some(spec) = observed.spec.as_ref() else {
            return false;
        };
        let want = self.ports();
        let have = spec.ports.as_deref().unwrap_or_default();

        labels_contain(
            observed.metadata.labels.as_ref(),
            &self.binding.object_labels(),
        ) && spec.type_.as_deref().unwrap_or(SERVICE_TYPE) == SERVICE_TYPE
            && spec.selector.as_ref() == Some(&self.binding.selector_labels())
            && have.len() == want.len()
            && want.iter().all(|w| have.iter().any(|h| same_port(h, w)))
    }

    fn merge_managed(&self, observed: &mut Service) {
        merge_labels(&mut observed.metadata.labels, &self.binding.object_labels());

        let spec = observed.spec.get_or_insert_with(Default::default);
        spec.type_ = Some(SERVICE_TYPE.to_string());
        spec.selector = Some(self.binding.selector_labels());

        // Node ports are assigned by the API server; carry them over by name.
        let previous = spec.ports.take().unwrap_or_default();
        let ports = self
            .ports()
            .into_iter()
            .map(|mut port| {
                if let Some(old) = previous.iter().find(|p| p.name == port.name) {
                    port.node_port = old.node_port;
                }
                port
            })
            .collect();
        spec.ports = Some(ports);
    }
}
