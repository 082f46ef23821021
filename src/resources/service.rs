use crate::resources::{
    init_script::{HTTP_PORT, SSH_PORT},
    labels,
};
use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::util::intstr::IntOrString,
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub const HTTP_SERVICE: &str = "web";
pub const SSH_SERVICE: &str = "ssh";

fn build(namespace: &str, name: &str, port: i32) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some({
                let mut labels = BTreeMap::new();
                labels.insert(
                    labels::MANAGED_BY.to_string(),
                    labels::MANAGED_BY_VALUE.to_string(),
                );
                labels
            }),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels::workload_selector()),
            ports: Some(vec![ServicePort {
                name: Some(name.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ClusterIP service in front of the workload's web port; the ingress targets it
pub fn build_http(namespace: &str) -> Service {
    build(namespace, HTTP_SERVICE, HTTP_PORT)
}

pub fn build_ssh(namespace: &str) -> Service {
    build(namespace, SSH_SERVICE, SSH_PORT)
}
