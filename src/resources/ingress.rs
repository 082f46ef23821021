use crate::{
    config::DeployerConfig,
    resources::{init_script::HTTP_PORT, labels, service::HTTP_SERVICE},
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub const INGRESS_NAME: &str = "challenge-http-ingress";

fn rule(host: String) -> IngressRule {
    IngressRule {
        host: Some(host),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".to_string()),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: HTTP_SERVICE.to_string(),
                        port: Some(ServiceBackendPort {
                            number: Some(HTTP_PORT),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            }],
        }),
    }
}

/// Route the public domain and every subdomain of it to the web service
pub fn build(namespace: &str, domain: &str, config: &DeployerConfig) -> Ingress {
    let annotations = (!config.ingress_annotations.is_empty())
        .then(|| config.ingress_annotations.clone());

    Ingress {
        metadata: ObjectMeta {
            name: Some(INGRESS_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            annotations,
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
        spec: Some(IngressSpec {
            ingress_class_name: config.ingress_class_name.clone(),
            rules: Some(vec![
                rule(domain.to_string()),
                rule(format!("*.{}", domain)),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
