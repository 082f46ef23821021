use crate::{
    config::DeployerConfig,
    resources::labels,
};
use k8s_openapi::{
    api::networking::v1::{
        IPBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule,
        NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec,
    },
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub const POLICY_NAME: &str = "policy";

/// Ports reachable from anywhere: SSH, challenge SSH, challenge HTTP, HTTPS
pub const INGRESS_PORTS: [i32; 4] = [22, 8022, 8080, 8443];

/// Address ranges sandboxes may never reach
pub const PRIVATE_RANGES: [&str; 4] = [
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
];

fn match_labels(pairs: &[(&str, &str)]) -> LabelSelector {
    LabelSelector {
        match_labels: Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Default::default()
    }
}

fn tcp(port: i32) -> NetworkPolicyPort {
    NetworkPolicyPort {
        port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn udp(port: i32) -> NetworkPolicyPort {
    NetworkPolicyPort {
        port: Some(IntOrString::Int(port)),
        protocol: Some("UDP".to_string()),
        ..Default::default()
    }
}

/// Build the isolation policy applied to every pod in an instance namespace
pub fn build(namespace: &str, config: &DeployerConfig) -> NetworkPolicy {
    let ingress = vec![NetworkPolicyIngressRule {
        from: None,
        ports: Some(INGRESS_PORTS.iter().copied().map(tcp).collect()),
    }];

    let egress = vec![
        // DNS via kube-dns
        NetworkPolicyEgressRule {
            to: Some(vec![NetworkPolicyPeer {
                namespace_selector: Some(match_labels(&[(
                    "kubernetes.io/metadata.name",
                    "kube-system",
                )])),
                pod_selector: Some(match_labels(&[("k8s-app", "kube-dns")])),
                ..Default::default()
            }]),
            ports: Some(vec![udp(53), tcp(53)]),
        },
        // Control plane, for bundle downloads and flag verification
        NetworkPolicyEgressRule {
            to: Some(vec![NetworkPolicyPeer {
                namespace_selector: Some(match_labels(&[(
                    "kubernetes.io/metadata.name",
                    config.control_plane_namespace.as_str(),
                )])),
                pod_selector: Some(match_labels(&[(
                    "app",
                    config.control_plane_app_label.as_str(),
                )])),
                ..Default::default()
            }]),
            ports: None,
        },
        // Public internet
        NetworkPolicyEgressRule {
            to: Some(vec![NetworkPolicyPeer {
                ip_block: Some(IPBlock {
                    cidr: "0.0.0.0/0".to_string(),
                    except: Some(PRIVATE_RANGES.iter().map(|r| r.to_string()).collect()),
                }),
                ..Default::default()
            }]),
            ports: None,
        },
    ];

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(POLICY_NAME.to_string()),
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
        spec: Some(NetworkPolicySpec {
            // Empty selector matches all pods in namespace
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            ingress: Some(ingress),
            egress: Some(egress),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingress_allow_list() {
        let policy = build("challenge-abc", &DeployerConfig::default());
        let spec = policy.spec.unwrap();
        let ingress = spec.ingress.unwrap();
        assert_eq!(ingress.len(), 1);
        assert!(ingress[0].from.is_none());
        let ports: Vec<IntOrString> = ingress[0]
            .ports
            .as_ref()
            .unwrap()
            .iter()
            .filter_map(|p| p.port.clone())
            .collect();
        assert_eq!(
            ports,
            vec![
                IntOrString::Int(22),
                IntOrString::Int(8022),
                IntOrString::Int(8080),
                IntOrString::Int(8443)
            ]
        );
    }

    #[test]
    fn test_egress_blocks_private_ranges() {
        let policy = build("challenge-abc", &DeployerConfig::default());
        let egress = policy.spec.unwrap().egress.unwrap();
        assert_eq!(egress.len(), 3);

        let block = egress[2].to.as_ref().unwrap()[0].ip_block.as_ref().unwrap();
        assert_eq!(block.cidr, "0.0.0.0/0");
        let except = block.except.as_ref().unwrap();
        assert!(except.contains(&"10.0.0.0/8".to_string()));
        assert!(except.contains(&"172.16.0.0/12".to_string()));
        assert!(except.contains(&"192.168.0.0/16".to_string()));
    }

    #[test]
    fn test_control_plane_peer_from_config() {
        let mut config = DeployerConfig::default();
        config.control_plane_namespace = "ctf-system".to_string();
        let policy = build("challenge-abc", &config);
        let egress = policy.spec.unwrap().egress.unwrap();
        let peer = &egress[1].to.as_ref().unwrap()[0];
        let ns = peer.namespace_selector.as_ref().unwrap();
        assert_eq!(
            ns.match_labels.as_ref().unwrap()["kubernetes.io/metadata.name"],
            "ctf-system"
        );
        assert_eq!(
            peer.pod_selector.as_ref().unwrap().match_labels.as_ref().unwrap()["app"],
            "deployer"
        );
    }
}
