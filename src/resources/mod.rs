//! Builders for the objects that make up one instance.
//!
//! Everything here is pure: a [`ResourceSet`] is computed from identifiers and
//! configuration and handed to the provisioner, which owns all cluster calls.

pub mod deployment;
pub mod ingress;
pub mod init_script;
pub mod labels;
pub mod namespace;
pub mod network_policy;
pub mod probes;
pub mod service;
pub mod virtual_machine;

use crate::{
    config::DeployerConfig,
    crds::VirtualMachine,
    error::Result,
    naming::InstanceMode,
};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Namespace, Service},
    networking::v1::{Ingress, NetworkPolicy},
};
use kube::ResourceExt;
use serde::Serialize;

/// Feature flag that selects the VM workload variant
pub const VM_FEATURE_FLAG: &str = "use-virtual-machine";

/// Name shared by the workload object of both variants
pub const WORKLOAD_NAME: &str = "challenge";

/// Which compute implementation backs an instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadVariant {
    Container,
    VirtualMachine,
}

impl WorkloadVariant {
    pub fn from_flag(use_virtual_machine: bool) -> Self {
        if use_virtual_machine {
            WorkloadVariant::VirtualMachine
        } else {
            WorkloadVariant::Container
        }
    }
}

/// Compute workload of an instance. Both variants expose 8080 (HTTP) and 8022 (SSH)
/// and receive HTTP_PORT, SSH_PORT and DOMAIN.
#[derive(Clone, Debug)]
pub enum Workload {
    Container(Deployment),
    VirtualMachine(VirtualMachine),
}

impl Workload {
    pub fn variant(&self) -> WorkloadVariant {
        match self {
            Workload::Container(_) => WorkloadVariant::Container,
            Workload::VirtualMachine(_) => WorkloadVariant::VirtualMachine,
        }
    }

    pub fn into_object(self) -> ClusterObject {
        match self {
            Workload::Container(d) => ClusterObject::Deployment(d),
            Workload::VirtualMachine(vm) => ClusterObject::VirtualMachine(vm),
        }
    }
}

/// A namespaced object the provisioner creates inside an instance namespace
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ClusterObject {
    Deployment(Deployment),
    VirtualMachine(VirtualMachine),
    Service(Service),
    Ingress(Ingress),
    NetworkPolicy(NetworkPolicy),
}

impl ClusterObject {
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterObject::Deployment(_) => "Deployment",
            ClusterObject::VirtualMachine(_) => "VirtualMachine",
            ClusterObject::Service(_) => "Service",
            ClusterObject::Ingress(_) => "Ingress",
            ClusterObject::NetworkPolicy(_) => "NetworkPolicy",
        }
    }

    pub fn name(&self) -> String {
        match self {
            ClusterObject::Deployment(o) => o.name_any(),
            ClusterObject::VirtualMachine(o) => o.name_any(),
            ClusterObject::Service(o) => o.name_any(),
            ClusterObject::Ingress(o) => o.name_any(),
            ClusterObject::NetworkPolicy(o) => o.name_any(),
        }
    }
}

/// Services and ingress that publish a challenge instance; absent in test mode
#[derive(Clone, Debug)]
pub struct Exposure {
    pub http_service: Service,
    pub ssh_service: Service,
    pub ingress: Ingress,
}

/// Identifiers and switches for one instance build
#[derive(Clone, Debug)]
pub struct BuildParams<'a> {
    pub challenge_id: &'a str,
    pub player_id: &'a str,
    pub instance_id: &'a str,
    pub token: &'a str,
    pub domain: &'a str,
    pub mode: InstanceMode,
    pub variant: WorkloadVariant,
}

/// The full object graph owned by one instance namespace
#[derive(Clone, Debug)]
pub struct ResourceSet {
    pub namespace: Namespace,
    pub workload: Workload,
    pub network_policy: NetworkPolicy,
    pub exposure: Option<Exposure>,
    pub domain: String,
}

impl ResourceSet {
    pub fn build(params: &BuildParams<'_>, config: &DeployerConfig) -> Result<Self> {
        let namespace_name = params.mode.namespace_name(params.instance_id)?;
        let namespace = namespace::build(
            &namespace_name,
            labels::namespace_labels(
                params.challenge_id,
                params.instance_id,
                params.player_id,
                params.mode,
            ),
        );

        let script = init_script::ScriptParams {
            backend_url: &config.backend_url,
            challenge_id: params.challenge_id,
            token: params.token,
            domain: params.domain,
            mode: params.mode,
            insecure_tls: config.backend_insecure_tls,
        };

        let workload = match params.variant {
            WorkloadVariant::Container => {
                Workload::Container(deployment::build(&namespace_name, &script, config))
            }
            WorkloadVariant::VirtualMachine => Workload::VirtualMachine(
                virtual_machine::build(&namespace_name, &script, config)?,
            ),
        };

        let exposure = match params.mode {
            InstanceMode::Challenge => Some(Exposure {
                http_service: service::build_http(&namespace_name),
                ssh_service: service::build_ssh(&namespace_name),
                ingress: ingress::build(&namespace_name, params.domain, config),
            }),
            InstanceMode::Test => None,
        };

        Ok(Self {
            network_policy: network_policy::build(&namespace_name, config),
            namespace,
            workload,
            exposure,
            domain: params.domain.to_string(),
        })
    }

    pub fn namespace_name(&self) -> String {
        self.namespace.name_any()
    }

    /// Namespaced children in creation order. The network policy goes last.
    pub fn objects(&self) -> Vec<ClusterObject> {
        let mut objects = vec![self.workload.clone().into_object()];
        if let Some(ref exposure) = self.exposure {
            objects.push(ClusterObject::Service(exposure.http_service.clone()));
            objects.push(ClusterObject::Service(exposure.ssh_service.clone()));
            objects.push(ClusterObject::Ingress(exposure.ingress.clone()));
        }
        objects.push(ClusterObject::NetworkPolicy(self.network_policy.clone()));
        objects
    }

    /// All manifests including the namespace, for dry-run rendering
    pub fn manifests(&self) -> Result<Vec<serde_json::Value>> {
        let mut manifests = vec![serde_json::to_value(&self.namespace)?];
        for object in self.objects() {
            manifests.push(serde_json::to_value(&object)?);
        }
        Ok(manifests)
    }
}
