use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// KubeVirt VirtualMachine, trimmed to the fields the deployer sets
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "kubevirt.io",
    version = "v1",
    kind = "VirtualMachine",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_strategy: Option<String>,
    pub template: VirtualMachineInstanceTemplate,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct VirtualMachineInstanceTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TemplateMetadata>,
    pub spec: VirtualMachineInstanceSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct TemplateMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceSpec {
    pub domain: DomainSpec,
    pub volumes: Vec<VmVolume>,
    pub networks: Vec<VmNetwork>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<VmProbe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<VmProbe>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct DomainSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<VmCpu>,
    pub devices: VmDevices,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<VmResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<VmMemory>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct VmCpu {
    pub cores: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VmDevices {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoattach_graphics_device: Option<bool>,
    pub disks: Vec<VmDisk>,
    pub interfaces: Vec<VmInterface>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct VmDisk {
    pub name: String,
    pub disk: DiskTarget,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct DiskTarget {
    pub bus: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct VmInterface {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masquerade: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct VmResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct VmMemory {
    pub guest: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VmVolume {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_disk: Option<ContainerDiskSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_init_no_cloud: Option<CloudInitNoCloudSource>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDiskSource {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudInitNoCloudSource {
    pub user_data: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct VmNetwork {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VmProbe {
    pub http_get: VmHttpGet,
    pub initial_delay_seconds: i32,
    pub period_seconds: i32,
    pub timeout_seconds: i32,
    pub failure_threshold: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct VmHttpGet {
    pub path: String,
    pub port: i32,
}

/// KubeVirt run strategies
pub mod run_strategies {
    pub const ONCE: &str = "Once";
}

/// Disk bus constants
pub mod buses {
    pub const VIRTIO: &str = "virtio";
}
