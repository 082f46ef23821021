use crate::{
    config::DeployerConfig,
    crds::virtual_machine::{
        buses, run_strategies, CloudInitNoCloudSource, ContainerDiskSource, DiskTarget,
        DomainSpec, TemplateMetadata, VirtualMachine, VirtualMachineInstanceSpec,
        VirtualMachineInstanceTemplate, VirtualMachineSpec, VmCpu, VmDevices, VmDisk,
        VmInterface, VmMemory, VmNetwork, VmResources, VmVolume,
    },
    error::{Error, Result},
    naming::InstanceMode,
    resources::{
        init_script::{self, ScriptParams},
        labels, probes, WORKLOAD_NAME,
    },
};
use kube::api::ObjectMeta;
use serde::Serialize;
use std::collections::BTreeMap;

const CONTAINER_DISK: &str = "containerdisk";
const CLOUD_INIT_DISK: &str = "cloudinitdisk";
const POD_NETWORK: &str = "default";

#[derive(Serialize)]
struct CloudConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ssh_authorized_keys: Vec<String>,
    runcmd: Vec<String>,
}

/// Render the `#cloud-config` user data that runs the init steps on first boot
pub fn cloud_init(script: &ScriptParams<'_>, config: &DeployerConfig) -> Result<String> {
    let mut runcmd = init_script::steps(script);
    // Challenge mode keeps compose in the foreground; powering off afterwards
    // lets a Once run strategy report the VM as finished.
    if script.mode == InstanceMode::Challenge {
        runcmd.push("poweroff".to_string());
    }

    let cloud_config = CloudConfig {
        ssh_authorized_keys: config.vm.ssh_public_key.iter().cloned().collect(),
        runcmd,
    };
    let body = serde_yaml::to_string(&cloud_config).map_err(|e| Error::ResourceCreationError {
        resource_type: "VirtualMachine".to_string(),
        reason: format!("cloud-init rendering failed: {}", e),
    })?;
    Ok(format!("#cloud-config\n{}", body))
}

/// Build the VM variant of the workload
pub fn build(
    namespace: &str,
    script: &ScriptParams<'_>,
    config: &DeployerConfig,
) -> Result<VirtualMachine> {
    let user_data = cloud_init(script, config)?;

    let mut requests = BTreeMap::new();
    requests.insert("memory".to_string(), config.vm.min_memory.clone());

    let spec = VirtualMachineSpec {
        run_strategy: Some(run_strategies::ONCE.to_string()),
        template: VirtualMachineInstanceTemplate {
            metadata: Some(TemplateMetadata {
                labels: Some(labels::workload_labels()),
            }),
            spec: VirtualMachineInstanceSpec {
                domain: DomainSpec {
                    cpu: Some(VmCpu {
                        cores: config.vm.cpus,
                    }),
                    devices: VmDevices {
                        autoattach_graphics_device: Some(false),
                        disks: vec![disk(CONTAINER_DISK), disk(CLOUD_INIT_DISK)],
                        interfaces: vec![VmInterface {
                            name: POD_NETWORK.to_string(),
                            masquerade: Some(BTreeMap::new()),
                        }],
                    },
                    resources: Some(VmResources {
                        requests: Some(requests),
                    }),
                    memory: Some(VmMemory {
                        guest: config.vm.max_memory.clone(),
                    }),
                },
                volumes: vec![
                    VmVolume {
                        name: CONTAINER_DISK.to_string(),
                        container_disk: Some(ContainerDiskSource {
                            image: config.vm.image.clone(),
                            image_pull_secret: config.image_pull_secret.clone(),
                        }),
                        cloud_init_no_cloud: None,
                    },
                    VmVolume {
                        name: CLOUD_INIT_DISK.to_string(),
                        container_disk: None,
                        cloud_init_no_cloud: Some(CloudInitNoCloudSource { user_data }),
                    },
                ],
                networks: vec![VmNetwork {
                    name: POD_NETWORK.to_string(),
                    pod: Some(BTreeMap::new()),
                }],
                termination_grace_period_seconds: Some(0),
                liveness_probe: Some(probes::vm_http_probe(&config.probes.liveness)),
                readiness_probe: Some(probes::vm_http_probe(&config.probes.readiness)),
            },
        },
    };

    let mut vm = VirtualMachine::new(WORKLOAD_NAME, spec);
    vm.metadata = ObjectMeta {
        name: Some(WORKLOAD_NAME.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels::workload_labels()),
        ..Default::default()
    };
    Ok(vm)
}

fn disk(name: &str) -> VmDisk {
    VmDisk {
        name: name.to_string(),
        disk: DiskTarget {
            bus: buses::VIRTIO.to_string(),
        },
    }
}
