use crate::{
    config::DeployerConfig,
    naming::InstanceMode,
    resources::{
        init_script::{self, ScriptParams, CODE_DIR, FLAG_DIR, HTTP_PORT, SSH_PORT},
        labels, probes, WORKLOAD_NAME,
    },
};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Container, ContainerPort, EmptyDirVolumeSource, EnvVar, LocalObjectReference,
            PodSpec, PodTemplateSpec, ResourceRequirements, SecurityContext, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::LabelSelector},
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub const CHALLENGE_CONTAINER: &str = "challenge";
pub const DOCKER_CONTAINER: &str = "docker";

const DOCKER_TLS_PORT: i32 = 2376;
const CERTS_VOLUME: &str = "docker-certs";
const CODE_VOLUME: &str = "challenge-code";
const FLAG_VOLUME: &str = "flag";

/// Build the container variant: the challenge payload plus a docker-in-docker sidecar
pub fn build(namespace: &str, script: &ScriptParams<'_>, config: &DeployerConfig) -> Deployment {
    let resources = build_resources(config);
    let test_mode = script.mode == InstanceMode::Test;

    let mut env_vars: Vec<EnvVar> = init_script::environment(script.domain)
        .into_iter()
        .map(|(name, value)| env(name, &value))
        .collect();
    // 2376 is the TLS port of the daemon
    env_vars.push(env(
        "DOCKER_HOST",
        &format!("tcp://localhost:{}", DOCKER_TLS_PORT),
    ));
    env_vars.push(env("DOCKER_CERT_PATH", "/var/run/docker-certs"));
    env_vars.push(env("DOCKER_TLS_VERIFY", "1"));

    let mut challenge_mounts = vec![
        mount(CERTS_VOLUME, "/var/run/docker-certs", true),
        mount(CODE_VOLUME, CODE_DIR, false),
    ];
    let mut docker_mounts = vec![
        mount(CERTS_VOLUME, "/certs/client", false),
        mount(CODE_VOLUME, CODE_DIR, false),
    ];
    let mut volumes = vec![empty_dir(CERTS_VOLUME), empty_dir(CODE_VOLUME)];
    if test_mode {
        challenge_mounts.push(mount(FLAG_VOLUME, FLAG_DIR, false));
        docker_mounts.push(mount(FLAG_VOLUME, FLAG_DIR, false));
        volumes.push(empty_dir(FLAG_VOLUME));
    }

    let challenge = Container {
        name: CHALLENGE_CONTAINER.to_string(),
        image: Some(config.container.image.clone()),
        command: Some(vec!["/bin/bash".to_string()]),
        args: Some(vec![
            "-c".to_string(),
            init_script::script(&init_script::steps(script)),
        ]),
        ports: Some(vec![port(HTTP_PORT), port(SSH_PORT)]),
        env: Some(env_vars),
        volume_mounts: Some(challenge_mounts),
        resources: Some(resources.clone()),
        liveness_probe: Some(probes::http_probe(&config.probes.liveness)),
        readiness_probe: Some(probes::http_probe(&config.probes.readiness)),
        startup_probe: Some(probes::http_probe(&config.probes.startup)),
        ..Default::default()
    };

    let docker = Container {
        name: DOCKER_CONTAINER.to_string(),
        image: Some(config.container.dind_image.clone()),
        ports: Some(vec![port(DOCKER_TLS_PORT)]),
        env: Some(vec![env("DOCKER_TLS_CERTDIR", "/certs")]),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        volume_mounts: Some(docker_mounts),
        resources: Some(resources),
        liveness_probe: Some(probes::docker_daemon_probe()),
        ..Default::default()
    };

    let pod_template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels::workload_labels()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![challenge, docker],
            volumes: Some(volumes),
            image_pull_secrets: config.image_pull_secret.as_ref().map(|name| {
                vec![LocalObjectReference {
                    name: name.clone(),
                }]
            }),
            enable_service_links: Some(false),
            automount_service_account_token: Some(false),
            termination_grace_period_seconds: Some(0),
            ..Default::default()
        }),
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(WORKLOAD_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels::workload_labels()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels::workload_selector()),
                ..Default::default()
            },
            template: pod_template,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_resources(config: &DeployerConfig) -> ResourceRequirements {
    let cpu = Quantity(config.container.cpus.to_string());

    let mut limits = BTreeMap::new();
    limits.insert("cpu".to_string(), cpu.clone());
    limits.insert(
        "memory".to_string(),
        Quantity(config.container.max_memory.clone()),
    );

    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), cpu);
    requests.insert(
        "memory".to_string(),
        Quantity(config.container.min_memory.clone()),
    );

    ResourceRequirements {
        limits: Some(limits),
        requests: Some(requests),
        ..Default::default()
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn port(container_port: i32) -> ContainerPort {
    ContainerPort {
        container_port,
        ..Default::default()
    }
}

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(mode: InstanceMode) -> ScriptParams<'static> {
        ScriptParams {
            backend_url: "http://deployer:8080",
            challenge_id: "chal-1",
            token: "tok",
            domain: "abc.ctf.example.com",
            mode,
            insecure_tls: false,
        }
    }

    fn pod_spec(deployment: &Deployment) -> &PodSpec {
        deployment
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap()
    }

    #[test]
    fn test_challenge_container_contract() {
        let deployment = build("challenge-abc", &script(InstanceMode::Challenge), &DeployerConfig::default());
        let spec = pod_spec(&deployment);
        assert_eq!(spec.containers.len(), 2);

        let challenge = &spec.containers[0];
        assert_eq!(challenge.name, CHALLENGE_CONTAINER);
        let ports: Vec<i32> = challenge
            .ports
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| p.container_port)
            .collect();
        assert_eq!(ports, vec![8080, 8022]);

        let env: BTreeMap<&str, &str> = challenge
            .env
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_deref().unwrap()))
            .collect();
        assert_eq!(env["HTTP_PORT"], "8080");
        assert_eq!(env["SSH_PORT"], "8022");
        assert_eq!(env["DOMAIN"], "abc.ctf.example.com");
        assert_eq!(env["DOCKER_HOST"], "tcp://localhost:2376");

        assert!(challenge.liveness_probe.is_some());
        assert!(challenge.readiness_probe.is_some());
        assert!(challenge.startup_probe.is_some());
        let args = challenge.args.as_ref().unwrap();
        assert!(args[1].starts_with("set -e\n"));
        assert!(args[1].contains("up --build"));
    }

    #[test]
    fn test_docker_sidecar_is_privileged() {
        let deployment = build("challenge-abc", &script(InstanceMode::Challenge), &DeployerConfig::default());
        let docker = &pod_spec(&deployment).containers[1];
        assert_eq!(docker.name, DOCKER_CONTAINER);
        assert_eq!(
            docker.security_context.as_ref().unwrap().privileged,
            Some(true)
        );
        assert!(docker.liveness_probe.as_ref().unwrap().exec.is_some());
    }

    #[test]
    fn test_flag_volume_only_in_test_mode() {
        let challenge = build("challenge-abc", &script(InstanceMode::Challenge), &DeployerConfig::default());
        assert_eq!(pod_spec(&challenge).volumes.as_ref().unwrap().len(), 2);

        let test = build("test-abc", &script(InstanceMode::Test), &DeployerConfig::default());
        let volumes = pod_spec(&test).volumes.as_ref().unwrap();
        assert_eq!(volumes.len(), 3);
        assert!(volumes.iter().any(|v| v.name == FLAG_VOLUME));
    }

    #[test]
    fn test_resources_and_pull_secret_from_config() {
        let mut config = DeployerConfig::default();
        config.container.cpus = 2;
        config.container.min_memory = "256Mi".to_string();
        config.container.max_memory = "1Gi".to_string();
        config.image_pull_secret = Some("registry".to_string());

        let deployment = build("challenge-abc", &script(InstanceMode::Challenge), &config);
        let spec = pod_spec(&deployment);
        let resources = spec.containers[0].resources.as_ref().unwrap();
        assert_eq!(resources.limits.as_ref().unwrap()["cpu"], Quantity("2".into()));
        assert_eq!(resources.limits.as_ref().unwrap()["memory"], Quantity("1Gi".into()));
        assert_eq!(resources.requests.as_ref().unwrap()["memory"], Quantity("256Mi".into()));
        assert_eq!(spec.image_pull_secrets.as_ref().unwrap()[0].name, "registry");
    }
}
