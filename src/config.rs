use crate::error::Result;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    /// Address the HTTP API binds to
    pub listen_addr: String,

    /// Base URL sandboxes use to reach this service (downloads, flag verification)
    pub backend_url: String,

    /// Skip certificate checks when sandboxes download bundles
    pub backend_insecure_tls: bool,

    /// Suffix appended to the 18 character instance prefix, e.g. ".challenges.example.com"
    pub challenge_domain: String,

    /// Minutes a challenge namespace may live before the cleaner deletes it
    pub challenge_lifetime_minutes: u32,

    /// Running challenge instances allowed per non-admin user
    pub max_concurrent_challenges: usize,

    /// Running test instances allowed cluster-wide for non-admins
    pub max_concurrent_tests: usize,

    /// Root directory holding `<challengeId>/{challenge,handout,solution}.zip`
    pub upload_path: String,

    /// HS256 secret for bearer tokens
    pub jwt_secret: String,

    /// Namespace the deployer itself runs in; sandboxes may reach it
    pub control_plane_namespace: String,

    /// `app` label of the deployer pods
    pub control_plane_app_label: String,

    pub ingress_class_name: Option<String>,
    pub ingress_annotations: BTreeMap<String, String>,
    pub image_pull_secret: Option<String>,

    /// Seconds between cleaner sweeps
    pub reconcile_interval_seconds: u64,

    pub container: ContainerConfig,
    pub vm: VmConfig,
    pub probes: ProbesConfig,

    /// Static feature flags, e.g. `use-virtual-machine: true`
    pub feature_flags: BTreeMap<String, bool>,

    /// Optional YAML file with challenges to seed the in-memory store
    pub challenges_file: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub image: String,
    pub dind_image: String,
    pub cpus: u32,
    pub min_memory: String,
    pub max_memory: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub image: String,
    pub cpus: u32,
    pub min_memory: String,
    pub max_memory: String,
    pub ssh_public_key: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProbesConfig {
    pub readiness: ProbeTiming,
    pub liveness: ProbeTiming,
    pub startup: ProbeTiming,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeTiming {
    pub initial_delay_seconds: i32,
    pub period_seconds: i32,
    pub timeout_seconds: i32,
    pub failure_threshold: i32,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            backend_url: "http://deployer.deployer.svc.cluster.local:8080".to_string(),
            backend_insecure_tls: false,
            challenge_domain: ".challenges.localhost".to_string(),
            challenge_lifetime_minutes: 60,
            max_concurrent_challenges: 3,
            max_concurrent_tests: 2,
            upload_path: "uploads".to_string(),
            jwt_secret: String::new(),
            control_plane_namespace: "deployer".to_string(),
            control_plane_app_label: "deployer".to_string(),
            ingress_class_name: None,
            ingress_annotations: BTreeMap::new(),
            image_pull_secret: None,
            reconcile_interval_seconds: 60,
            container: ContainerConfig::default(),
            vm: VmConfig::default(),
            probes: ProbesConfig::default(),
            feature_flags: BTreeMap::new(),
            challenges_file: None,
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: "ghcr.io/challenge-deployer/challenge-runner:latest".to_string(),
            dind_image: "docker:28.0.0-dind".to_string(),
            cpus: 1,
            min_memory: "512Mi".to_string(),
            max_memory: "2Gi".to_string(),
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            image: "ghcr.io/challenge-deployer/challenge-vm:latest".to_string(),
            cpus: 1,
            min_memory: "1Gi".to_string(),
            max_memory: "2Gi".to_string(),
            ssh_public_key: None,
        }
    }
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            initial_delay_seconds: 10,
            period_seconds: 10,
            timeout_seconds: 5,
            failure_threshold: 30,
        }
    }
}

impl DeployerConfig {
    /// Load from an optional `deployer.{yaml,toml,json}` file, then `DEPLOYER_*` env vars.
    /// Nested keys use a double underscore: `DEPLOYER_VM__CPUS=2`.
    pub fn load() -> Result<Self> {
        let config = ::config::Config::builder()
            .add_source(::config::File::with_name("deployer").required(false))
            .add_source(
                ::config::Environment::with_prefix("DEPLOYER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Lifetime of a challenge namespace in seconds
    pub fn lifetime_seconds(&self) -> i64 {
        i64::from(self.challenge_lifetime_minutes) * 60
    }

    pub fn lifetime(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.challenge_lifetime_minutes))
    }
}
