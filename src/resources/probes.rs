use crate::{
    config::ProbeTiming,
    crds::virtual_machine::{VmHttpGet, VmProbe},
    resources::init_script::HTTP_PORT,
};
use k8s_openapi::{
    api::core::v1::{ExecAction, HTTPGetAction, Probe},
    apimachinery::pkg::util::intstr::IntOrString,
};

/// HTTP probe against the challenge web port
pub fn http_probe(timing: &ProbeTiming) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/".to_string()),
            port: IntOrString::Int(HTTP_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(timing.initial_delay_seconds),
        period_seconds: Some(timing.period_seconds),
        timeout_seconds: Some(timing.timeout_seconds),
        failure_threshold: Some(timing.failure_threshold),
        ..Default::default()
    }
}

/// Liveness of the docker-in-docker sidecar
pub fn docker_daemon_probe() -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec!["docker".to_string(), "ps".to_string()]),
        }),
        initial_delay_seconds: Some(30),
        period_seconds: Some(30),
        timeout_seconds: Some(10),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

/// HTTP probe at the VM instance level
pub fn vm_http_probe(timing: &ProbeTiming) -> VmProbe {
    VmProbe {
        http_get: VmHttpGet {
            path: "/".to_string(),
            port: HTTP_PORT,
        },
        initial_delay_seconds: timing.initial_delay_seconds,
        period_seconds: timing.period_seconds,
        timeout_seconds: timing.timeout_seconds,
        failure_threshold: timing.failure_threshold,
    }
}
