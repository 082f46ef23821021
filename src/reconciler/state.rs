use k8s_openapi::api::core::v1::Pod;

/// Pod phases after which a pod never runs again
pub const TERMINAL_PHASES: [&str; 2] = ["Succeeded", "Failed"];

pub fn is_terminal(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|phase| TERMINAL_PHASES.contains(&phase))
        .unwrap_or(false)
}

/// The workload has finished when the namespace has pods and all of them are terminal.
/// A namespace without pods is still starting up and is not finished.
pub fn workload_finished(pods: &[Pod]) -> bool {
    !pods.is_empty() && pods.iter().all(is_terminal)
}

/// Readiness of one container across the namespace's pods
pub fn container_ready(pods: &[Pod], container: &str) -> bool {
    pods.iter()
        .filter_map(|pod| pod.status.as_ref())
        .filter_map(|status| status.container_statuses.as_ref())
        .flatten()
        .any(|status| status.name == container && status.ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::{pod, pod_with_container};

    #[test]
    fn test_all_pods_terminal() {
        assert!(workload_finished(&[pod("a", "Succeeded"), pod("b", "Failed")]));
        assert!(!workload_finished(&[pod("a", "Succeeded"), pod("b", "Running")]));
        assert!(!workload_finished(&[pod("a", "Pending")]));
    }

    #[test]
    fn test_no_pods_is_not_finished() {
        assert!(!workload_finished(&[]));
    }

    #[test]
    fn test_missing_phase_is_not_terminal() {
        assert!(!is_terminal(&Pod::default()));
    }

    #[test]
    fn test_container_ready() {
        let pods = vec![
            pod_with_container("launcher", "compute", true),
            pod("other", "Running"),
        ];
        assert!(container_ready(&pods, "compute"));
        assert!(!container_ready(&pods, "challenge"));
        assert!(!container_ready(&[pod_with_container("p", "challenge", false)], "challenge"));
    }
}
