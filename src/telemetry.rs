use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub instances_started: AtomicU64,
    pub provision_failures: AtomicU64,
    pub rollback_failures: AtomicU64,
    pub namespaces_reaped: AtomicU64,
    pub reconcile_errors: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub instances_started: u64,
    pub provision_failures: u64,
    pub rollback_failures: u64,
    pub namespaces_reaped: u64,
    pub reconcile_errors: u64,
}

impl Metrics {
    pub fn record_started(&self) {
        self.instances_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provision_failure(&self) {
        self.provision_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback_failure(&self) {
        self.rollback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reaped(&self) {
        self.namespaces_reaped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconcile_error(&self) {
        self.reconcile_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            instances_started: self.instances_started.load(Ordering::Relaxed),
            provision_failures: self.provision_failures.load(Ordering::Relaxed),
            rollback_failures: self.rollback_failures.load(Ordering::Relaxed),
            namespaces_reaped: self.namespaces_reaped.load(Ordering::Relaxed),
            reconcile_errors: self.reconcile_errors.load(Ordering::Relaxed),
        }
    }
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("challenge_deployer=info,kube=info"))
}

#[cfg(not(debug_assertions))]
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .init();
}

#[cfg(debug_assertions)]
pub fn init() {
    tracing_subscriber::fmt()
        .pretty()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(env_filter())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = Metrics::default();
        metrics.record_started();
        metrics.record_started();
        metrics.record_reaped();
        metrics.record_reconcile_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.instances_started, 2);
        assert_eq!(snapshot.namespaces_reaped, 1);
        assert_eq!(snapshot.reconcile_errors, 1);
        assert_eq!(snapshot.provision_failures, 0);
    }
}
