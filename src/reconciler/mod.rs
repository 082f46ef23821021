//! Background cleaner deleting challenge namespaces that expired or whose
//! workload finished. Test namespaces are removed by verification or stop,
//! not by this loop.

use crate::{
    cluster::ClusterClient,
    config::DeployerConfig,
    discovery,
    error::Result,
    naming::CHALLENGE_NAMESPACE_PREFIX,
    resources::labels::Selector,
    telemetry::Metrics,
};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::ResourceExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub mod state;
pub mod timeout;

/// What a sweep does with one namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Expired,
    Finished,
    Retain,
}

impl Verdict {
    pub fn should_delete(self) -> bool {
        self != Verdict::Retain
    }
}

/// Decide the fate of a namespace from its age and its pods
pub fn sweep_decision(
    created: Option<DateTime<Utc>>,
    pods: &[Pod],
    now: DateTime<Utc>,
    lifetime: Duration,
) -> Verdict {
    if timeout::is_expired(created, now, lifetime) {
        Verdict::Expired
    } else if state::workload_finished(pods) {
        Verdict::Finished
    } else {
        Verdict::Retain
    }
}

/// Counts of one sweep
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct Cleaner {
    cluster: Arc<dyn ClusterClient>,
    config: Arc<DeployerConfig>,
    metrics: Arc<Metrics>,
}

impl Cleaner {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        config: Arc<DeployerConfig>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cluster,
            config,
            metrics,
        }
    }

    /// Sweep on a fixed interval until `shutdown` is cancelled.
    /// Ticks never overlap; a slow sweep delays the next one.
    pub async fn run(self, shutdown: CancellationToken) {
        let period = std::time::Duration::from_secs(self.config.reconcile_interval_seconds.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_seconds = period.as_secs(), "Cleaner started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Cleaner stopped");
                    return;
                }
                _ = interval.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(report) => debug!(?report, "Sweep finished"),
                        Err(e) => {
                            self.metrics.record_reconcile_error();
                            warn!(error = %e, "Failed to list namespaces");
                        }
                    }
                }
            }
        }
    }

    /// One pass over every namespace named `challenge-*`, labelled or not.
    /// Per-namespace failures are logged and skipped; only the initial list call
    /// fails the sweep.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let namespaces: Vec<Namespace> =
            discovery::running_namespaces(self.cluster.as_ref(), &Selector::new())
                .await?
                .into_iter()
                .filter(|ns| ns.name_any().starts_with(CHALLENGE_NAMESPACE_PREFIX))
                .collect();

        let mut report = SweepReport {
            scanned: namespaces.len(),
            ..Default::default()
        };
        for namespace in &namespaces {
            match self.sweep_one(namespace, now).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    report.errors += 1;
                    self.metrics.record_reconcile_error();
                    warn!(namespace = %namespace.name_any(), error = %e, "Skipping namespace");
                }
            }
        }
        Ok(report)
    }

    async fn sweep_one(&self, namespace: &Namespace, now: DateTime<Utc>) -> Result<bool> {
        let name = namespace.name_any();
        let created = discovery::creation_time(namespace);
        let lifetime = self.config.lifetime();

        // Expired namespaces go regardless of their pods
        let verdict = if timeout::is_expired(created, now, lifetime) {
            Verdict::Expired
        } else {
            let pods = self.cluster.list_pods(&name).await?;
            sweep_decision(created, &pods, now, lifetime)
        };

        if !verdict.should_delete() {
            return Ok(false);
        }
        self.cluster.delete_namespace(&name).await?;
        self.metrics.record_reaped();
        info!(namespace = %name, ?verdict, "Reaped namespace");
        Ok(true)
    }
}
