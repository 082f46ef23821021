//! Read-only queries answering "is an instance running".
//!
//! The cluster is the only record of running instances: a namespace carrying the
//! instance labels that is not terminating is a running instance.

use crate::{
    cluster::ClusterClient,
    error::Result,
    naming::InstanceMode,
    resources::labels::{self, Selector},
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use tracing::{debug, instrument};

pub use crate::resources::namespace::is_terminating;

/// A running instance as observed through its namespace
#[derive(Clone, Debug, PartialEq)]
pub struct RunningInstance {
    pub namespace: String,
    pub instance_id: String,
    pub challenge_id: String,
    pub player_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl RunningInstance {
    fn from_namespace(namespace: &Namespace) -> Option<Self> {
        let labels = namespace.labels();
        Some(Self {
            namespace: namespace.name_any(),
            instance_id: labels.get(labels::INSTANCE_ID)?.clone(),
            challenge_id: labels.get(labels::CHALLENGE_ID).cloned().unwrap_or_default(),
            player_id: labels.get(labels::PLAYER_ID).cloned().unwrap_or_default(),
            created_at: creation_time(namespace),
        })
    }

    /// Seconds since the namespace was created, zero if unknown
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.created_at
            .map(|created| (now - created).num_seconds().max(0))
            .unwrap_or(0)
    }
}

/// `metadata.creationTimestamp` as a chrono timestamp
pub fn creation_time(namespace: &Namespace) -> Option<DateTime<Utc>> {
    namespace.metadata.creation_timestamp.as_ref().map(|t| t.0)
}

/// Namespaces matching `selector` that are not terminating
pub async fn running_namespaces(
    cluster: &dyn ClusterClient,
    selector: &Selector,
) -> Result<Vec<Namespace>> {
    Ok(cluster
        .list_namespaces(selector)
        .await?
        .into_iter()
        .filter(|ns| !is_terminating(ns))
        .collect())
}

/// Number of running namespaces matching `selector`
pub async fn count_running(cluster: &dyn ClusterClient, selector: &Selector) -> Result<usize> {
    Ok(running_namespaces(cluster, selector).await?.len())
}

/// First running instance for a player and challenge. Test instances are
/// scoped to the challenge only, so `player_id` is ignored in test mode.
#[instrument(skip(cluster))]
pub async fn find_running_instance(
    cluster: &dyn ClusterClient,
    player_id: &str,
    challenge_id: &str,
    mode: InstanceMode,
) -> Result<Option<RunningInstance>> {
    let selector = Selector::instances(player_id, challenge_id, mode);
    let found = running_namespaces(cluster, &selector)
        .await?
        .iter()
        .find_map(RunningInstance::from_namespace);

    debug!(selector = %selector, found = found.is_some(), "Discovery");
    Ok(found)
}
