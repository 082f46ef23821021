//! Transactional creation of a resource set.
//!
//! The namespace is created first and is the transaction boundary: when any
//! later object fails, the namespace is deleted, which cascades to everything
//! already created inside it.

use crate::{
    cluster::ClusterClient,
    config::DeployerConfig,
    error::Result,
    resources::ResourceSet,
    telemetry::Metrics,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Outcome of a successful provisioning call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provisioned {
    pub url: String,
    pub seconds_left: i64,
}

pub struct Provisioner {
    cluster: Arc<dyn ClusterClient>,
    config: Arc<DeployerConfig>,
    metrics: Arc<Metrics>,
}

impl Provisioner {
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

    /// Create the namespace and every object of `set`, rolling back on failure
    #[instrument(skip(self, set), fields(namespace = %set.namespace_name()))]
    pub async fn provision(&self, set: &ResourceSet) -> Result<Provisioned> {
        let namespace = set.namespace_name();
        self.cluster.create_namespace(&set.namespace).await?;

        if let Err(e) = self.create_children(&namespace, set).await {
            self.metrics.record_provision_failure();
            warn!(error = %e, "Provisioning failed, rolling back namespace");
            if let Err(rollback) = self.cluster.delete_namespace(&namespace).await {
                // Not retried; the partial set leaks until the cleaner or an operator removes it
                self.metrics.record_rollback_failure();
                error!(error = %rollback, "Rollback failed");
            }
            return Err(e);
        }

        self.metrics.record_started();
        info!(domain = %set.domain, "Instance provisioned");
        Ok(Provisioned {
            url: set.domain.clone(),
            seconds_left: self.config.lifetime_seconds(),
        })
    }

    async fn create_children(&self, namespace: &str, set: &ResourceSet) -> Result<()> {
        if let Some(secret) = &self.config.image_pull_secret {
            self.cluster
                .copy_secret(secret, &self.config.control_plane_namespace, namespace)
                .await?;
        }
        for object in set.objects() {
            self.cluster.create_object(namespace, &object).await?;
        }
        Ok(())
    }

    /// Delete an instance namespace and everything in it
    #[instrument(skip(self))]
    pub async fn teardown(&self, namespace: &str) -> Result<()> {
        self.cluster.delete_namespace(namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::{fake::FakeCluster, MockClusterClient},
        discovery,
        error::Error,
        naming::InstanceMode,
        resources::{BuildParams, WorkloadVariant},
    };

    const INSTANCE_ID: &str = "5c1d9e2f-3a4b-4c5d-8e6f-7a8b9c0d1e2f";

    fn resource_set(mode: InstanceMode, config: &DeployerConfig) -> ResourceSet {
        ResourceSet::build(
            &BuildParams {
                challenge_id: "chal-1",
                player_id: "player-1",
                instance_id: INSTANCE_ID,
                token: "token",
                domain: "5c1d9e2f-3a4b-4c5d.ctf.example.com",
                mode,
                variant: WorkloadVariant::Container,
            },
            config,
        )
        .unwrap()
    }

    fn provisioner(cluster: Arc<dyn ClusterClient>, config: DeployerConfig) -> (Provisioner, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::default());
        (
            Provisioner::new(cluster, Arc::new(config), metrics.clone()),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_provision_creates_all_objects_in_order() {
        let cluster = Arc::new(FakeCluster::new());
        let config = DeployerConfig::default();
        let set = resource_set(InstanceMode::Challenge, &config);
        let (provisioner, metrics) = provisioner(cluster.clone(), config);

        let provisioned = provisioner.provision(&set).await.unwrap();
        assert_eq!(provisioned.url, "5c1d9e2f-3a4b-4c5d.ctf.example.com");
        assert_eq!(provisioned.seconds_left, 3600);

        let kinds: Vec<String> = cluster
            .objects("challenge-5c1d9e2f-3a4b-4c5d")
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(
            kinds,
            vec!["Deployment", "Service", "Service", "Ingress", "NetworkPolicy"]
        );
        assert_eq!(metrics.snapshot().instances_started, 1);
        assert!(cluster.secrets().is_empty());
    }

    #[tokio::test]
    async fn test_failed_network_policy_rolls_back_namespace() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.fail_on("NetworkPolicy");
        let config = DeployerConfig::default();
        let set = resource_set(InstanceMode::Challenge, &config);
        let (provisioner, metrics) = provisioner(cluster.clone(), config);

        let err = provisioner.provision(&set).await.unwrap_err();
        assert!(matches!(err, Error::ResourceCreationError { ref resource_type, .. } if resource_type == "NetworkPolicy"));
        assert!(cluster.namespace_names().is_empty());
        assert_eq!(cluster.deleted(), vec!["challenge-5c1d9e2f-3a4b-4c5d"]);

        let found = discovery::find_running_instance(
            cluster.as_ref(),
            "player-1",
            "chal-1",
            InstanceMode::Challenge,
        )
        .await
        .unwrap();
        assert!(found.is_none());
        assert_eq!(metrics.snapshot().provision_failures, 1);
        assert_eq!(metrics.snapshot().instances_started, 0);
    }

    #[tokio::test]
    async fn test_rollback_failure_returns_original_error() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.fail_on("Deployment");
        cluster.fail_deletes();
        let config = DeployerConfig::default();
        let set = resource_set(InstanceMode::Test, &config);
        let (provisioner, metrics) = provisioner(cluster.clone(), config);

        let err = provisioner.provision(&set).await.unwrap_err();
        assert!(matches!(err, Error::ResourceCreationError { ref resource_type, .. } if resource_type == "Deployment"));
        assert_eq!(cluster.namespace_names(), vec!["test-5c1d9e2f-3a4b-4c5d"]);
        assert_eq!(metrics.snapshot().rollback_failures, 1);
    }

    #[tokio::test]
    async fn test_pull_secret_copied_before_workload() {
        let cluster = Arc::new(FakeCluster::new());
        let mut config = DeployerConfig::default();
        config.image_pull_secret = Some("registry".to_string());
        let set = resource_set(InstanceMode::Test, &config);
        let (provisioner, _) = provisioner(cluster.clone(), config);

        provisioner.provision(&set).await.unwrap();
        assert_eq!(
            cluster.secrets(),
            vec![("test-5c1d9e2f-3a4b-4c5d".to_string(), "registry".to_string())]
        );
    }

    #[tokio::test]
    async fn test_namespace_failure_skips_rollback() {
        let mut cluster = MockClusterClient::new();
        cluster
            .expect_create_namespace()
            .times(1)
            .returning(|_| Err(Error::StoreError("denied".into())));
        cluster.expect_delete_namespace().times(0);
        cluster.expect_create_object().times(0);

        let config = DeployerConfig::default();
        let set = resource_set(InstanceMode::Challenge, &config);
        let (provisioner, _) = provisioner(Arc::new(cluster), config);
        assert!(provisioner.provision(&set).await.is_err());
    }

    #[tokio::test]
    async fn test_teardown_deletes_namespace() {
        let mut cluster = MockClusterClient::new();
        cluster
            .expect_delete_namespace()
            .withf(|name| name.to_string() == "challenge-abc")
            .times(1)
            .returning(|_| Ok(()));

        let (provisioner, _) = provisioner(Arc::new(cluster), DeployerConfig::default());
        provisioner.teardown("challenge-abc").await.unwrap();
    }
}
