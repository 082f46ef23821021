//! Cluster access used by discovery, the provisioner and the cleaner.
//!
//! The handle is constructed once in `main` and injected; nothing in the crate
//! reaches for a process-wide client.

use crate::{
    crds::VirtualMachine,
    error::{Error, Result},
    resources::{labels::Selector, ClusterObject},
};
use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Namespace, Pod, Secret, Service},
    networking::v1::{Ingress, NetworkPolicy},
};
use kube::{
    api::{Api, DeleteParams, ListParams, LogParams, PostParams},
    Client,
};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

/// Cluster operations the deployer needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List namespaces matching an equality selector; an empty selector lists all
    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>>;

    async fn create_namespace(&self, namespace: &Namespace) -> Result<()>;

    /// Delete a namespace; deleting an absent namespace is not an error
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Copy a secret between namespaces; a missing source is skipped
    async fn copy_secret(&self, name: &str, from_namespace: &str, to_namespace: &str)
        -> Result<()>;

    /// Create one namespaced object
    async fn create_object(&self, namespace: &str, object: &ClusterObject) -> Result<()>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn pod_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<String>;
}

/// [`ClusterClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let params = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&selector.to_string())
        };
        Ok(api.list(&params).await?.items)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.create(&PostParams::default(), namespace).await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => {
                info!(namespace = %name, "Deleted namespace");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(namespace = %name, "Namespace already gone");
                Ok(())
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn copy_secret(
        &self,
        name: &str,
        from_namespace: &str,
        to_namespace: &str,
    ) -> Result<()> {
        let source: Api<Secret> = Api::namespaced(self.client.clone(), from_namespace);

        match source.get(name).await {
            Ok(mut secret) => {
                secret.metadata.namespace = Some(to_namespace.to_string());
                secret.metadata.uid = None;
                secret.metadata.resource_version = None;
                secret.metadata.creation_timestamp = None;
                secret.metadata.owner_references = None;
                secret.metadata.managed_fields = None;

                let target: Api<Secret> = Api::namespaced(self.client.clone(), to_namespace);
                match target.create(&PostParams::default(), &secret).await {
                    Ok(_) => {
                        info!(secret = %name, namespace = %to_namespace, "Copied pull secret");
                        Ok(())
                    }
                    Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
                    Err(e) => Err(Error::from(e)),
                }
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                info!(secret = %name, "Pull secret not found, skipping");
                Ok(())
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn create_object(&self, namespace: &str, object: &ClusterObject) -> Result<()> {
        let pp = PostParams::default();
        let client = self.client.clone();
        match object {
            ClusterObject::Deployment(o) => {
                Api::<Deployment>::namespaced(client, namespace)
                    .create(&pp, o)
                    .await?;
            }
            ClusterObject::VirtualMachine(o) => {
                Api::<VirtualMachine>::namespaced(client, namespace)
                    .create(&pp, o)
                    .await?;
            }
            ClusterObject::Service(o) => {
                Api::<Service>::namespaced(client, namespace)
                    .create(&pp, o)
                    .await?;
            }
            ClusterObject::Ingress(o) => {
                Api::<Ingress>::namespaced(client, namespace)
                    .create(&pp, o)
                    .await?;
            }
            ClusterObject::NetworkPolicy(o) => {
                Api::<NetworkPolicy>::namespaced(client, namespace)
                    .create(&pp, o)
                    .await?;
            }
        }
        debug!(namespace = %namespace, kind = object.kind(), name = %object.name(), "Created object");
        Ok(())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn pod_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            ..Default::default()
        };
        Ok(api.logs(pod, &params).await?)
    }
}
