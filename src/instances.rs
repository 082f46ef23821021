//! Request-level operations on challenge and test instances.
//!
//! Start: discovery (returns the running instance if there is one), then quota,
//! then a new instance row with its download token, then build and provision.
//! Stop and flag verification go through discovery to the namespace delete.

use crate::{
    bundles::{ArtifactKind, BundleStore},
    cluster::ClusterClient,
    config::DeployerConfig,
    discovery::{self, RunningInstance},
    error::{Error, Result},
    flags::FeatureFlags,
    identity::Identity,
    naming::{self, InstanceMode},
    provisioner::{Provisioned, Provisioner},
    quota,
    reconciler::{state, timeout},
    resources::{
        deployment::CHALLENGE_CONTAINER, labels, BuildParams, ResourceSet, WorkloadVariant,
        VM_FEATURE_FLAG,
    },
    store::{Challenge, ChallengeStore},
    telemetry::Metrics,
    token,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Container of the KubeVirt launcher pod that reflects guest readiness
pub const VM_COMPUTE_CONTAINER: &str = "compute";

/// Container of the KubeVirt launcher pod streaming the serial console
pub const VM_CONSOLE_CONTAINER: &str = "guest-console-log";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub url: String,
    pub seconds_left: i64,
    pub started: bool,
    pub verified: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_left: Option<i64>,
    pub started: bool,
}

impl StatusResponse {
    pub fn not_started() -> Self {
        Self {
            url: None,
            ready: None,
            seconds_left: None,
            started: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TestResponse {
    pub started: bool,
    pub verified: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Result of checking a submitted flag
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Success,
    Failure { submitted: String },
}

#[derive(Deserialize)]
struct VerifyPayload {
    flag: String,
}

/// Body posted by a test sandbox. A malformed body is kept rather than rejected
/// up front so the namespace is still torn down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    Flag(String),
    Malformed(String),
}

impl Submission {
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<VerifyPayload>(body) {
            Ok(payload) => Submission::Flag(payload.flag),
            Err(e) => Submission::Malformed(e.to_string()),
        }
    }
}

pub struct InstanceManager {
    cluster: Arc<dyn ClusterClient>,
    store: Arc<dyn ChallengeStore>,
    flags: Arc<dyn FeatureFlags>,
    bundles: BundleStore,
    config: Arc<DeployerConfig>,
    provisioner: Provisioner,
}

impl InstanceManager {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        store: Arc<dyn ChallengeStore>,
        flags: Arc<dyn FeatureFlags>,
        config: Arc<DeployerConfig>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            provisioner: Provisioner::new(cluster.clone(), config.clone(), metrics),
            bundles: BundleStore::new(config.upload_path.clone()),
            cluster,
            store,
            flags,
            config,
        }
    }

    /// Numeric references are grading-platform ids, everything else is a challenge id
    pub async fn resolve_challenge(&self, reference: &str) -> Result<Challenge> {
        let found = match reference.parse::<i64>() {
            Ok(ctfd_id) => self.store.get_challenge_by_ctfd_id(ctfd_id).await?,
            Err(_) => self.store.get_challenge(reference).await?,
        };
        found.ok_or_else(|| Error::NotFound(format!("Challenge {}", reference)))
    }

    fn url_of(&self, running: &RunningInstance) -> Result<String> {
        naming::public_domain(&running.instance_id, &self.config.challenge_domain)
    }

    async fn variant(&self) -> WorkloadVariant {
        WorkloadVariant::from_flag(self.flags.is_enabled(VM_FEATURE_FLAG).await)
    }

    async fn launch(
        &self,
        challenge: &Challenge,
        player_id: &str,
        mode: InstanceMode,
    ) -> Result<Provisioned> {
        let instance = self.store.create_instance(player_id, &challenge.id).await?;
        let domain = naming::public_domain(&instance.id, &self.config.challenge_domain)?;
        let set = ResourceSet::build(
            &BuildParams {
                challenge_id: &challenge.id,
                player_id,
                instance_id: &instance.id,
                token: &instance.token,
                domain: &domain,
                mode,
                variant: self.variant().await,
            },
            &self.config,
        )?;
        self.provisioner.provision(&set).await
    }

    fn validate_ids(challenge: &Challenge, identity: &Identity) -> Result<()> {
        labels::validate_label_value(&challenge.id)?;
        labels::validate_label_value(&identity.user_id)
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn start_instance(&self, identity: &Identity, reference: &str) -> Result<StartResponse> {
        let challenge = self.resolve_challenge(reference).await?;
        if !(challenge.published || identity.can_manage(&challenge.user_id)) {
            return Err(Error::Unauthorized(format!(
                "challenge {} is not published",
                challenge.id
            )));
        }
        Self::validate_ids(&challenge, identity)?;

        if let Some(running) = discovery::find_running_instance(
            self.cluster.as_ref(),
            &identity.user_id,
            &challenge.id,
            InstanceMode::Challenge,
        )
        .await?
        {
            info!(namespace = %running.namespace, "Instance already running");
            return Ok(StartResponse {
                url: self.url_of(&running)?,
                seconds_left: timeout::seconds_left(
                    running.created_at,
                    Utc::now(),
                    self.config.lifetime(),
                ),
                started: true,
                verified: challenge.verified,
            });
        }

        quota::check(
            self.cluster.as_ref(),
            &self.config,
            &identity.user_id,
            identity.is_admin(),
            InstanceMode::Challenge,
        )
        .await?;

        let provisioned = self
            .launch(&challenge, &identity.user_id, InstanceMode::Challenge)
            .await?;
        Ok(StartResponse {
            url: provisioned.url,
            seconds_left: provisioned.seconds_left,
            started: true,
            verified: challenge.verified,
        })
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn stop_instance(&self, identity: &Identity, reference: &str) -> Result<MessageResponse> {
        let challenge = self.resolve_challenge(reference).await?;
        let running = discovery::find_running_instance(
            self.cluster.as_ref(),
            &identity.user_id,
            &challenge.id,
            InstanceMode::Challenge,
        )
        .await?
        .ok_or_else(|| Error::NotFound("Running instance".to_string()))?;

        self.provisioner.teardown(&running.namespace).await?;
        Ok(MessageResponse::new("Instance stopped"))
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn status(&self, identity: &Identity, reference: &str) -> Result<StatusResponse> {
        let challenge = self.resolve_challenge(reference).await?;
        let Some(running) = discovery::find_running_instance(
            self.cluster.as_ref(),
            &identity.user_id,
            &challenge.id,
            InstanceMode::Challenge,
        )
        .await?
        else {
            return Ok(StatusResponse::not_started());
        };

        let pods = self.cluster.list_pods(&running.namespace).await?;
        let ready = state::container_ready(&pods, CHALLENGE_CONTAINER)
            || state::container_ready(&pods, VM_COMPUTE_CONTAINER);

        Ok(StatusResponse {
            url: Some(self.url_of(&running)?),
            ready: Some(ready),
            seconds_left: Some(timeout::seconds_left(
                running.created_at,
                Utc::now(),
                self.config.lifetime(),
            )),
            started: true,
        })
    }

    /// Log text of the caller's running challenge workload
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn logs(&self, identity: &Identity, reference: &str) -> Result<String> {
        let challenge = self.resolve_challenge(reference).await?;
        if !identity.can_manage(&challenge.user_id) {
            return Err(Error::Unauthorized("only the author may read logs".to_string()));
        }
        let running = discovery::find_running_instance(
            self.cluster.as_ref(),
            &identity.user_id,
            &challenge.id,
            InstanceMode::Challenge,
        )
        .await?
        .ok_or_else(|| Error::NotFound("Running instance".to_string()))?;

        let pods = self.cluster.list_pods(&running.namespace).await?;
        let (pod, container) = pods
            .iter()
            .find_map(|pod| {
                let spec = pod.spec.as_ref()?;
                let container = spec
                    .containers
                    .iter()
                    .map(|c| c.name.as_str())
                    .find(|name| *name == CHALLENGE_CONTAINER || *name == VM_CONSOLE_CONTAINER)?;
                Some((pod.metadata.name.clone()?, container.to_string()))
            })
            .ok_or_else(|| Error::NotFound("Workload pod".to_string()))?;

        self.cluster
            .pod_logs(&running.namespace, &pod, &container)
            .await
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn start_test(&self, identity: &Identity, reference: &str) -> Result<TestResponse> {
        let challenge = self.resolve_challenge(reference).await?;
        if !identity.can_manage(&challenge.user_id) {
            return Err(Error::Unauthorized(
                "only the author may test a challenge".to_string(),
            ));
        }
        Self::validate_ids(&challenge, identity)?;

        let running = discovery::find_running_instance(
            self.cluster.as_ref(),
            &identity.user_id,
            &challenge.id,
            InstanceMode::Test,
        )
        .await?;

        if running.is_none() {
            quota::check(
                self.cluster.as_ref(),
                &self.config,
                &identity.user_id,
                identity.is_admin(),
                InstanceMode::Test,
            )
            .await?;
            self.launch(&challenge, &identity.user_id, InstanceMode::Test)
                .await?;
        }

        Ok(TestResponse {
            started: true,
            verified: challenge.verified,
        })
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn stop_test(&self, identity: &Identity, reference: &str) -> Result<MessageResponse> {
        let challenge = self.resolve_challenge(reference).await?;
        if !identity.can_manage(&challenge.user_id) {
            return Err(Error::Unauthorized(
                "only the author may stop a test".to_string(),
            ));
        }
        let running = discovery::find_running_instance(
            self.cluster.as_ref(),
            &identity.user_id,
            &challenge.id,
            InstanceMode::Test,
        )
        .await?
        .ok_or_else(|| Error::NotFound("Running test".to_string()))?;

        self.provisioner.teardown(&running.namespace).await?;
        Ok(MessageResponse::new("Test stopped"))
    }

    /// Check a flag posted by a test sandbox. The test namespace is deleted
    /// whatever the outcome, a malformed submission included.
    #[instrument(skip(self, submission))]
    pub async fn verify_flag(
        &self,
        reference: &str,
        submission: Submission,
    ) -> Result<VerifyOutcome> {
        let challenge = self.resolve_challenge(reference).await?;
        let running = discovery::find_running_instance(
            self.cluster.as_ref(),
            "",
            &challenge.id,
            InstanceMode::Test,
        )
        .await?
        .ok_or_else(|| Error::NotFound("Running test".to_string()))?;

        self.provisioner.teardown(&running.namespace).await?;

        let flag = match submission {
            Submission::Flag(flag) => flag,
            Submission::Malformed(reason) => {
                return Err(Error::BadRequest(format!(
                    "invalid verification payload: {}",
                    reason
                )))
            }
        };

        let expected = self
            .store
            .get_challenge_flag(&challenge.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Flag of challenge {}", challenge.id)))?;

        if flag == expected {
            self.store.mark_verified(&challenge.id).await?;
            info!(challenge_id = %challenge.id, "Solution verified");
            Ok(VerifyOutcome::Success)
        } else {
            info!(challenge_id = %challenge.id, "Solution submitted a wrong flag");
            Ok(VerifyOutcome::Failure { submitted: flag })
        }
    }

    /// Bundle bytes for a sandbox holding a valid download token
    pub async fn download(
        &self,
        challenge_id: &str,
        download_token: &str,
        kind: ArtifactKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        token::authorize_download(self.store.as_ref(), challenge_id, download_token, now).await?;
        self.bundles.read(challenge_id, kind).await
    }
}
