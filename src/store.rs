//! Challenge metadata and instance audit rows.
//!
//! The deployer only reads challenges and flips `verified`; challenge CRUD lives
//! elsewhere. Instance rows are written on every start and never deleted.

use crate::{
    error::{Error, Result},
    token,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub published: bool,
    /// Id of the challenge on the grading platform, if published there
    #[serde(default)]
    pub ctfd_id: Option<i64>,
    #[serde(default)]
    pub verified: bool,
    pub flag: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub challenge_id: String,
    pub player_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn get_challenge(&self, id: &str) -> Result<Option<Challenge>>;

    async fn get_challenge_by_ctfd_id(&self, ctfd_id: i64) -> Result<Option<Challenge>>;

    async fn get_challenge_flag(&self, id: &str) -> Result<Option<String>>;

    async fn mark_verified(&self, id: &str) -> Result<()>;

    /// Record a new instance with a fresh id and download token
    async fn create_instance(&self, player_id: &str, challenge_id: &str) -> Result<Instance>;

    async fn get_instance(&self, challenge_id: &str, token: &str) -> Result<Option<Instance>>;
}

#[derive(Default)]
struct Tables {
    challenges: BTreeMap<String, Challenge>,
    instances: Vec<Instance>,
}

/// In-process [`ChallengeStore`]
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_challenges(challenges: impl IntoIterator<Item = Challenge>) -> Self {
        let challenges = challenges
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        Self {
            tables: RwLock::new(Tables {
                challenges,
                instances: Vec::new(),
            }),
        }
    }

    /// Seed from a YAML list of challenges
    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let challenges: Vec<Challenge> = serde_yaml::from_str(&raw)
            .map_err(|e| Error::StoreError(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), count = challenges.len(), "Seeded challenge store");
        Ok(Self::with_challenges(challenges))
    }

    pub async fn instance_count(&self) -> usize {
        self.tables.read().await.instances.len()
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn get_challenge(&self, id: &str) -> Result<Option<Challenge>> {
        Ok(self.tables.read().await.challenges.get(id).cloned())
    }

    async fn get_challenge_by_ctfd_id(&self, ctfd_id: i64) -> Result<Option<Challenge>> {
        Ok(self
            .tables
            .read()
            .await
            .challenges
            .values()
            .find(|c| c.ctfd_id == Some(ctfd_id))
            .cloned())
    }

    async fn get_challenge_flag(&self, id: &str) -> Result<Option<String>> {
        Ok(self
            .tables
            .read()
            .await
            .challenges
            .get(id)
            .map(|c| c.flag.clone()))
    }

    async fn mark_verified(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let challenge = tables
            .challenges
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Challenge {}", id)))?;
        challenge.verified = true;
        Ok(())
    }

    async fn create_instance(&self, player_id: &str, challenge_id: &str) -> Result<Instance> {
        let instance = Instance {
            id: Uuid::new_v4().to_string(),
            challenge_id: challenge_id.to_string(),
            player_id: player_id.to_string(),
            token: token::mint_token(),
            created_at: Utc::now(),
        };
        self.tables.write().await.instances.push(instance.clone());
        Ok(instance)
    }

    async fn get_instance(&self, challenge_id: &str, token: &str) -> Result<Option<Instance>> {
        Ok(self
            .tables
            .read()
            .await
            .instances
            .iter()
            .find(|i| i.challenge_id == challenge_id && i.token == token)
            .cloned())
    }
}
