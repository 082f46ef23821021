//! Deterministic names derived from instance identifiers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of instance id characters used in namespace names and public domains
pub const INSTANCE_PREFIX_LEN: usize = 18;

pub const CHALLENGE_NAMESPACE_PREFIX: &str = "challenge-";
pub const TEST_NAMESPACE_PREFIX: &str = "test-";

/// Whether an instance is a player-facing challenge or an author-facing solution test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceMode {
    Challenge,
    Test,
}

impl InstanceMode {
    pub fn namespace_prefix(self) -> &'static str {
        match self {
            InstanceMode::Challenge => CHALLENGE_NAMESPACE_PREFIX,
            InstanceMode::Test => TEST_NAMESPACE_PREFIX,
        }
    }

    pub fn is_test(self) -> bool {
        self == InstanceMode::Test
    }

    /// Value of the `testmode` namespace label
    pub fn label_value(self) -> &'static str {
        match self {
            InstanceMode::Challenge => "false",
            InstanceMode::Test => "true",
        }
    }

    /// Generate a namespace name from an instance id
    pub fn namespace_name(self, instance_id: &str) -> Result<String> {
        Ok(format!(
            "{}{}",
            self.namespace_prefix(),
            instance_prefix(instance_id)?
        ))
    }
}

/// First 18 characters of an instance id
pub fn instance_prefix(instance_id: &str) -> Result<&str> {
    instance_id
        .get(..INSTANCE_PREFIX_LEN)
        .ok_or_else(|| Error::InvalidInstanceId(instance_id.to_string()))
}

/// Public domain of an instance: instance prefix followed by the configured suffix
pub fn public_domain(instance_id: &str, domain_suffix: &str) -> Result<String> {
    Ok(format!("{}{}", instance_prefix(instance_id)?, domain_suffix))
}
