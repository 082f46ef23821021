use crate::{
    error::{Error, Result},
    naming::InstanceMode,
};
use std::collections::BTreeMap;

pub const CHALLENGE_ID: &str = "challengeid";
pub const INSTANCE_ID: &str = "instanceid";
pub const PLAYER_ID: &str = "playerid";
pub const TEST_MODE: &str = "testmode";

pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "challenge-deployer";

/// Label carried by every workload pod; services and the network policy select on it
pub const WORKLOAD: &str = "app.kubernetes.io/name";
pub const WORKLOAD_VALUE: &str = "challenge";

/// Generate labels for an instance namespace
pub fn namespace_labels(
    challenge_id: &str,
    instance_id: &str,
    player_id: &str,
    mode: InstanceMode,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(CHALLENGE_ID.to_string(), challenge_id.to_string());
    labels.insert(INSTANCE_ID.to_string(), instance_id.to_string());
    labels.insert(PLAYER_ID.to_string(), player_id.to_string());
    labels.insert(TEST_MODE.to_string(), mode.label_value().to_string());
    labels
}

/// Generate labels for workload pods
pub fn workload_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(WORKLOAD.to_string(), WORKLOAD_VALUE.to_string());
    labels
}

/// Generate selector labels for workload pods
pub fn workload_selector() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(WORKLOAD.to_string(), WORKLOAD_VALUE.to_string());
    labels
}

/// Equality label selector; terms are joined with commas (logical AND)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector(Vec<(String, String)>);

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    /// Selector for running instances of one mode.
    /// Test slots are scoped to the challenge, so test mode ignores the player.
    pub fn instances(player_id: &str, challenge_id: &str, mode: InstanceMode) -> Self {
        let selector = Selector::new();
        let selector = match mode {
            InstanceMode::Challenge => selector.with(PLAYER_ID, player_id),
            InstanceMode::Test => selector,
        };
        selector
            .with(CHALLENGE_ID, challenge_id)
            .with(TEST_MODE, mode.label_value())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every term is present in `labels`
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0
            .iter()
            .all(|(k, v)| labels.get(k).map(|l| l == v).unwrap_or(false))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let terms: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", terms.join(","))
    }
}

/// Selectors are built by concatenation without escaping, so identifiers used as
/// label values must stay inside the label value alphabet.
pub fn validate_label_value(value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.ends_with(|c: char| c.is_ascii_alphanumeric());

    if valid {
        Ok(())
    } else {
        Err(Error::BadRequest(format!(
            "identifier {:?} is not a valid label value",
            value
        )))
    }
}
