//! Admission check limiting concurrently running instances.
//!
//! Challenge instances are counted per player, test instances cluster-wide.
//! The count and the later create are not atomic.

use crate::{
    cluster::ClusterClient,
    config::DeployerConfig,
    discovery,
    error::{Error, Result},
    naming::InstanceMode,
    resources::labels::{self, Selector},
};
use tracing::{debug, warn};

/// Selector counted against the ceiling of `mode`
pub fn quota_selector(player_id: &str, mode: InstanceMode) -> Selector {
    let selector = match mode {
        InstanceMode::Challenge => Selector::new().with(labels::PLAYER_ID, player_id),
        InstanceMode::Test => Selector::new(),
    };
    selector.with(labels::TEST_MODE, mode.label_value())
}

pub fn limit(config: &DeployerConfig, mode: InstanceMode) -> usize {
    match mode {
        InstanceMode::Challenge => config.max_concurrent_challenges,
        InstanceMode::Test => config.max_concurrent_tests,
    }
}

/// Reject with [`Error::QuotaExceeded`] when `running >= limit`; admins always pass
pub async fn check(
    cluster: &dyn ClusterClient,
    config: &DeployerConfig,
    player_id: &str,
    is_admin: bool,
    mode: InstanceMode,
) -> Result<()> {
    if is_admin {
        return Ok(());
    }

    let limit = limit(config, mode);
    let running = discovery::count_running(cluster, &quota_selector(player_id, mode)).await?;
    debug!(player_id, ?mode, running, limit, "Quota check");

    if running >= limit {
        warn!(player_id, ?mode, running, limit, "Quota exceeded");
        return Err(Error::QuotaExceeded { running, limit });
    }
    Ok(())
}
