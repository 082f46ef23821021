//! Short-lived tokens authorizing unauthenticated bundle downloads from inside a sandbox.
//!
//! A token is minted per instance and stored with its row. It stays valid for
//! [`DOWNLOAD_WINDOW_MINUTES`] after the row was created, may be redeemed any
//! number of times in that window, and is not revoked when the instance stops.

use crate::{
    error::{Error, Result},
    store::{ChallengeStore, Instance},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use tracing::debug;

pub const TOKEN_BYTES: usize = 32;
pub const DOWNLOAD_WINDOW_MINUTES: i64 = 20;

/// 32 random bytes, URL-safe base64 without padding
pub fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// True while `now - created < 20 minutes`
pub fn within_window(created: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now < created + Duration::minutes(DOWNLOAD_WINDOW_MINUTES)
}

/// Resolve the instance row a download token belongs to and check its window
pub async fn authorize_download(
    store: &dyn ChallengeStore,
    challenge_id: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Instance> {
    if token.is_empty() {
        return Err(Error::Unauthorized("missing download token".to_string()));
    }

    let instance = store
        .get_instance(challenge_id, token)
        .await?
        .ok_or_else(|| Error::Unauthorized("unknown download token".to_string()))?;

    if !within_window(instance.created_at, now) {
        debug!(challenge_id, instance_id = %instance.id, "Download token expired");
        return Err(Error::Unauthorized("download token expired".to_string()));
    }
    Ok(instance)
}
