use chrono::{DateTime, Duration, Utc};

/// A namespace is expired once its age strictly exceeds the lifetime.
/// A namespace without a creation timestamp never expires.
pub fn is_expired(created: Option<DateTime<Utc>>, now: DateTime<Utc>, lifetime: Duration) -> bool {
    created
        .map(|created| now - created > lifetime)
        .unwrap_or(false)
}

/// Seconds left before expiry, floored at zero
pub fn seconds_left(created: Option<DateTime<Utc>>, now: DateTime<Utc>, lifetime: Duration) -> i64 {
    match created {
        Some(created) => (lifetime - (now - created)).num_seconds().max(0),
        None => lifetime.num_seconds(),
    }
}
