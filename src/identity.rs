//! Caller identity resolved from an HS256 bearer token.

use crate::error::{Error, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Developer,
    Player,
}

/// Token claims as issued by the platform
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "UserId")]
    pub user_id: String,
    #[serde(rename = "Role")]
    pub role: Role,
    pub exp: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners and admins may manage a challenge's instances
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}

/// Validate an `Authorization` header value of the form `Bearer <jwt>`
pub fn from_bearer(header: &str, secret: &str) -> Result<Identity> {
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthorized("expected a bearer token".to_string()))?;
    if secret.is_empty() {
        return Err(Error::Unauthorized("token validation is not configured".to_string()));
    }

    let data = decode::<Claims>(
        token.trim(),
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| Error::Unauthorized(format!("invalid token: {}", e)))?;

    Ok(Identity {
        user_id: data.claims.user_id,
        role: data.claims.role,
    })
}

/// Sign a token for `identity`; used by tests
#[cfg(test)]
pub fn issue(identity: &Identity, secret: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        user_id: identity.user_id.clone(),
        role: identity.role,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
