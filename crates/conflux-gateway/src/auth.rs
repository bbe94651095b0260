//! Bearer-token verification. Issuance lives outside this crate entirely —
//! `TokenVerifier` only ever answers "who is this token for", never mints one.

use axum::http::HeaderMap;
use conflux_core::config::AuthMode;
use conflux_core::types::UserId;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use conflux_users::UserResolver;

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<UserId>;
}

/// Bring-up verifier (`AuthMode::Static`): the bearer token literally is the
/// user's id, confirmed to exist via the directory cache. No signing, no
/// expiry — meant for local development and test fixtures, not production.
pub struct StaticVerifier {
    users: Arc<UserResolver>,
}

impl StaticVerifier {
    pub fn new(users: Arc<UserResolver>) -> Self {
        Self { users }
    }
}

#[async_trait::async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Option<UserId> {
        let user_id = UserId::from_str(token).ok()?;
        match self.users.get_user(&user_id.to_string()) {
            Ok(Some(_)) => Some(user_id),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "user lookup failed during static auth");
                None
            }
        }
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// `AuthMode::Jwt`: decodes a token minted by the external identity system
/// and trusts its `sub` claim as the user id. The signing key never leaves
/// that system — this crate only ever holds the symmetric verification
/// secret, which is exactly what `jwt_secret` in `AuthConfig` is for.
pub struct JwtVerifier {
    secret: String,
}

impl JwtVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Option<UserId> {
        let key = DecodingKey::from_secret(self.secret.as_bytes());
        let data = decode::<Claims>(token, &key, &Validation::default()).ok()?;
        UserId::from_str(&data.claims.sub).ok()
    }
}

/// Build the verifier matching the configured auth mode.
pub fn build_verifier(
    mode: &AuthMode,
    jwt_secret: Option<&str>,
    users: Arc<UserResolver>,
) -> Arc<dyn TokenVerifier> {
    match mode {
        AuthMode::Static => Arc::new(StaticVerifier::new(users)),
        AuthMode::Jwt => {
            let secret = jwt_secret.unwrap_or("change-me").to_string();
            Arc::new(JwtVerifier::new(secret))
        }
    }
}
