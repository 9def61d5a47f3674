use argon2::{
    password_hash::{
        self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
    protocol::LoginResponse,
};
use storage::StoredUser;
use tracing::{debug, info};

use crate::{
    access::{Principal, DASHBOARD_ROUTE, ONBOARDING_ROUTE},
    internal, ApiContext,
};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub fn mint_session_token(
    cfg: &SessionConfig,
    user_id: UserId,
) -> Result<(String, DateTime<Utc>), jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        sub: format!("user:{}", user_id.0),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )?;
    let expires_at = Utc.timestamp_opt(claims.exp, 0).single().unwrap_or(exp);
    Ok((token, expires_at))
}

/// The user a session token was issued to, or `None` for anything invalid or expired.
pub fn verify_session_token(cfg: &SessionConfig, token: &str) -> Option<UserId> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|error| debug!(%error, "rejecting session token"))
    .ok()?;
    decoded
        .claims
        .sub
        .strip_prefix("user:")
        .and_then(|id| id.parse::<i64>().ok())
        .map(UserId)
}

/// Argon2id with a random salt, stored as a PHC string.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// `false` for a wrong password and for anything that is not a PHC string.
pub fn verify_password(stored: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub async fn login(
    ctx: &ApiContext,
    username: &str,
    password: &str,
) -> Result<LoginResponse, ApiError> {
    let user = ctx
        .storage
        .find_user_by_username(username)
        .await
        .map_err(internal)?
        .filter(|user| verify_password(&user.password_hash, password))
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "invalid username or password"))?;

    let (token, expires_at) = mint_session_token(&ctx.sessions, user.user_id)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("session mint failed: {e}")))?;
    info!(user_id = user.user_id.0, "user logged in");

    let redirect_to = if user.onboarding_completed() {
        DASHBOARD_ROUTE
    } else {
        ONBOARDING_ROUTE
    };
    Ok(LoginResponse {
        user_id: user.user_id,
        token,
        expires_at,
        redirect_to: redirect_to.to_string(),
    })
}

/// Resolves a session token to the current state of its user. Deleted users
/// and invalid tokens resolve to `None`.
pub async fn resolve_principal(
    ctx: &ApiContext,
    token: &str,
) -> Result<Option<Principal>, ApiError> {
    let Some(user_id) = verify_session_token(&ctx.sessions, token) else {
        return Ok(None);
    };
    let user = ctx.storage.load_user(user_id).await.map_err(internal)?;
    Ok(user.map(principal_for))
}

pub fn principal_for(user: StoredUser) -> Principal {
    Principal {
        onboarding_completed: user.onboarding_completed(),
        user_id: user.user_id,
        username: user.username,
        roles: user.roles.into_iter().collect(),
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
