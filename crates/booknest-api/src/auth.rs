use std::num::NonZeroU32;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use booknest_core::{Role, User};
use chrono::{Duration, Utc};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, lifetime_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            lifetime: Duration::days(lifetime_days),
        }
    }

    pub fn issue(&self, user: &User) -> ApiResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Rejected token: {}", e);
                None
            }
        }
    }
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Per-key limiter for the login and registration endpoints.
pub struct LoginLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl LoginLimiter {
    pub fn new(per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn check(&self, key: &str) -> ApiResult<()> {
        self.limiter
            .check_key(&key.to_lowercase())
            .map_err(|_| {
                warn!(key = %key, "Auth rate limit hit");
                ApiError::TooManyRequests
            })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The caller, as described by a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            role: claims.role,
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(ApiError::unauthorized)?;
        state
            .tokens
            .verify(token)
            .map(AuthUser::from)
            .ok_or_else(ApiError::unauthorized)
    }
}

impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(bearer_token(parts)
            .and_then(|token| state.tokens.verify(token))
            .map(AuthUser::from))
    }
}

/// Optional authentication: `None` without a valid bearer token.
pub type MaybeUser = Option<AuthUser>;

/// An authenticated caller whose stored role is admin. The role is re-read
/// from the store so that demotions apply before the token expires.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let caller = <AuthUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await?;
        let user = state
            .store
            .user_by_id(&caller.id)
            .await?
            .ok_or_else(ApiError::unauthorized)?;
        if !user.is_admin() {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new("reader01", "reader@example.com", "x".into()).unwrap()
    }

    #[test]
    fn tokens_round_trip_with_claims() {
        let keys = TokenKeys::new("secret", 60);
        let user = user();
        let token = keys.issue(&user).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "reader01");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.exp - claims.iat, 60 * 24 * 3600);
    }

    #[test]
    fn foreign_and_expired_tokens_are_rejected() {
        let user = user();
        let token = TokenKeys::new("other", 60).issue(&user).unwrap();
        assert!(TokenKeys::new("secret", 60).verify(&token).is_none());

        let expired = TokenKeys::new("secret", -1).issue(&user).unwrap();
        assert!(TokenKeys::new("secret", 60).verify(&expired).is_none());
    }

    #[test]
    fn passwords_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn limiter_counts_per_key() {
        let limiter = LoginLimiter::new(2);
        assert!(limiter.check("alice").is_ok());
        assert!(limiter.check("Alice").is_ok());
        assert!(matches!(limiter.check("alice"), Err(ApiError::TooManyRequests)));
        assert!(limiter.check("bob").is_ok());
    }
}
