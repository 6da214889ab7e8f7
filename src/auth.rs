//! Bearer token authentication for the job endpoints.
//!
//! Tokens are HS256 JWTs issued by the account service; `sub` carries the
//! internal user id.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::job::UserId;
use crate::services::access::Denial;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: UserId,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    pub iat: i64,
}

/// Sign a token for `user_id`. Used by local tooling and tests.
pub fn issue_token(
    user_id: UserId,
    secret: &str,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id,
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// The caller behind a request. Requests without an `Authorization` header
/// extract as anonymous; the access gate decides what anonymous callers may do.
/// A header that is present but malformed or invalid is rejected with 401.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: Option<UserId>,
}

impl Caller {
    pub fn require(&self) -> Result<UserId, ApiError> {
        self.user_id.ok_or_else(|| Denial::Unauthenticated.into())
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Caller { user_id: None });
        };

        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::Unauthorized(
                    "Invalid Authorization format. Expected: Bearer <token>".into(),
                )
            })?;

        let claims = validate_token(token.trim(), &state.jwt_secret)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

        Ok(Caller {
            user_id: Some(claims.sub),
        })
    }
}
