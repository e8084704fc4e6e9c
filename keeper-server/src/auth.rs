use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;
use crate::telemetry::CorrelationId;

/// Session lifetime used when the configuration does not override it.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is invalid")]
    TokenInvalid,
    #[error("token carries no user identity")]
    NoIdentity,
    #[error("token expired")]
    Expired,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(default)]
    uid: u64,
    #[serde(default)]
    iat: i64,
    exp: i64,
}

/// Identity resolved from a validated bearer token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: u64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Lifetime in whole seconds.
    pub expires_in: u64,
}

/// Issues and validates HS256 session tokens.
///
/// Tokens are self-contained: validation checks only the signature, the
/// embedded identity and the expiry. There is no revocation list.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked in `validate_at` so it can be told apart from a bad signature.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: u64) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: u64, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        if user_id == 0 {
            return Err(TokenError::NoIdentity);
        }
        let ttl = TimeDelta::from_std(self.ttl).map_err(|err| TokenError::Signing(err.to_string()))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Signing("token ttl overflows".into()))?;
        let claims = Claims {
            uid: user_id,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))?;
        Ok(IssuedToken {
            token,
            expires_at,
            expires_in: self.ttl.as_secs(),
        })
    }

    pub fn validate(&self, token: &str) -> Result<u64, TokenError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<u64, TokenError> {
        let data = decode::<Claims>(token.trim(), &self.decoding, &self.validation).map_err(|err| {
            debug!(error = %err, "rejecting token");
            TokenError::TokenInvalid
        })?;
        let claims = data.claims;
        if claims.uid == 0 {
            return Err(TokenError::NoIdentity);
        }
        if now.timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims.uid)
    }
}

pub fn extract_bearer_token(value: &str) -> Option<&str> {
    let value = value.trim();
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the caller's identity and stores an [`AuthContext`] in the
/// request extensions. Any failure short-circuits with 401.
pub async fn http_layer(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let correlation = req.extensions().get::<CorrelationId>().cloned();
    let reject = |err: AppError| match &correlation {
        Some(id) => err.with_correlation(id.0.clone()).into_response(),
        None => err.into_response(),
    };

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_owned);

    let Some(token) = token else {
        return reject(AppError::unauthorized("missing authorization header"));
    };

    match state.tokens.validate(&token) {
        Ok(user_id) => {
            req.extensions_mut().insert(AuthContext { user_id });
            next.run(req).await
        }
        Err(err) => reject(AppError::from(err)),
    }
}
