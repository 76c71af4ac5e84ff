//! Bearer JWT authentication for the registry API
//!
//! Tokens are issued by the external auth layer (HS256, shared secret).
//! The middleware verifies them and inserts a [`CallerIdentity`] into the
//! request extensions; handlers read it to stamp `updated_by` and to check
//! permission levels.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::AppError;

use crate::state::AppState;

/// JWT claims issued by the auth layer
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub permission_level: i32,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated caller extracted from the JWT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub name: String,
    pub permission_level: i32,
}

impl CallerIdentity {
    /// Value written to `updated_by` / `created_by`
    pub fn actor(&self) -> &str {
        if self.name.is_empty() {
            &self.user_id
        } else {
            &self.name
        }
    }
}

const JWT_EXPIRY_HOURS: i64 = 12;

/// Create a token (operator tooling and tests)
pub fn create_token(
    user_id: &str,
    name: &str,
    permission_level: i32,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        name: name.to_string(),
        permission_level,
        exp: (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a token and turn it into a caller identity
pub fn verify_token(token: &str, secret: &str) -> Result<CallerIdentity, AppError> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::token_expired(),
        _ => AppError::invalid_token("Invalid or expired token"),
    })?;

    Ok(CallerIdentity {
        user_id: token_data.claims.sub,
        name: token_data.claims.name,
        permission_level: token_data.claims.permission_level,
    })
}

/// Middleware that extracts and verifies the bearer token
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            tracing::warn!(
                target: "security",
                path = %request.uri().path(),
                "Missing or malformed Authorization header"
            );
            AppError::not_authenticated().into_response()
        })?;

    let identity = verify_token(token, &state.jwt_secret).map_err(|e| {
        tracing::warn!(
            target: "security",
            path = %request.uri().path(),
            reason = %e.message,
            "JWT validation failed"
        );
        e.into_response()
    })?;

    request.extensions_mut().insert(identity.clone());
    let mut response = next.run(request).await;
    // Outer layers (request logging) only see the response
    response.extensions_mut().insert(identity);
    Ok(response)
}
