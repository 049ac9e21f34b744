//! Authentication middleware for protected endpoints.
//!
//! Two auth schemes are in play:
//!
//! - Internal-service routes (`/internal/v1/...`) present a static service
//!   token in the `Authorization: Bearer <token>` header. The token is
//!   compared against the configured `INTERNAL_SERVICE_TOKEN` without a
//!   timing side channel.
//! - User-facing routes (`/api/v1/...`) present a JWT access token issued by
//!   the platform's auth service. The middleware verifies the signature and
//!   expiry and injects the authenticated user ID into request extensions.
//!
//! # Extracting User ID
//!
//! In handler functions, extract the user ID from request extensions:
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//!
//! async fn protected_handler(Extension(user_id): Extension<i64>) -> String {
//!     format!("Authenticated as user {}", user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::AppState;

/// Claims carried by platform-issued access tokens. Issuance lives in the
/// platform's auth service; this server only verifies.
#[derive(Debug, Deserialize)]
pub struct AccessTokenClaims {
    /// User ID
    pub sub: i64,
    /// Expiry (unix timestamp)
    pub exp: i64,
    /// Issued at (unix timestamp)
    pub iat: i64,
}

/// Compare two tokens without a timing side channel by comparing digests.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided == expected
}

/// Pull the bearer token out of the Authorization header.
fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Service-token middleware for internal routes.
///
/// # Behavior
///
/// - **Valid token**: Calls next handler
/// - **Missing header**: Returns `401 Unauthorized`
/// - **Wrong token**: Returns `403 Forbidden`
pub async fn service_token_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = match bearer_token(&request) {
        Some(t) => t,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    if !tokens_match(token, &state.service_token) {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}

/// JWT middleware for user-facing routes.
///
/// Extracts the JWT access token from the `Authorization: Bearer <token>`
/// header, verifies it, and injects the user ID into request extensions.
///
/// # Behavior
///
/// - **Success**: Token valid → Injects `user_id: i64` into request extensions → Calls next handler
/// - **Missing header**: Returns `401 Unauthorized`
/// - **Invalid/expired token**: Returns `401 Unauthorized`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = match bearer_token(&request) {
        Some(t) => t,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    let token_data = decode::<AccessTokenClaims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    );

    match token_data {
        Ok(data) => {
            // Add user_id to request extensions
            request.extensions_mut().insert(data.claims.sub);
            Ok(next.run(request).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("secret-token", "secret-token"));
        assert!(!tokens_match("secret-token", "other-token"));
        assert!(!tokens_match("", "secret-token"));
    }
}
