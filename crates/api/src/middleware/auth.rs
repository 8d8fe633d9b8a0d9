//! Request authentication for machine callers.
//!
//! - [`CronAuth`]: `Authorization: Bearer <CRON_SECRET>` on the sweep trigger.
//! - [`ServiceAuth`]: `Authorization: Bearer <INTERNAL_API_TOKEN>` on the
//!   start and cancel endpoints.
//! - [`verify_signature`]: HMAC signature of the raw webhook body.
//!
//! An unconfigured secret rejects every request.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use brandlens_core::dispatch::SIGNATURE_HEADER;
use brandlens_core::error::CoreError;
use brandlens_core::signing::verify_payload;

use crate::error::AppError;
use crate::state::AppState;

/// Caller presented the cron secret.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

impl FromRequestParts<AppState> for CronAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        check_bearer(&parts.headers, state.config.cron_secret.as_deref())?;
        Ok(CronAuth)
    }
}

/// Caller presented the internal service token.
#[derive(Debug, Clone, Copy)]
pub struct ServiceAuth;

impl FromRequestParts<AppState> for ServiceAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        check_bearer(&parts.headers, state.config.internal_api_token.as_deref())?;
        Ok(ServiceAuth)
    }
}

fn unauthorized(message: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(message.into()))
}

fn check_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AppError> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Invalid Authorization format. Expected: Bearer <token>"))?;

    match expected {
        Some(expected) if tokens_match(token.trim(), expected) => Ok(()),
        Some(_) => Err(unauthorized("Invalid token")),
        None => {
            tracing::warn!("Bearer-protected endpoint called but no secret is configured");
            Err(unauthorized("Invalid token"))
        }
    }
}

/// Compare without exiting at the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify the signature header against the exact bytes received.
pub fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<(), AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Missing signature"))?;

    if !verify_payload(secret, body, signature) {
        tracing::warn!("Rejected webhook with invalid signature");
        return Err(unauthorized("Invalid signature"));
    }
    Ok(())
}
