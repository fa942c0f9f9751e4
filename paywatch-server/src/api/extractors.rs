//! Custom Axum extractors for request authentication.
//!
//! Provides `AdminAuth`, which checks the plaintext secret carried in the
//! `Paywatch-Admin-Authorization` header against the configured argon2 hash.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use paywatch_sdk::signature::ADMIN_AUTH_HEADER;

use crate::state::AppState;

/// Proof that the request carried the admin secret.
pub struct AdminAuth;

/// Errors returned by the [`AdminAuth`] extractor.
#[derive(Debug)]
pub enum AdminAuthError {
    MissingHeader,
    InvalidHeader,
    WrongSecret,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminAuthError::MissingHeader => (
                StatusCode::UNAUTHORIZED,
                "missing Paywatch-Admin-Authorization header",
            ),
            AdminAuthError::InvalidHeader => (
                StatusCode::BAD_REQUEST,
                "invalid Paywatch-Admin-Authorization header",
            ),
            AdminAuthError::WrongSecret => (StatusCode::UNAUTHORIZED, "invalid admin secret"),
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidHeader)?
            .to_owned();

        // argon2 verification is CPU bound.
        let admin = state.admin.read();
        let verified = tokio::task::spawn_blocking(move || admin.verify(&secret))
            .await
            .unwrap_or(false);

        if verified {
            Ok(AdminAuth)
        } else {
            tracing::warn!("Rejected admin request with a wrong secret");
            Err(AdminAuthError::WrongSecret)
        }
    }
}
