pub mod chats;
pub mod files;
pub mod health;
pub mod voice;

use std::sync::Arc;
use std::str::FromStr;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use conflux_core::error::ConfluxError;
use conflux_core::types::UserId;
use serde::Serialize;

use crate::app::AppState;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn error_response(e: impl Into<ConfluxError>) -> ApiError {
    let e = e.into();
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody { error: e.to_string() }))
}

fn unauthorized(message: &str) -> ApiError {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody { error: message.to_string() }))
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message.into() }))
}

/// Every non-auth endpoint calls this first. Issuance of the token itself is
/// out of scope here — this only verifies what's presented.
pub async fn authenticate(state: &Arc<AppState>, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let token = crate::auth::extract_bearer(headers)
        .ok_or_else(|| unauthorized("missing Authorization: Bearer <token> header"))?;
    state
        .auth
        .verify(token)
        .await
        .ok_or_else(|| unauthorized("invalid or expired token"))
}

pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| bad_request(format!("invalid {what}: {raw}")))
}
