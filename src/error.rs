//! Unified application error model and mapping helpers.
//! Every rejection the request pipeline or a handler can produce is one `AppError`
//! variant; the variant decides the HTTP status and the JSON envelope sent back.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::storage::StoreError;

const SERVER_ERROR_MESSAGE: &str = "the server encountered a problem and could not process your request";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    BadRequest { code: String, message: String },
    Validation { code: String, fields: BTreeMap<String, String> },
    NotFound { code: String, message: String },
    MethodNotAllowed { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    RateLimited { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::BadRequest { code, .. }
            | AppError::Validation { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::MethodNotAllowed { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::RateLimited { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { .. } => "failed validation",
            AppError::BadRequest { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::MethodNotAllowed { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::RateLimited { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn bad_request<S: Into<String>>(msg: S) -> Self { AppError::BadRequest { code: "bad_request".into(), message: msg.into() } }
    pub fn failed_validation(fields: BTreeMap<String, String>) -> Self { AppError::Validation { code: "failed_validation".into(), fields } }
    pub fn not_found() -> Self { AppError::NotFound { code: "not_found".into(), message: "the requested resource could not be found".into() } }
    pub fn method_not_allowed(method: &str) -> Self {
        AppError::MethodNotAllowed { code: "method_not_allowed".into(), message: format!("the {} method is not supported for this resource", method) }
    }
    pub fn edit_conflict() -> Self {
        AppError::Conflict { code: "edit_conflict".into(), message: "unable to update the record due to an edit conflict, please try again".into() }
    }
    pub fn invalid_authentication_token() -> Self {
        AppError::Auth { code: "invalid_authentication_token".into(), message: "invalid or missing authentication token".into() }
    }
    pub fn authentication_required() -> Self {
        AppError::Auth { code: "authentication_required".into(), message: "you must be authenticated to access this resource".into() }
    }
    pub fn invalid_credentials() -> Self {
        AppError::Auth { code: "invalid_credentials".into(), message: "invalid authentication credentials".into() }
    }
    pub fn inactive_account() -> Self {
        AppError::Forbidden { code: "inactive_account".into(), message: "your user account must be activated to access this resource".into() }
    }
    pub fn not_permitted() -> Self {
        AppError::Forbidden { code: "not_permitted".into(), message: "your user account doesn't have the necessary permissions to access this resource".into() }
    }
    pub fn rate_limit_exceeded() -> Self {
        AppError::RateLimited { code: "rate_limit_exceeded".into(), message: "rate limit exceeded".into() }
    }

    /// Opaque 500. The detail is logged here and never sent to the client.
    pub fn server_error<E: Display>(err: E) -> Self {
        tracing::error!(error = %err, "internal server error");
        AppError::Internal { code: "server_error".into(), message: SERVER_ERROR_MESSAGE.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::BadRequest { .. } => 400,
            AppError::Validation { .. } => 422,
            AppError::NotFound { .. } => 404,
            AppError::MethodNotAllowed { .. } => 405,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::RateLimited { .. } => 429,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Validation { fields, .. } => write!(f, "{}: {:?}", self.code_str(), fields),
            _ => write!(f, "{}: {}", self.code_str(), self.message()),
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match &self {
            AppError::Validation { fields, .. } => json!({ "error": fields }),
            other => json!({ "error": other.message() }),
        };
        let mut response = (status, Json(body)).into_response();
        if self.code_str() == "invalid_authentication_token" {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::server_error(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RecordNotFound => AppError::not_found(),
            StoreError::EditConflict => AppError::edit_conflict(),
            other => AppError::server_error(other),
        }
    }
}
