use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use super::helpers::read_json;
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::TokenScope;
use crate::storage::{validate_email, validate_password_plaintext, StoreError};
use crate::validator::Validator;

pub const AUTHENTICATION_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsInput {
    pub email: String,
    pub password: String,
}

pub async fn create_authentication_token(State(state): State<AppState>, body: Body) -> AppResult<(StatusCode, Json<Value>)> {
    let input: CredentialsInput = read_json(body).await?;

    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.into_result()?;

    let user = match state.store.get_user_by_email(&input.email) {
        Ok(user) => user,
        Err(StoreError::RecordNotFound) => return Err(AppError::invalid_credentials()),
        Err(e) => return Err(AppError::server_error(e)),
    };
    if !user.password.matches(&input.password)? {
        return Err(AppError::invalid_credentials());
    }

    let token = state.store.new_token(user.id, Duration::hours(AUTHENTICATION_TOKEN_TTL_HOURS), TokenScope::Authentication)?;
    Ok((StatusCode::CREATED, Json(json!({ "authentication_token": token }))))
}
