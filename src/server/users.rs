use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use super::background::retry;
use super::helpers::read_json;
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{validate_token_plaintext, TokenScope};
use crate::mailer::Template;
use crate::storage::{validate_password_plaintext, validate_user, StoreError, User};
use crate::validator::Validator;

pub const ACTIVATION_TOKEN_TTL_DAYS: i64 = 3;
pub const MAIL_ATTEMPTS: usize = 3;
pub const MAIL_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(500);

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterUserInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateUserInput {
    pub token: String,
}

fn field_error(key: &str, message: &str) -> AppError {
    let mut v = Validator::new();
    v.add_error(key, message);
    AppError::failed_validation(v.errors)
}

pub async fn register_user(State(state): State<AppState>, body: Body) -> AppResult<(StatusCode, Json<Value>)> {
    let input: RegisterUserInput = read_json(body).await?;
    let mut user = User::new(&input.name, &input.email);

    // validate the plaintext before paying for the hash
    let mut v = Validator::new();
    validate_user(&mut v, &user);
    validate_password_plaintext(&mut v, &input.password);
    v.into_result()?;
    user.password.set(&input.password)?;

    match state.store.insert_user(&mut user) {
        Ok(()) => {}
        Err(StoreError::DuplicateEmail) => return Err(field_error("email", "a user with this email address already exists")),
        Err(e) => return Err(AppError::server_error(e)),
    }
    state.store.add_permissions_for_user(user.id, &["movies:read"])?;
    let token = state.store.new_token(user.id, Duration::days(ACTIVATION_TOKEN_TTL_DAYS), TokenScope::Activation)?;

    let mailer = state.mailer.clone();
    let recipient = user.email.clone();
    let data = json!({ "activationToken": token.plaintext, "userID": user.id });
    state.background.spawn("welcome_email", async move {
        retry(MAIL_ATTEMPTS, MAIL_RETRY_DELAY, || {
            let outcome = mailer.send(&recipient, Template::UserWelcome, &data);
            async move { outcome }
        })
        .await
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))))
}

pub async fn activate_user(State(state): State<AppState>, body: Body) -> AppResult<Json<Value>> {
    let input: ActivateUserInput = read_json(body).await?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    v.into_result()?;

    let mut user = match state.store.get_user_for_token(TokenScope::Activation, &input.token) {
        Ok(user) => user,
        Err(StoreError::RecordNotFound) => return Err(field_error("token", "invalid or expired activation token")),
        Err(e) => return Err(AppError::server_error(e)),
    };

    user.activated = true;
    state.store.update_user(&mut user)?;
    state.store.delete_all_tokens_for_user(TokenScope::Activation, user.id);

    Ok(Json(json!({ "user": user })))
}
