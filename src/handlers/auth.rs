//! Login, logout and the current admin.

use crate::error::AppError;
use crate::extractors::{AuthAdmin, LoginForm};
use crate::response::{message_only, success, success_with_message};
use crate::service::{AdminProfile, AuthService};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse};

pub async fn login(State(state): State<AppState>, form: LoginForm) -> Result<impl IntoResponse, AppError> {
    let outcome = AuthService::login(&state.pool, &state.model, &state.tokens, &form.username, &form.password).await?;
    Ok(success_with_message(outcome, "登录成功"))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout(admin: AuthAdmin) -> impl IntoResponse {
    tracing::info!(username = %admin.admin.username, "logout");
    message_only("登出成功")
}

pub async fn me(admin: AuthAdmin) -> impl IntoResponse {
    success(AdminProfile::from(admin.admin))
}
