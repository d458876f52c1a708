//! Admin account management.

use crate::error::AppError;
use crate::extractors::{ensure_privileged, AuthAdmin, PrivilegedAdmin};
use crate::response::{created, message_only, success, success_with_message};
use crate::service::{parse_command, AdminCommand, AuthService, PageRequest};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    pub id: Option<i64>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

pub async fn get(
    State(state): State<AppState>,
    _admin: PrivilegedAdmin,
    q: Result<Query<AdminQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(q) = q?;
    if let Some(id) = q.id {
        let profile = AuthService::profile(&state.pool, &state.model, id).await?;
        return Ok(success(profile).into_response());
    }
    let page = PageRequest::from_query(q.page.as_deref(), q.page_size.as_deref())?;
    let result = AuthService::list(&state.pool, &state.model, page).await?;
    Ok(success(result).into_response())
}

/// Every action but `change_password` (which acts on the caller) needs a privileged role.
pub async fn post(
    State(state): State<AppState>,
    admin: AuthAdmin,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body?;
    let pool = &state.pool;
    let model = state.model.as_ref();
    let cost = state.settings.bcrypt_cost;
    let cmd: AdminCommand = parse_command(body)?;
    if !matches!(cmd, AdminCommand::ChangePassword { .. }) {
        ensure_privileged(&admin, &state)?;
    }

    let resp = match cmd {
        AdminCommand::Add(fields) => {
            let profile = AuthService::add_admin(pool, model, fields, cost).await?;
            created(profile, "添加成功").into_response()
        }
        AdminCommand::Update(u) => {
            let profile = AuthService::update_admin(pool, model, u.id, u.fields).await?;
            success_with_message(profile, "更新成功").into_response()
        }
        AdminCommand::Delete { id } => {
            if id == admin.id() {
                return Err(AppError::BadRequest("不能删除当前登录的账号".into()));
            }
            AuthService::delete_admin(pool, model, id).await?;
            message_only("删除成功").into_response()
        }
        AdminCommand::ResetPassword { id, new_password } => {
            AuthService::reset_password(pool, model, id, &new_password, cost).await?;
            message_only("密码重置成功").into_response()
        }
        AdminCommand::ChangePassword {
            old_password,
            new_password,
        } => {
            AuthService::change_password(pool, model, admin.id(), &old_password, &new_password, cost).await?;
            message_only("密码修改成功").into_response()
        }
        AdminCommand::GetStatusDistribution => {
            let rows = AuthService::status_distribution(pool, model).await?;
            success(rows).into_response()
        }
    };
    Ok(resp)
}
