//! Bearer-token authentication against the admins table.

use crate::auth::Claims;
use crate::error::AppError;
use crate::service::{AdminRow, AuthService};
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

pub const BEARER_PREFIX: &str = "Bearer ";

/// The signed-in admin. The token must verify and the account must still exist and be enabled.
#[derive(Clone, Debug)]
pub struct AuthAdmin {
    pub claims: Claims,
    pub admin: AdminRow,
}

impl AuthAdmin {
    pub fn id(&self) -> i64 {
        self.admin.id as i64
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        let claims = state.tokens.verify(token)?;
        let admin = AuthService::find_by_id(&state.pool, &state.model, claims.sub)
            .await?
            .ok_or_else(|| {
                tracing::warn!(admin_id = claims.sub, "token for deleted account");
                AppError::Unauthorized("account no longer exists".into())
            })?;
        if !admin.status {
            tracing::warn!(admin_id = claims.sub, "token for disabled account");
            return Err(AppError::Forbidden(crate::service::MSG_ACCOUNT_DISABLED.into()));
        }
        Ok(AuthAdmin { claims, admin })
    }
}

/// An authenticated admin whose current role is one of the configured privileged roles.
#[derive(Clone, Debug)]
pub struct PrivilegedAdmin(pub AuthAdmin);

#[async_trait]
impl FromRequestParts<AppState> for PrivilegedAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let admin = AuthAdmin::from_request_parts(parts, state).await?;
        ensure_privileged(&admin, state)?;
        Ok(PrivilegedAdmin(admin))
    }
}

/// The role is read from the admin row, not the token, so demotions apply immediately.
pub(crate) fn ensure_privileged(admin: &AuthAdmin, state: &AppState) -> Result<(), AppError> {
    if state.settings.is_privileged(admin.admin.role()) {
        Ok(())
    } else {
        Err(AppError::Forbidden("insufficient privileges".into()))
    }
}
