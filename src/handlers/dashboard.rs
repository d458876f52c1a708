//! Headline counters for the overview page.

use crate::error::AppError;
use crate::extractors::AuthAdmin;
use crate::response::success;
use crate::service::{Dashboard, Period};
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub period: Option<String>,
}

pub async fn get(
    State(state): State<AppState>,
    _admin: AuthAdmin,
    q: Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(q) = q?;
    let period = Period::parse(q.period.as_deref());
    let dashboard = Dashboard::load(&state.pool, &state.model, period).await?;
    Ok(success(dashboard))
}
