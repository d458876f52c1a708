//! Generic entity endpoints: `GET /api/:entity` reads, `POST /api/:entity` runs a tagged command.

use crate::config::{Capability, ResolvedEntity, PK};
use crate::error::AppError;
use crate::extractors::{ensure_privileged, AuthAdmin};
use crate::response::{created, message_only, success, success_with_message};
use crate::service::{
    parse_command, CrudService, EntityCommand, PageRequest, PropertyQueries, RequestValidator, ResidentQueries,
};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

fn entity<'a>(state: &'a AppState, path_segment: &str) -> Result<&'a ResolvedEntity, AppError> {
    state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(format!("unknown entity: {}", path_segment)))
}

fn require(entity: &ResolvedEntity, cap: Capability, action: &str) -> Result<(), AppError> {
    if entity.supports(cap) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("{} does not support {}", entity.name, action)))
    }
}

/// Typed value for a query-string filter on `col`.
fn query_value_for_column(entity: &ResolvedEntity, col: &str, s: &str) -> Result<Value, AppError> {
    match entity.column_by_name(col) {
        Some(c) => RequestValidator::filter_value(c, s),
        None => Ok(Value::String(s.to_string())),
    }
}

/// `?id=` and `?<unique column>=` return one row; otherwise a page filtered by any other known columns.
pub async fn get(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    _admin: AuthAdmin,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Response, AppError> {
    let entity = entity(&state, &path_segment)?;
    let Query(params) = params?;

    if let Some(raw) = params.get(PK) {
        let id = query_value_for_column(entity, PK, raw)?.as_i64().unwrap_or_default();
        let row = CrudService::read(&state.pool, entity, id).await?;
        return Ok(success(row).into_response());
    }
    if let Some(col) = entity.unique_columns().find(|c| params.contains_key(c.name)) {
        let raw = params.get(col.name).map(String::as_str).unwrap_or_default();
        let v = query_value_for_column(entity, col.name, raw)?;
        let row = CrudService::read_by(&state.pool, entity, col.name, v).await?;
        return Ok(success(row).into_response());
    }

    let page = PageRequest::from_query(
        params.get("page").map(String::as_str),
        params.get("page_size").map(String::as_str),
    )?;
    let mut filters = Vec::new();
    for (k, v) in &params {
        match entity.column_by_name(k) {
            Some(c) if !c.sensitive => filters.push((k.clone(), query_value_for_column(entity, k, v)?)),
            _ => {}
        }
    }
    filters.sort_by(|a, b| a.0.cmp(&b.0));
    let keyword = params.get("keyword").map(String::as_str);
    let page = CrudService::page(&state.pool, entity, &filters, keyword, page).await?;
    Ok(success(page).into_response())
}

/// Tables marked for privileged writes (roles) refuse every command from other admins.
pub async fn post(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    admin: AuthAdmin,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let entity = entity(&state, &path_segment)?;
    if entity.privileged_writes {
        ensure_privileged(&admin, &state)?;
    }
    let Json(body) = body?;
    let pool = &state.pool;
    let model = state.model.as_ref();
    let cmd: EntityCommand = parse_command(body)?;

    let resp = match cmd {
        EntityCommand::Add(fields) => {
            let row = CrudService::create(pool, model, entity, fields).await?;
            created(row, "添加成功").into_response()
        }
        EntityCommand::Update(u) => {
            let row = CrudService::update(pool, model, entity, u.id, u.fields).await?;
            success_with_message(row, "更新成功").into_response()
        }
        EntityCommand::Delete { id } => {
            CrudService::delete(pool, model, entity, id).await?;
            message_only("删除成功").into_response()
        }
        EntityCommand::Search {
            keyword,
            page,
            page_size,
        } => {
            let page = PageRequest::new(page, page_size)?;
            let result = CrudService::page(pool, entity, &[], Some(&keyword), page).await?;
            success(result).into_response()
        }
        EntityCommand::Import { rows } => {
            require(entity, Capability::Import, "import")?;
            let summary = CrudService::import(pool, model, entity, rows).await?;
            success_with_message(summary, "导入成功").into_response()
        }
        EntityCommand::GetNewCount { time_range } => {
            require(entity, Capability::NewCount, "get_new_count")?;
            let count = CrudService::new_count(pool, entity, time_range.days()).await?;
            success(json!({ "count": count, "time_range": time_range })).into_response()
        }
        EntityCommand::GetDistribution { field } => {
            let rows = CrudService::distribution(pool, model, entity, &field).await?;
            success(rows).into_response()
        }
        EntityCommand::GetGenderDistribution => {
            let rows = CrudService::distribution(pool, model, entity, "gender").await?;
            success(rows).into_response()
        }
        EntityCommand::GetIndustryDistribution => {
            let rows = CrudService::distribution(pool, model, entity, "industry_id").await?;
            success(rows).into_response()
        }
        EntityCommand::GetAgeDistribution => {
            require(entity, Capability::AgeDistribution, "get_age_distribution")?;
            let rows = ResidentQueries::age_distribution(pool, entity).await?;
            success(rows).into_response()
        }
        EntityCommand::GetSpecialStats => {
            require(entity, Capability::SpecialStats, "get_special_stats")?;
            let stats = ResidentQueries::special_stats(pool, model).await?;
            success(stats).into_response()
        }
        EntityCommand::GetByCommunity {
            community_id,
            page,
            page_size,
        } => {
            require(entity, Capability::ByCommunity, "get_by_community")?;
            let page = PageRequest::new(page, page_size)?;
            let result = match entity.name {
                "properties" => PropertyQueries::by_community(pool, model, community_id, page).await?,
                _ => ResidentQueries::by_community(pool, model, community_id, page).await?,
            };
            success(result).into_response()
        }
    };
    Ok(resp)
}
