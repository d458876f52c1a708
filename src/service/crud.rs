//! Generic CRUD execution against PostgreSQL.

use crate::config::{ResolvedEntity, ResolvedModel, PK};
use crate::error::AppError;
use crate::response::Page;
use crate::service::pagination::PageRequest;
use crate::service::validation::RequestValidator;
use crate::sql::{
    count, count_since, delete, exists_unique, group_count, insert, recompute_all_flags, recompute_flag, select_by_column,
    select_by_id, select_page, update, PgBindValue, QueryBuf,
};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres};

/// Upper bound on rows accepted by one import call.
pub const IMPORT_LIMIT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
}

pub struct CrudService;

impl CrudService {
    /// One page of rows matching the equality filters and, when given, the keyword.
    pub async fn page(
        pool: &PgPool,
        entity: &ResolvedEntity,
        filters: &[(String, Value)],
        keyword: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Value>, AppError> {
        let total = fetch_count(pool, &count(entity, filters, keyword)).await?;
        let q = select_page(entity, filters, keyword, page.limit(), page.offset());
        let data = fetch_all(pool, &q).await?;
        Ok(Page {
            data,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    /// Fetch one row by primary key.
    pub async fn read(pool: &PgPool, entity: &ResolvedEntity, id: i64) -> Result<Value, AppError> {
        fetch_optional(pool, &select_by_id(entity, id))
            .await?
            .ok_or_else(|| not_found(entity, id))
    }

    /// Fetch one row by a unique column (resident by id_card, merchant by credit_code).
    pub async fn read_by(pool: &PgPool, entity: &ResolvedEntity, column: &str, value: Value) -> Result<Value, AppError> {
        let col = entity
            .column_by_name(column)
            .filter(|c| c.unique)
            .ok_or_else(|| AppError::BadRequest(format!("{} cannot be looked up by {}", entity.name, column)))?;
        fetch_optional(pool, &select_by_column(entity, col.name, value))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", entity.name)))
    }

    /// Validate and insert one row. Detail rows refresh their parent's flag in the same transaction.
    pub async fn create(
        pool: &PgPool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        body: Map<String, Value>,
    ) -> Result<Value, AppError> {
        let body = RequestValidator::validate_create(entity, body)?;
        let mut tx = pool.begin().await?;
        let row = Self::insert_checked(&mut *tx, model, entity, &body).await?;
        tx.commit().await?;
        tracing::debug!(table = entity.name, "row created");
        Ok(row)
    }

    /// Overwrite the supplied fields of one row.
    pub async fn update(
        pool: &PgPool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        id: i64,
        body: Map<String, Value>,
    ) -> Result<Value, AppError> {
        let body = RequestValidator::validate_update(entity, body)?;
        let mut tx = pool.begin().await?;
        let before = fetch_optional(&mut *tx, &select_by_id(entity, id))
            .await?
            .ok_or_else(|| not_found(entity, id))?;
        Self::check_unique(&mut *tx, entity, &body, Some(id)).await?;
        let row = fetch_optional(&mut *tx, &update(entity, id, &body))
            .await?
            .ok_or_else(|| not_found(entity, id))?;
        if let Some(mirror) = &entity.mirror {
            let parent = model.table(mirror.parent_table)?;
            let old_parent = before.get(mirror.fk_column).and_then(Value::as_i64);
            let new_parent = row.get(mirror.fk_column).and_then(Value::as_i64);
            for pid in [old_parent, new_parent].into_iter().flatten() {
                execute(&mut *tx, &recompute_flag(parent, entity, mirror, pid)).await?;
            }
        }
        tx.commit().await?;
        Ok(row)
    }

    /// Delete one row; absent ids are NotFound every time.
    pub async fn delete(
        pool: &PgPool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        id: i64,
    ) -> Result<Value, AppError> {
        let mut tx = pool.begin().await?;
        let row = fetch_optional(&mut *tx, &delete(entity, id))
            .await?
            .ok_or_else(|| not_found(entity, id))?;
        if let Some(mirror) = &entity.mirror {
            if let Some(pid) = row.get(mirror.fk_column).and_then(Value::as_i64) {
                let parent = model.table(mirror.parent_table)?;
                execute(&mut *tx, &recompute_flag(parent, entity, mirror, pid)).await?;
            }
        }
        // Cascades into a mirrored table through some other foreign key leave its parent's flag stale.
        for child in &model.entities {
            let Some(mirror) = &child.mirror else { continue };
            let cascades = child
                .foreign_keys()
                .any(|c| c.name != mirror.fk_column && c.references.as_ref().map(|r| r.table) == Some(entity.name));
            if cascades {
                let parent = model.table(mirror.parent_table)?;
                execute(&mut *tx, &recompute_all_flags(parent, child, mirror)).await?;
            }
        }
        tx.commit().await?;
        tracing::debug!(table = entity.name, id, "row deleted");
        Ok(row)
    }

    /// All-or-nothing insert of a batch of rows.
    pub async fn import(
        pool: &PgPool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        rows: Vec<Map<String, Value>>,
    ) -> Result<ImportSummary, AppError> {
        RequestValidator::check_import_columns(entity, &rows)?;
        if rows.len() > IMPORT_LIMIT {
            return Err(AppError::BadRequest(format!("import limited to {} rows", IMPORT_LIMIT)));
        }
        let mut validated = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            validated.push(RequestValidator::validate_create(entity, row).map_err(|e| at_row(i, e))?);
        }
        let mut tx = pool.begin().await?;
        for (i, body) in validated.iter().enumerate() {
            Self::insert_checked(&mut *tx, model, entity, body)
                .await
                .map_err(|e| at_row(i, e))?;
        }
        tx.commit().await?;
        tracing::info!(table = entity.name, rows = validated.len(), "import committed");
        Ok(ImportSummary {
            imported: validated.len(),
        })
    }

    /// Row counts grouped by one of the entity's declared distribution columns.
    pub async fn distribution(
        pool: &PgPool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        column: &str,
    ) -> Result<Vec<Value>, AppError> {
        if !entity.distributions.iter().any(|c| *c == column) {
            return Err(AppError::BadRequest(format!(
                "{} has no distribution over {}",
                entity.name, column
            )));
        }
        let label = entity
            .column_by_name(column)
            .and_then(|c| c.references.as_ref())
            .and_then(|fk| model.entity_by_table(fk.table))
            .and_then(|target| target.label.map(|l| (target, l)));
        fetch_all(pool, &group_count(entity, column, label)).await
    }

    /// Rows registered within the last `days` days.
    pub async fn new_count(pool: &PgPool, entity: &ResolvedEntity, days: i64) -> Result<i64, AppError> {
        fetch_count(pool, &count_since(entity, days, None)).await
    }

    async fn insert_checked(
        conn: &mut PgConnection,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        body: &Map<String, Value>,
    ) -> Result<Value, AppError> {
        Self::check_unique(conn, entity, body, None).await?;
        let row = fetch_optional(&mut *conn, &insert(entity, body))
            .await?
            .ok_or_else(|| AppError::Internal(format!("insert into {} returned no row", entity.name)))?;
        if let Some(mirror) = &entity.mirror {
            if let Some(pid) = row.get(mirror.fk_column).and_then(Value::as_i64) {
                let parent = model.table(mirror.parent_table)?;
                execute(&mut *conn, &recompute_flag(parent, entity, mirror, pid)).await?;
            }
        }
        Ok(row)
    }

    /// Pre-check every unique column present in the body. The constraint still guards the race.
    async fn check_unique(
        conn: &mut PgConnection,
        entity: &ResolvedEntity,
        body: &Map<String, Value>,
        exclude_id: Option<i64>,
    ) -> Result<(), AppError> {
        for col in entity.unique_columns() {
            let Some(v) = body.get(col.name).filter(|v| !v.is_null()) else { continue };
            let q = exists_unique(entity, col, v.clone(), exclude_id);
            if fetch_bool(&mut *conn, &q).await? {
                return Err(AppError::AlreadyExists(format!("{} already exists: {}", col.name, display(v))));
            }
        }
        Ok(())
    }
}

fn not_found(entity: &ResolvedEntity, id: i64) -> AppError {
    AppError::NotFound(format!("{} {} not found", entity.name, id))
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Prefix an import failure with its 1-based row number, keeping the error kind.
fn at_row(i: usize, e: AppError) -> AppError {
    let n = i + 1;
    match e {
        AppError::Validation(m) => AppError::Validation(format!("row {}: {}", n, m)),
        AppError::AlreadyExists(m) => AppError::AlreadyExists(format!("row {}: {}", n, m)),
        other => other,
    }
}

fn bound(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from(p));
    }
    query
}

pub(crate) async fn fetch_optional<'e, E: PgExecutor<'e>>(exec: E, q: &QueryBuf) -> Result<Option<Value>, AppError> {
    let row = bound(q).fetch_optional(exec).await?;
    Ok(row.as_ref().map(row_to_json))
}

pub(crate) async fn fetch_all<'e, E: PgExecutor<'e>>(exec: E, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
    let rows = bound(q).fetch_all(exec).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

pub(crate) async fn execute<'e, E: PgExecutor<'e>>(exec: E, q: &QueryBuf) -> Result<u64, AppError> {
    Ok(bound(q).execute(exec).await?.rows_affected())
}

/// First column of the single result row as i64 (COUNT queries).
pub(crate) async fn fetch_count<'e, E: PgExecutor<'e>>(exec: E, q: &QueryBuf) -> Result<i64, AppError> {
    use sqlx::Row;
    let row = bound(q).fetch_one(exec).await?;
    Ok(row.try_get::<i64, _>(0)?)
}

pub(crate) async fn fetch_bool<'e, E: PgExecutor<'e>>(exec: E, q: &QueryBuf) -> Result<bool, AppError> {
    use sqlx::Row;
    let row = bound(q).fetch_one(exec).await?;
    Ok(row.try_get::<bool, _>(0)?)
}

pub(crate) fn row_to_json(row: &PgRow) -> Value {
    use sqlx::{Column, Row, TypeInfo};
    let mut map = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, i, col.type_info().name()));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, i: usize, type_name: &str) -> Value {
    use sqlx::Row;
    let v = match type_name {
        "INT2" => row.try_get::<Option<i16>, _>(i).ok().flatten().map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(i).ok().flatten().map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(i).ok().flatten().map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(i)
            .ok()
            .flatten()
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(Value::Number),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(i)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        "BOOL" => row.try_get::<Option<bool>, _>(i).ok().flatten().map(Value::Bool),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(i)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(i)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i).ok().flatten(),
        _ => row.try_get::<Option<String>, _>(i).ok().flatten().map(Value::String),
    };
    v.unwrap_or(Value::Null)
}

/// The `id` of a row returned by this service.
pub fn row_id(row: &Value) -> Option<i64> {
    row.get(PK).and_then(Value::as_i64)
}
