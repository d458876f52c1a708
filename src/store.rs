//! Database bootstrap: create the database if missing and seed the rows a fresh install needs.

use crate::config::{ResolvedModel, Settings};
use crate::error::AppError;
use crate::sql::table_of;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

/// Roles every installation starts with; the first is the default privileged role.
pub const DEFAULT_ROLES: [(&str, &str); 2] = [("超级管理员", "系统最高权限"), ("管理员", "日常数据维护")];

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await.map_err(AppError::Db)?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await
        .map_err(AppError::Db)?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await
            .map_err(AppError::Db)?;
        tracing::info!(database = %db_name, "database created");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url.rfind('/').ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))? + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Insert the default roles and, when configured, the bootstrap admin. Safe to run on every start.
pub async fn seed_defaults(pool: &PgPool, model: &ResolvedModel, settings: &Settings) -> Result<(), AppError> {
    let roles = table_of(model.table("roles")?);
    for (name, description) in DEFAULT_ROLES {
        sqlx::query(&format!(
            "INSERT INTO {} (\"name\", \"description\") VALUES ($1, $2) ON CONFLICT (\"name\") DO NOTHING",
            roles
        ))
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    }
    for name in &settings.privileged_roles {
        sqlx::query(&format!(
            "INSERT INTO {} (\"name\") VALUES ($1) ON CONFLICT (\"name\") DO NOTHING",
            roles
        ))
        .bind(name)
        .execute(pool)
        .await?;
    }

    let Some((username, password)) = &settings.bootstrap_admin else {
        return Ok(());
    };
    let admins = table_of(model.table("admins")?);
    let exists: bool = sqlx::query_scalar(&format!("SELECT EXISTS(SELECT 1 FROM {} WHERE \"username\" = $1)", admins))
        .bind(username)
        .fetch_one(pool)
        .await?;
    if exists {
        return Ok(());
    }
    let role = settings
        .privileged_roles
        .first()
        .ok_or_else(|| AppError::Internal("no privileged role configured".into()))?;
    let hash = crate::auth::hash_password(password, settings.bcrypt_cost)?;
    sqlx::query(&format!(
        "INSERT INTO {} (\"username\", \"password_hash\", \"real_name\", \"phone_number\", \"role_id\", \"status\") \
         SELECT $1, $2, $1, '', r.\"id\", TRUE FROM {} r WHERE r.\"name\" = $3 \
         ON CONFLICT (\"username\") DO NOTHING",
        admins, roles
    ))
    .bind(username)
    .bind(hash)
    .bind(role)
    .execute(pool)
    .await?;
    tracing::info!(username = %username, role = %role, "bootstrap admin created");
    Ok(())
}
