//! Admin accounts: login, password management and account administration.

use crate::auth::{hash_password, verify_password, TokenService};
use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::response::Page;
use crate::service::crud::{execute, fetch_bool, fetch_optional, CrudService};
use crate::service::pagination::PageRequest;
use crate::service::validation::RequestValidator;
use crate::sql::{exists_unique, insert, quoted, table_of, QueryBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;

pub const MSG_EMPTY_CREDENTIALS: &str = "用户名和密码不能为空";
pub const MSG_ACCOUNT_DISABLED: &str = "账号已被禁用，请联系管理员";
pub const MSG_BAD_CREDENTIALS: &str = "用户名或密码错误";

/// Columns an admin update never touches, even when supplied.
const UPDATE_EXCLUDED: [&str; 4] = ["id", "username", "password", "password_hash"];

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct AdminRow {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub real_name: String,
    pub phone_number: String,
    pub role_id: i32,
    pub role_name: Option<String>,
    pub status: bool,
    pub create_time: DateTime<Utc>,
    pub last_login_time: Option<DateTime<Utc>>,
}

/// An admin as returned to clients: no password material.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AdminProfile {
    pub id: i32,
    pub username: String,
    pub real_name: String,
    pub phone_number: String,
    pub role_id: i32,
    pub role_name: Option<String>,
    pub status: bool,
    pub create_time: DateTime<Utc>,
    pub last_login_time: Option<DateTime<Utc>>,
}

impl From<AdminRow> for AdminProfile {
    fn from(r: AdminRow) -> Self {
        AdminProfile {
            id: r.id,
            username: r.username,
            real_name: r.real_name,
            phone_number: r.phone_number,
            role_id: r.role_id,
            role_name: r.role_name,
            status: r.status,
            create_time: r.create_time,
            last_login_time: r.last_login_time,
        }
    }
}

impl AdminRow {
    pub fn role(&self) -> &str {
        self.role_name.as_deref().unwrap_or("")
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub admin: AdminProfile,
}

pub struct AuthService;

impl AuthService {
    /// Check credentials and issue a token. The disabled check precedes the password check;
    /// unknown user and wrong password share one message.
    pub async fn login(
        pool: &PgPool,
        model: &ResolvedModel,
        tokens: &TokenService,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, AppError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::Validation(MSG_EMPTY_CREDENTIALS.into()));
        }
        let Some(admin) = Self::find_by_username(pool, model, username).await? else {
            tracing::warn!(username, "login failed: unknown user");
            return Err(AppError::Unauthorized(MSG_BAD_CREDENTIALS.into()));
        };
        if !admin.status {
            tracing::warn!(username, "login refused: account disabled");
            return Err(AppError::Forbidden(MSG_ACCOUNT_DISABLED.into()));
        }
        if !verify_password(password, &admin.password_hash) {
            tracing::warn!(username, "login failed: wrong password");
            return Err(AppError::Unauthorized(MSG_BAD_CREDENTIALS.into()));
        }

        let admins = model.table("admins")?;
        let mut q = QueryBuf::default();
        let n = q.push_param(Value::from(admin.id));
        q.sql = format!(
            "UPDATE {} SET \"last_login_time\" = NOW() WHERE \"id\" = ${}",
            table_of(admins),
            n
        );
        execute(pool, &q).await?;

        let issued = tokens.issue(admin.id as i64, &admin.username, admin.role())?;
        let admin = Self::find_by_id(pool, model, admin.id as i64)
            .await?
            .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;
        tracing::info!(username = %admin.username, "login succeeded");
        Ok(LoginOutcome {
            token: issued.token,
            expires_at: issued.expires_at,
            admin: admin.into(),
        })
    }

    pub async fn find_by_username(pool: &PgPool, model: &ResolvedModel, username: &str) -> Result<Option<AdminRow>, AppError> {
        let sql = format!("{} WHERE a.\"username\" = $1", admin_select(model)?);
        Ok(sqlx::query_as::<_, AdminRow>(&sql)
            .bind(username)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn find_by_id(pool: &PgPool, model: &ResolvedModel, id: i64) -> Result<Option<AdminRow>, AppError> {
        let sql = format!("{} WHERE a.\"id\" = $1", admin_select(model)?);
        Ok(sqlx::query_as::<_, AdminRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    /// Self-service password change; the old password must verify.
    pub async fn change_password(
        pool: &PgPool,
        model: &ResolvedModel,
        admin_id: i64,
        old_password: &str,
        new_password: &str,
        cost: u32,
    ) -> Result<(), AppError> {
        let admin = Self::find_by_id(pool, model, admin_id)
            .await?
            .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;
        if !verify_password(old_password, &admin.password_hash) {
            return Err(AppError::Validation("旧密码错误".into()));
        }
        Self::set_password(pool, model, admin_id, new_password, cost).await?;
        tracing::info!(admin_id, "password changed");
        Ok(())
    }

    pub async fn reset_password(
        pool: &PgPool,
        model: &ResolvedModel,
        admin_id: i64,
        new_password: &str,
        cost: u32,
    ) -> Result<(), AppError> {
        Self::set_password(pool, model, admin_id, new_password, cost).await?;
        tracing::info!(admin_id, "password reset");
        Ok(())
    }

    async fn set_password(
        pool: &PgPool,
        model: &ResolvedModel,
        admin_id: i64,
        new_password: &str,
        cost: u32,
    ) -> Result<(), AppError> {
        check_new_password(new_password)?;
        let hash = hash_password(new_password, cost)?;
        let admins = model.table("admins")?;
        let mut q = QueryBuf::default();
        let h = q.push_param(Value::String(hash));
        let id = q.push_param(Value::from(admin_id));
        q.sql = format!(
            "UPDATE {} SET \"password_hash\" = ${}::text WHERE \"id\" = ${}",
            table_of(admins),
            h,
            id
        );
        if execute(pool, &q).await? == 0 {
            return Err(AppError::NotFound("用户不存在".into()));
        }
        Ok(())
    }

    /// Create an account from `{username, password, real_name, phone_number, role_id, status?}`.
    pub async fn add_admin(
        pool: &PgPool,
        model: &ResolvedModel,
        mut body: Map<String, Value>,
        cost: u32,
    ) -> Result<AdminProfile, AppError> {
        let admins = model.table("admins")?;
        let password = match body.remove("password") {
            Some(Value::String(p)) => p,
            _ => return Err(AppError::Validation("password is required".into())),
        };
        check_new_password(&password)?;
        let mut fields = RequestValidator::validate_create(admins, body)?;
        if let (Some(col), Some(v)) = (admins.column_by_name("username"), fields.get("username")) {
            if fetch_bool(pool, &exists_unique(admins, col, v.clone(), None)).await? {
                return Err(AppError::AlreadyExists("用户名已存在".into()));
            }
        }
        fields.insert("password_hash".into(), Value::String(hash_password(&password, cost)?));
        let row = fetch_optional(pool, &insert(admins, &fields))
            .await?
            .ok_or_else(|| AppError::Internal("admin insert returned no row".into()))?;
        let id = row.get("id").and_then(Value::as_i64).unwrap_or_default();
        tracing::info!(admin_id = id, "admin created");
        Self::profile(pool, model, id).await
    }

    /// Overwrite profile fields; identity and password fields are dropped.
    pub async fn update_admin(
        pool: &PgPool,
        model: &ResolvedModel,
        id: i64,
        mut fields: Map<String, Value>,
    ) -> Result<AdminProfile, AppError> {
        for key in UPDATE_EXCLUDED {
            fields.remove(key);
        }
        let admins = model.table("admins")?;
        CrudService::update(pool, model, admins, id, fields).await?;
        tracing::info!(admin_id = id, "admin updated");
        Self::profile(pool, model, id).await
    }

    pub async fn delete_admin(pool: &PgPool, model: &ResolvedModel, id: i64) -> Result<(), AppError> {
        let admins = model.table("admins")?;
        CrudService::delete(pool, model, admins, id).await?;
        tracing::info!(admin_id = id, "admin deleted");
        Ok(())
    }

    pub async fn profile(pool: &PgPool, model: &ResolvedModel, id: i64) -> Result<AdminProfile, AppError> {
        Self::find_by_id(pool, model, id)
            .await?
            .map(AdminProfile::from)
            .ok_or_else(|| AppError::NotFound("用户不存在".into()))
    }

    pub async fn list(pool: &PgPool, model: &ResolvedModel, page: PageRequest) -> Result<Page<AdminProfile>, AppError> {
        let total_sql = format!("SELECT COUNT(*) FROM {}", table_of(model.table("admins")?));
        let total: i64 = sqlx::query_scalar(&total_sql).fetch_one(pool).await?;
        let sql = format!("{} ORDER BY a.\"id\" LIMIT $1 OFFSET $2", admin_select(model)?);
        let rows = sqlx::query_as::<_, AdminRow>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(pool)
            .await?;
        Ok(Page {
            data: rows.into_iter().map(AdminProfile::from).collect(),
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    pub async fn status_distribution(pool: &PgPool, model: &ResolvedModel) -> Result<Vec<Value>, AppError> {
        let admins = model.table("admins")?;
        CrudService::distribution(pool, model, admins, "status").await
    }
}

fn admin_select(model: &ResolvedModel) -> Result<String, AppError> {
    let admins: &ResolvedEntity = model.table("admins")?;
    let roles: &ResolvedEntity = model.table("roles")?;
    Ok(format!(
        "SELECT a.\"id\", a.\"username\", a.\"password_hash\", a.\"real_name\", a.\"phone_number\", \
         a.\"role_id\", r.\"name\" AS role_name, a.\"status\", a.\"create_time\", a.\"last_login_time\" \
         FROM {} a LEFT JOIN {} r ON r.{} = a.\"role_id\"",
        table_of(admins),
        table_of(roles),
        quoted("id")
    ))
}

fn check_new_password(p: &str) -> Result<(), AppError> {
    if p.chars().count() < 6 {
        return Err(AppError::Validation("密码长度不能少于6位".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_passwords_are_rejected() {
        assert!(check_new_password("12345").is_err());
        assert!(check_new_password("123456").is_ok());
    }

    #[test]
    fn admin_select_joins_roles() {
        let model = crate::config::resolve("public").unwrap();
        let sql = admin_select(&model).unwrap();
        assert!(sql.contains("FROM \"public\".\"admins\" a LEFT JOIN \"public\".\"roles\" r"));
        assert!(sql.contains("r.\"name\" AS role_name"));
    }
}
