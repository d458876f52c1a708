//! Process settings read from the environment (after loading `.env`).

use crate::error::ConfigError;
use std::str::FromStr;

const DEV_JWT_SECRET: &str = "community-admin-dev-secret";

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub db_schema: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    /// Role names allowed to manage admin accounts.
    pub privileged_roles: Vec<String>,
    pub bootstrap_admin: Option<(String, String)>,
    pub body_limit_bytes: usize,
}

impl Settings {
    /// Loads `.env` when present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let dev = get("APP_ENV").map(|v| v.eq_ignore_ascii_case("dev")).unwrap_or(false);
        let jwt_secret = match get("JWT_SECRET") {
            Some(s) => s,
            None if dev => {
                tracing::warn!("JWT_SECRET not set; using the development secret");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::Load("JWT_SECRET must be set (or APP_ENV=dev)".into())),
        };

        let db_schema = get("DB_SCHEMA").unwrap_or_else(|| "public".into());
        if !db_schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Load(format!("DB_SCHEMA is not a plain identifier: {}", db_schema)));
        }

        let privileged_roles: Vec<String> = get("PRIVILEGED_ROLES")
            .unwrap_or_else(|| "超级管理员".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if privileged_roles.is_empty() {
            return Err(ConfigError::Load("PRIVILEGED_ROLES must name at least one role".into()));
        }

        let bootstrap_admin = match (get("BOOTSTRAP_ADMIN_USERNAME"), get("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(u), Some(p)) => Some((u, p)),
            _ => None,
        };

        Ok(Settings {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/community".into()),
            db_schema,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".into()),
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 5)?,
            jwt_secret,
            token_ttl_secs: parse_or(&get, "TOKEN_TTL_SECS", 7200)?,
            bcrypt_cost: parse_or(&get, "BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            privileged_roles,
            bootstrap_admin,
            body_limit_bytes: parse_or(&get, "BODY_LIMIT_BYTES", 1024 * 1024)?,
        })
    }

    pub fn is_privileged(&self, role: &str) -> bool {
        self.privileged_roles.iter().any(|r| r == role)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .parse()
            .map_err(|_| ConfigError::Load(format!("{} is not a valid number: {}", key, v))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let s = Settings::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(s.db_schema, "public");
        assert_eq!(s.token_ttl_secs, 7200);
        assert_eq!(s.privileged_roles, vec!["超级管理员".to_string()]);
        assert!(s.bootstrap_admin.is_none());
    }

    #[test]
    fn missing_secret_fails_outside_dev() {
        assert!(Settings::from_lookup(lookup(&[])).is_err());
        let s = Settings::from_lookup(lookup(&[("APP_ENV", "dev")])).unwrap();
        assert_eq!(s.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn bad_number_is_a_config_error() {
        let r = Settings::from_lookup(lookup(&[("JWT_SECRET", "x"), ("TOKEN_TTL_SECS", "soon")]));
        assert!(matches!(r, Err(ConfigError::Load(m)) if m.contains("TOKEN_TTL_SECS")));
    }

    #[test]
    fn privileged_roles_are_split_and_trimmed() {
        let s = Settings::from_lookup(lookup(&[("JWT_SECRET", "x"), ("PRIVILEGED_ROLES", "root, 超级管理员 ,")])).unwrap();
        assert!(s.is_privileged("root"));
        assert!(s.is_privileged("超级管理员"));
        assert!(!s.is_privileged("管理员"));
    }

    #[test]
    fn schema_must_be_plain_identifier() {
        let r = Settings::from_lookup(lookup(&[("JWT_SECRET", "x"), ("DB_SCHEMA", "a;drop")]));
        assert!(r.is_err());
    }
}
