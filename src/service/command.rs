//! POST bodies as closed command sets, tagged by `action`.

use crate::error::AppError;
use crate::service::stats::TimeRange;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

/// `{action: "update", id, ...fields}`
#[derive(Debug, Deserialize, PartialEq)]
pub struct UpdateCommand {
    #[serde(alias = "admin_id")]
    pub id: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EntityCommand {
    Add(Map<String, Value>),
    Update(UpdateCommand),
    Delete {
        id: i64,
    },
    Search {
        #[serde(default)]
        keyword: String,
        page: Option<i64>,
        page_size: Option<i64>,
    },
    Import {
        rows: Vec<Map<String, Value>>,
    },
    GetNewCount {
        #[serde(default)]
        time_range: TimeRange,
    },
    GetDistribution {
        field: String,
    },
    GetGenderDistribution,
    GetIndustryDistribution,
    GetAgeDistribution,
    GetSpecialStats,
    GetByCommunity {
        community_id: i64,
        page: Option<i64>,
        page_size: Option<i64>,
    },
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminCommand {
    #[serde(alias = "add_admin")]
    Add(Map<String, Value>),
    Update(UpdateCommand),
    Delete {
        #[serde(alias = "admin_id")]
        id: i64,
    },
    ResetPassword {
        #[serde(alias = "admin_id")]
        id: i64,
        new_password: String,
    },
    ChangePassword {
        old_password: String,
        new_password: String,
    },
    GetStatusDistribution,
}

/// Deserialize a command body; malformed payloads and unknown actions are BadRequest.
pub fn parse_command<T: DeserializeOwned>(body: Value) -> Result<T, AppError> {
    if !body.is_object() {
        return Err(AppError::BadRequest("body must be a JSON object".into()));
    }
    serde_json::from_value(body).map_err(|e| AppError::BadRequest(format!("invalid command: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_keeps_every_other_field() {
        let cmd: EntityCommand = parse_command(json!({"action": "add", "name": "张三", "ethnicity": 1})).unwrap();
        let EntityCommand::Add(fields) = cmd else { panic!("expected add") };
        assert_eq!(fields.get("name"), Some(&json!("张三")));
        assert!(!fields.contains_key("action"));
    }

    #[test]
    fn update_splits_id_from_fields() {
        let cmd: EntityCommand = parse_command(json!({"action": "update", "id": 4, "phone_number": "1"})).unwrap();
        let EntityCommand::Update(u) = cmd else { panic!("expected update") };
        assert_eq!(u.id, 4);
        assert_eq!(u.fields.len(), 1);
        assert_eq!(u.fields.get("phone_number"), Some(&json!("1")));
    }

    #[test]
    fn search_defaults() {
        let cmd: EntityCommand = parse_command(json!({"action": "search"})).unwrap();
        assert_eq!(
            cmd,
            EntityCommand::Search {
                keyword: String::new(),
                page: None,
                page_size: None
            }
        );
    }

    #[test]
    fn new_count_falls_back_to_month() {
        let cmd: EntityCommand = parse_command(json!({"action": "get_new_count", "time_range": "eon"})).unwrap();
        assert_eq!(cmd, EntityCommand::GetNewCount { time_range: TimeRange::Month });
        let cmd: EntityCommand = parse_command(json!({"action": "get_new_count"})).unwrap();
        assert_eq!(cmd, EntityCommand::GetNewCount { time_range: TimeRange::Month });
    }

    #[test]
    fn unknown_or_missing_action_is_bad_request() {
        assert!(matches!(
            parse_command::<EntityCommand>(json!({"action": "explode"})),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(parse_command::<EntityCommand>(json!({"id": 1})), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_command::<EntityCommand>(json!([1, 2])), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn delete_requires_numeric_id() {
        assert!(parse_command::<EntityCommand>(json!({"action": "delete", "id": "x"})).is_err());
    }

    #[test]
    fn admin_commands_accept_legacy_names() {
        let cmd: AdminCommand =
            parse_command(json!({"action": "reset_password", "admin_id": 2, "new_password": "n"})).unwrap();
        assert_eq!(
            cmd,
            AdminCommand::ResetPassword {
                id: 2,
                new_password: "n".into()
            }
        );
        let cmd: AdminCommand = parse_command(json!({"action": "add_admin", "username": "u"})).unwrap();
        assert!(matches!(cmd, AdminCommand::Add(_)));
    }
}
