//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a resolved entity.

use crate::config::{ColumnDef, FlagMirror, ResolvedEntity, LAST_UPDATE_TIME, PK, REGISTRATION_DATE};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from the catalog).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

pub fn table_of(entity: &ResolvedEntity) -> String {
    qualified_table(&entity.schema_name, entity.name)
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    pub fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder cast to the column type.
    pub fn placeholder(&mut self, col: &ColumnDef, v: Value) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, col.ty.cast())
    }
}

/// Escape LIKE metacharacters so the keyword matches literally, then wrap in `%`.
pub fn escape_like(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len() + 2);
    out.push('%');
    for ch in keyword.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

/// SELECT list: every column except sensitive ones, optionally qualified by an alias.
pub fn select_column_list(entity: &ResolvedEntity, alias: Option<&str>) -> String {
    entity
        .columns
        .iter()
        .filter(|c| !c.sensitive)
        .map(|c| match alias {
            Some(a) => format!("{}.{}", a, quoted(c.name)),
            None => quoted(c.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Equality filters (unknown columns skipped) and an optional keyword over the search columns.
fn where_clause(
    q: &mut QueryBuf,
    entity: &ResolvedEntity,
    filters: &[(String, Value)],
    keyword: Option<&str>,
) -> String {
    let mut parts = Vec::new();
    for (col, val) in filters {
        let Some(c) = entity.column_by_name(col) else { continue };
        if val.is_null() {
            parts.push(format!("{} IS NULL", quoted(c.name)));
            continue;
        }
        let ph = q.placeholder(c, val.clone());
        parts.push(format!("{} = {}", quoted(c.name), ph));
    }
    if let Some(kw) = keyword.map(str::trim).filter(|k| !k.is_empty()) {
        if !entity.search.is_empty() {
            let n = q.push_param(Value::String(escape_like(kw)));
            let ors: Vec<String> = entity
                .search
                .iter()
                .map(|c| format!("{}::text ILIKE ${} ESCAPE '\\'", quoted(c), n))
                .collect();
            parts.push(format!("({})", ors.join(" OR ")));
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT by primary key.
pub fn select_by_id(entity: &ResolvedEntity, id: i64) -> QueryBuf {
    select_by_column(entity, PK, Value::from(id))
}

/// SELECT rows where one column equals a value. Used for id and unique lookups.
pub fn select_by_column(entity: &ResolvedEntity, column: &str, value: Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cond = match entity.column_by_name(column) {
        Some(c) => format!("{} = {}", quoted(c.name), q.placeholder(c, value)),
        None => "FALSE".to_string(),
    };
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT 1",
        select_column_list(entity, None),
        table_of(entity),
        cond,
        quoted(PK)
    );
    q
}

/// One page of rows ordered by primary key.
pub fn select_page(
    entity: &ResolvedEntity,
    filters: &[(String, Value)],
    keyword: Option<&str>,
    limit: i64,
    offset: i64,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, filters, keyword);
    let limit_n = q.push_param(Value::from(limit));
    let offset_n = q.push_param(Value::from(offset));
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT ${} OFFSET ${}",
        select_column_list(entity, None),
        table_of(entity),
        where_sql,
        quoted(PK),
        limit_n,
        offset_n
    );
    q
}

/// COUNT(*) with the same predicate as `select_page`.
pub fn count(entity: &ResolvedEntity, filters: &[(String, Value)], keyword: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, filters, keyword);
    q.sql = format!("SELECT COUNT(*) AS count FROM {}{}", table_of(entity), where_sql);
    q
}

/// INSERT the columns present in `body`; omitted columns take their DB default.
pub fn insert(entity: &ResolvedEntity, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let Some(v) = body.get(c.name) else { continue };
        cols.push(quoted(c.name));
        placeholders.push(q.placeholder(c, v.clone()));
    }
    let returning = select_column_list(entity, None);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table_of(entity), returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table_of(entity),
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only columns present in body, refreshing `last_update_time` when the table has one.
/// With nothing to set this degrades to a SELECT so callers still get the row (or none).
pub fn update(entity: &ResolvedEntity, id: i64, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in &entity.columns {
        if c.name == PK {
            continue;
        }
        let Some(v) = body.get(c.name) else { continue };
        let rhs = q.placeholder(c, v.clone());
        sets.push(format!("{} = {}", quoted(c.name), rhs));
    }
    if sets.is_empty() {
        return select_by_id(entity, id);
    }
    if entity.has_column(LAST_UPDATE_TIME) {
        sets.push(format!("{} = NOW()", quoted(LAST_UPDATE_TIME)));
    }
    let id_param = q.push_param(Value::from(id));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
        table_of(entity),
        sets.join(", "),
        quoted(PK),
        id_param,
        select_column_list(entity, None)
    );
    q
}

/// DELETE by id, returning the removed row.
pub fn delete(entity: &ResolvedEntity, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::from(id));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = ${} RETURNING {}",
        table_of(entity),
        quoted(PK),
        n,
        select_column_list(entity, None)
    );
    q
}

/// `SELECT EXISTS(...)` for a unique column value, optionally ignoring one row (the row being updated).
pub fn exists_unique(entity: &ResolvedEntity, column: &ColumnDef, value: Value, exclude_id: Option<i64>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(column, value);
    let mut cond = format!("{} = {}", quoted(column.name), ph);
    if let Some(id) = exclude_id {
        let n = q.push_param(Value::from(id));
        cond.push_str(&format!(" AND {} <> ${}", quoted(PK), n));
    }
    q.sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {}) AS found", table_of(entity), cond);
    q
}

/// Row count per distinct value of `column`, largest group first. When `label` names a referenced
/// table and its display column, the display value is joined in as `label`.
pub fn group_count(entity: &ResolvedEntity, column: &str, label: Option<(&ResolvedEntity, &str)>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let col = quoted(column);
    q.sql = match label {
        Some((target, label_col)) => format!(
            "SELECT m.{col} AS value, r.{label}::text AS label, COUNT(*) AS count \
             FROM {table} m LEFT JOIN {target} r ON r.{pk} = m.{col} \
             GROUP BY m.{col}, r.{label} ORDER BY count DESC, value",
            col = col,
            label = quoted(label_col),
            table = table_of(entity),
            target = table_of(target),
            pk = quoted(PK),
        ),
        None => format!(
            "SELECT {col} AS value, COUNT(*) AS count FROM {table} GROUP BY {col} ORDER BY count DESC, value",
            col = col,
            table = table_of(entity),
        ),
    };
    q
}

/// Rows registered within the last `days` days.
pub fn count_since(entity: &ResolvedEntity, days: i64, extra: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::from(days));
    let extra = extra.map(|e| format!(" AND {}", e)).unwrap_or_default();
    q.sql = format!(
        "SELECT COUNT(*) AS count FROM {} WHERE {} >= NOW() - (${}::int4 * INTERVAL '1 day'){}",
        table_of(entity),
        quoted(REGISTRATION_DATE),
        n,
        extra
    );
    q
}

/// Recompute a parent's mirrored flag from the existence of detail rows pointing at it.
pub fn recompute_flag(parent: &ResolvedEntity, child: &ResolvedEntity, mirror: &FlagMirror, parent_id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::from(parent_id));
    q.sql = format!(
        "UPDATE {} SET {} = EXISTS(SELECT 1 FROM {} WHERE {} = ${n}) WHERE {} = ${n}",
        table_of(parent),
        quoted(mirror.flag_column),
        table_of(child),
        quoted(mirror.fk_column),
        quoted(PK),
        n = n
    );
    q
}

/// Recompute the flag on every parent row whose value disagrees with its detail rows.
/// Used after deletes that cascade into a mirrored detail table from a side other than the parent.
pub fn recompute_all_flags(parent: &ResolvedEntity, child: &ResolvedEntity, mirror: &FlagMirror) -> QueryBuf {
    let mut q = QueryBuf::new();
    let exists = format!(
        "EXISTS(SELECT 1 FROM {} c WHERE c.{} = p.{})",
        table_of(child),
        quoted(mirror.fk_column),
        quoted(PK)
    );
    q.sql = format!(
        "UPDATE {} p SET {flag} = {exists} WHERE p.{flag} IS DISTINCT FROM {exists}",
        table_of(parent),
        flag = quoted(mirror.flag_column),
        exists = exists
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve;
    use serde_json::json;

    fn model() -> crate::config::ResolvedModel {
        resolve("public").unwrap()
    }

    #[test]
    fn escape_like_wraps_and_escapes() {
        assert_eq!(escape_like("科技"), "%科技%");
        assert_eq!(escape_like("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn page_query_filters_searches_and_limits() {
        let m = model();
        let merchants = m.entity_by_path("merchants").unwrap();
        let q = select_page(merchants, &[("industry_id".into(), json!(3))], Some("科技"), 10, 20);
        assert!(q.sql.contains("\"industry_id\" = $1::int4"));
        assert!(q.sql.contains("\"merchants_name\"::text ILIKE $2"));
        assert!(q.sql.contains("\"credit_code\"::text ILIKE $2"));
        assert!(q.sql.ends_with("LIMIT $3 OFFSET $4"));
        assert_eq!(q.params, vec![json!(3), json!("%科技%"), json!(10), json!(20)]);
    }

    #[test]
    fn blank_keyword_adds_no_predicate() {
        let m = model();
        let streets = m.entity_by_path("streets").unwrap();
        let q = count(streets, &[], Some("   "));
        assert_eq!(q.sql, "SELECT COUNT(*) AS count FROM \"public\".\"streets\"");
        assert!(q.params.is_empty());
    }

    #[test]
    fn sensitive_columns_never_selected() {
        let m = model();
        let admins = m.entity_by_table("admins").unwrap();
        let q = select_by_id(admins, 1);
        assert!(!q.sql.contains("password_hash"));
        assert!(q.sql.contains("\"username\""));
    }

    #[test]
    fn insert_casts_each_placeholder() {
        let m = model();
        let residents = m.entity_by_path("residents").unwrap();
        let mut body = Map::new();
        body.insert("name".into(), json!("张三"));
        body.insert("birth_date".into(), json!("1990-01-01"));
        let q = insert(residents, &body);
        assert!(q.sql.starts_with("INSERT INTO \"public\".\"residents\" (\"name\", \"birth_date\")"));
        assert!(q.sql.contains("VALUES ($1::text, $2::date)"));
    }

    #[test]
    fn update_refreshes_last_update_time() {
        let m = model();
        let residents = m.entity_by_path("residents").unwrap();
        let mut body = Map::new();
        body.insert("phone_number".into(), json!("13800000000"));
        let q = update(residents, 7, &body);
        assert!(q.sql.contains("\"phone_number\" = $1::text, \"last_update_time\" = NOW()"));
        assert!(q.sql.contains("WHERE \"id\" = $2"));
        assert_eq!(q.params[1], json!(7));
    }

    #[test]
    fn empty_update_is_a_select() {
        let m = model();
        let streets = m.entity_by_path("streets").unwrap();
        let q = update(streets, 1, &Map::new());
        assert!(q.sql.starts_with("SELECT"));
    }

    #[test]
    fn unique_check_can_exclude_self() {
        let m = model();
        let residents = m.entity_by_path("residents").unwrap();
        let col = residents.column_by_name("id_card").unwrap();
        let q = exists_unique(residents, col, json!("110101199001011234"), Some(5));
        assert!(q.sql.contains("\"id_card\" = $1::text AND \"id\" <> $2"));
    }

    #[test]
    fn labelled_distribution_joins_reference_table() {
        let m = model();
        let merchants = m.entity_by_path("merchants").unwrap();
        let industries = m.entity_by_path("industries").unwrap();
        let q = group_count(merchants, "industry_id", Some((industries, "industry_name")));
        assert!(q.sql.contains("LEFT JOIN \"public\".\"industries\" r ON r.\"id\" = m.\"industry_id\""));
        assert!(q.sql.contains("ORDER BY count DESC"));
    }

    #[test]
    fn flag_recompute_uses_exists() {
        let m = model();
        let low_income = m.entity_by_path("low-income").unwrap();
        let residents = m.entity_by_table("residents").unwrap();
        let mirror = low_income.mirror.as_ref().unwrap();
        let q = recompute_flag(residents, low_income, mirror, 9);
        assert_eq!(
            q.sql,
            "UPDATE \"public\".\"residents\" SET \"is_low_income\" = EXISTS(SELECT 1 FROM \"public\".\"low_income\" WHERE \"resident_id\" = $1) WHERE \"id\" = $1"
        );
    }
}
