//! Reporting queries: time windows, resident statistics, community lookups and the dashboard.

use crate::config::{ResolvedEntity, ResolvedModel, PK};
use crate::error::AppError;
use crate::response::Page;
use crate::service::crud::{fetch_all, fetch_count};
use crate::service::pagination::PageRequest;
use crate::sql::{count_since, quoted, select_column_list, table_of, QueryBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;

/// Look-back window for "new rows" counts. Unrecognized names mean 30 days.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl TimeRange {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => TimeRange::Day,
            "week" => TimeRange::Week,
            "year" => TimeRange::Year,
            _ => TimeRange::Month,
        }
    }

    pub fn days(self) -> i64 {
        match self {
            TimeRange::Day => 1,
            TimeRange::Week => 7,
            TimeRange::Month => 30,
            TimeRange::Year => 365,
        }
    }
}

impl<'de> Deserialize<'de> for TimeRange {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(d)?;
        Ok(s.as_deref().map(TimeRange::parse).unwrap_or_default())
    }
}

/// Dashboard period: `month` is the last 30 days, anything else the last 365.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Month,
    Year,
}

impl Period {
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some("month") => Period::Month,
            _ => Period::Year,
        }
    }

    pub fn days(self) -> i64 {
        match self {
            Period::Month => 30,
            Period::Year => 365,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct SpecialStats {
    pub low_income_count: i64,
    pub five_guarantee_count: i64,
    pub disabled_count: i64,
    pub special_support_count: i64,
    pub deceased_count: i64,
    pub special_object_count: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct AgeGroupCount {
    pub age_group: &'static str,
    pub count: i64,
}

/// Whole-year age bands, inclusive; the last band is open-ended.
const AGE_GROUPS: [(&str, i32, Option<i32>); 4] = [
    ("0-18岁", 0, Some(18)),
    ("19-35岁", 19, Some(35)),
    ("36-59岁", 36, Some(59)),
    ("60岁以上", 60, None),
];

pub struct ResidentQueries;

impl ResidentQueries {
    /// Number of detail rows per special population.
    pub async fn special_stats(pool: &PgPool, model: &ResolvedModel) -> Result<SpecialStats, AppError> {
        Ok(SpecialStats {
            low_income_count: count_all(pool, model.table("low_income")?).await?,
            five_guarantee_count: count_all(pool, model.table("five_guarantees")?).await?,
            disabled_count: count_all(pool, model.table("disabled")?).await?,
            special_support_count: count_all(pool, model.table("special_needs")?).await?,
            deceased_count: count_all(pool, model.table("deceased")?).await?,
            special_object_count: count_all(pool, model.table("special_objects")?).await?,
        })
    }

    /// Living residents per age band, by whole years of age today. Like the dashboard population,
    /// deceased residents are left out.
    pub async fn age_distribution(pool: &PgPool, residents: &ResolvedEntity) -> Result<Vec<AgeGroupCount>, AppError> {
        let mut out = Vec::with_capacity(AGE_GROUPS.len());
        for (label, lo, hi) in AGE_GROUPS {
            let q = age_band_count(residents, lo, hi);
            out.push(AgeGroupCount {
                age_group: label,
                count: fetch_count(pool, &q).await?,
            });
        }
        Ok(out)
    }

    /// Residents living in a community, reached through building → house → unit → apartment.
    pub async fn by_community(
        pool: &PgPool,
        model: &ResolvedModel,
        community_id: i64,
        page: PageRequest,
    ) -> Result<Page<Value>, AppError> {
        let residents = model.table("residents")?;
        let join = format!(
            "FROM {r} m JOIN {b} b ON b.\"resident_id\" = m.{pk} \
             JOIN {h} h ON h.{pk} = b.\"house_id\" \
             JOIN {u} u ON u.{pk} = h.\"unit_id\" \
             JOIN {a} a ON a.{pk} = u.\"apartment_id\" \
             WHERE a.\"community_id\" = $1",
            r = table_of(residents),
            b = table_of(model.table("building")?),
            h = table_of(model.table("house")?),
            u = table_of(model.table("unit")?),
            a = table_of(model.table("apartment")?),
            pk = quoted(PK),
        );
        joined_page(pool, residents, &join, community_id, page).await
    }
}

pub struct PropertyQueries;

impl PropertyQueries {
    /// Properties managing a community (through property_manager).
    pub async fn by_community(
        pool: &PgPool,
        model: &ResolvedModel,
        community_id: i64,
        page: PageRequest,
    ) -> Result<Page<Value>, AppError> {
        let properties = model.table("properties")?;
        let join = format!(
            "FROM {p} m JOIN {pm} pm ON pm.\"property_id\" = m.{pk} WHERE pm.\"community_id\" = $1",
            p = table_of(properties),
            pm = table_of(model.table("property_manager")?),
            pk = quoted(PK),
        );
        joined_page(pool, properties, &join, community_id, page).await
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Dashboard {
    pub period: Period,
    pub total_population: i64,
    pub total_merchants: i64,
    pub new_population: i64,
    pub new_merchants: i64,
    pub total_deceased: i64,
    pub new_deceased: i64,
    pub total_disabled: i64,
    pub new_disabled: i64,
    pub total_special_needs: i64,
    pub new_special_needs: i64,
    pub total_low_income: i64,
    pub new_low_income: i64,
    pub total_five_guarantees: i64,
    pub new_five_guarantees: i64,
}

impl Dashboard {
    pub async fn load(pool: &PgPool, model: &ResolvedModel, period: Period) -> Result<Self, AppError> {
        let days = period.days();
        let residents = model.table("residents")?;
        let merchants = model.table("merchants")?;
        let flagged = |flag: &'static str, value: bool| count_where(pool, residents, flag, value);
        let new_in = |table: &'static str| -> Result<QueryBuf, AppError> { Ok(count_since(model.table(table)?, days, None)) };
        Ok(Dashboard {
            period,
            total_population: flagged("is_deceased", false).await?,
            total_merchants: count_all(pool, merchants).await?,
            new_population: fetch_count(pool, &count_since(residents, days, Some("\"is_deceased\" = FALSE"))).await?,
            new_merchants: fetch_count(pool, &count_since(merchants, days, None)).await?,
            total_deceased: flagged("is_deceased", true).await?,
            new_deceased: fetch_count(pool, &new_in("deceased")?).await?,
            total_disabled: flagged("is_disabled", true).await?,
            new_disabled: fetch_count(pool, &new_in("disabled")?).await?,
            total_special_needs: flagged("is_special_support", true).await?,
            new_special_needs: fetch_count(pool, &new_in("special_needs")?).await?,
            total_low_income: flagged("is_low_income", true).await?,
            new_low_income: fetch_count(pool, &new_in("low_income")?).await?,
            total_five_guarantees: flagged("is_beneficiary", true).await?,
            new_five_guarantees: fetch_count(pool, &new_in("five_guarantees")?).await?,
        })
    }
}

async fn count_all(pool: &PgPool, entity: &ResolvedEntity) -> Result<i64, AppError> {
    let q = QueryBuf {
        sql: format!("SELECT COUNT(*) FROM {}", table_of(entity)),
        params: Vec::new(),
    };
    fetch_count(pool, &q).await
}

async fn count_where(pool: &PgPool, entity: &ResolvedEntity, column: &str, value: bool) -> Result<i64, AppError> {
    let mut q = QueryBuf::default();
    let n = q.push_param(Value::Bool(value));
    q.sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ${}", table_of(entity), quoted(column), n);
    fetch_count(pool, &q).await
}

fn age_band_count(residents: &ResolvedEntity, lo: i32, hi: Option<i32>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let age = "date_part('year', age(CURRENT_DATE, \"birth_date\"))";
    let lo_n = q.push_param(Value::from(lo));
    let mut cond = format!("{} >= ${}::int4", age, lo_n);
    if let Some(hi) = hi {
        let hi_n = q.push_param(Value::from(hi));
        cond.push_str(&format!(" AND {} <= ${}::int4", age, hi_n));
    }
    q.sql = format!(
        "SELECT COUNT(*) FROM {} WHERE \"is_deceased\" = FALSE AND {}",
        table_of(residents),
        cond
    );
    q
}

/// Page over `entity` rows (aliased `m`) selected by a join clause whose only parameter is `$1`.
async fn joined_page(
    pool: &PgPool,
    entity: &ResolvedEntity,
    join: &str,
    key: i64,
    page: PageRequest,
) -> Result<Page<Value>, AppError> {
    let count_q = QueryBuf {
        sql: format!("SELECT COUNT(DISTINCT m.{}) {}", quoted(PK), join),
        params: vec![Value::from(key)],
    };
    let total = fetch_count(pool, &count_q).await?;
    let rows_q = QueryBuf {
        sql: format!(
            "SELECT DISTINCT {} {} ORDER BY m.{} LIMIT $2 OFFSET $3",
            select_column_list(entity, Some("m")),
            join,
            quoted(PK)
        ),
        params: vec![Value::from(key), Value::from(page.limit()), Value::from(page.offset())],
    };
    let data = fetch_all(pool, &rows_q).await?;
    Ok(Page {
        data,
        total,
        page: page.page,
        page_size: page.page_size,
    })
}
