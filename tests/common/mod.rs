#![allow(dead_code)]

use community_admin::config::{resolve, ResolvedEntity, ResolvedModel};
use community_admin::{apply_migrations, CrudService};
use serde_json::{json, Map, Value};
use sqlx::PgPool;

pub async fn setup(pool: &PgPool) -> anyhow::Result<ResolvedModel> {
    let model = resolve("public")?;
    apply_migrations(pool, &model).await?;
    Ok(model)
}

pub fn entity<'a>(model: &'a ResolvedModel, path: &str) -> &'a ResolvedEntity {
    model
        .entity_by_path(path)
        .or_else(|| model.entity_by_table(path))
        .expect("catalog entity")
}

pub fn obj(v: Value) -> Map<String, Value> {
    v.as_object().cloned().expect("json object")
}

pub fn id_of(row: &Value) -> i64 {
    row["id"].as_i64().expect("row id")
}

pub async fn add(pool: &PgPool, model: &ResolvedModel, path: &str, v: Value) -> anyhow::Result<Value> {
    Ok(CrudService::create(pool, model, entity(model, path), obj(v)).await?)
}

pub async fn add_id(pool: &PgPool, model: &ResolvedModel, path: &str, v: Value) -> anyhow::Result<i64> {
    Ok(id_of(&add(pool, model, path, v).await?))
}

pub async fn ethnicity(pool: &PgPool, model: &ResolvedModel) -> anyhow::Result<i64> {
    add_id(pool, model, "ethnicities", json!({"name": "汉族"})).await
}

/// Resident with a unique id card derived from `n`.
pub async fn resident(pool: &PgPool, model: &ResolvedModel, ethnicity_id: i64, n: u32, birth_date: &str) -> anyhow::Result<i64> {
    add_id(
        pool,
        model,
        "residents",
        json!({
            "name": format!("居民{}", n),
            "id_card": format!("1101011990{:08}", n),
            "gender": (n % 2) as i64,
            "birth_date": birth_date,
            "ethnicity_id": ethnicity_id
        }),
    )
    .await
}

/// group → community → apartment → unit → house; returns (community_id, house_id).
pub async fn address_tree(pool: &PgPool, model: &ResolvedModel, suffix: &str) -> anyhow::Result<(i64, i64)> {
    let group = add_id(pool, model, "groups", json!({"group_number": format!("G-{}", suffix)})).await?;
    let community = add_id(
        pool,
        model,
        "communities",
        json!({"community_name": format!("社区{}", suffix), "group_id": group, "community_number": suffix}),
    )
    .await?;
    let apartment = add_id(pool, model, "apartments", json!({"community_id": community, "apartment_number": 1})).await?;
    let unit = add_id(pool, model, "units", json!({"apartment_id": apartment, "unit_number": 2})).await?;
    let house = add_id(pool, model, "houses", json!({"unit_id": unit, "house_number": "301"})).await?;
    Ok((community, house))
}

pub async fn role(pool: &PgPool, model: &ResolvedModel, name: &str) -> anyhow::Result<i64> {
    add_id(pool, model, "roles", json!({"name": name})).await
}
