//! Apply the catalog to the database: schema, tables (with constraints) and indexes.
//! Tables are created in catalog order, which the validator guarantees is dependency order.

use crate::config::{ColumnDef, ColumnType, ResolvedEntity, ResolvedModel, PK};
use crate::error::AppError;
use crate::sql::{qualified_table, quoted, table_of};
use sqlx::PgPool;

fn column_ddl(schema: &str, c: &ColumnDef) -> String {
    let mut def = format!("{} {}", quoted(c.name), c.ty.ddl());
    if c.ty == ColumnType::Serial && c.name == PK {
        def.push_str(" PRIMARY KEY");
        return def;
    }
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = c.default {
        def.push_str(" DEFAULT ");
        def.push_str(d);
    }
    if c.unique {
        def.push_str(" UNIQUE");
    }
    if let Some(fk) = &c.references {
        def.push_str(&format!(
            " REFERENCES {} ({}) ON DELETE CASCADE",
            qualified_table(schema, fk.table),
            quoted(PK)
        ));
    }
    if let Some(allowed) = &c.rule.allowed {
        let values: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
        def.push_str(&format!(" CHECK ({} IN ({}))", quoted(c.name), values.join(", ")));
    }
    if let Some(min) = c.rule.minimum {
        def.push_str(&format!(" CHECK ({} >= {})", quoted(c.name), min));
    }
    def
}

/// CREATE TABLE IF NOT EXISTS for one entity.
pub fn table_ddl(entity: &ResolvedEntity) -> String {
    let cols: Vec<String> = entity
        .columns
        .iter()
        .map(|c| column_ddl(&entity.schema_name, c))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        table_of(entity),
        cols.join(",\n    ")
    )
}

pub fn index_ddl(entity: &ResolvedEntity) -> Vec<String> {
    entity
        .indexes
        .iter()
        .map(|ix| {
            let cols: Vec<String> = ix.columns.iter().map(|c| quoted(c)).collect();
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quoted(ix.name),
                table_of(entity),
                cols.join(", ")
            )
        })
        .collect()
}

/// Every statement needed to bring an empty database to the catalog, in execution order.
pub fn migration_statements(model: &ResolvedModel) -> Vec<String> {
    let mut out = vec![format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(&model.schema_name))];
    for e in &model.entities {
        out.push(table_ddl(e));
    }
    for e in &model.entities {
        out.extend(index_ddl(e));
    }
    out
}

/// Idempotent: every statement is IF NOT EXISTS. Runs in one transaction.
pub async fn apply_migrations(pool: &PgPool, model: &ResolvedModel) -> Result<(), AppError> {
    let statements = migration_statements(model);
    let mut tx = pool.begin().await?;
    for sql in &statements {
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(sql).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!(schema = %model.schema_name, statements = statements.len(), "migrations applied");
    Ok(())
}
