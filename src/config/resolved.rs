//! Resolved entity model: catalog validated and indexed for runtime use.

use crate::config::types::TableDef;
use crate::config::{catalog, validate};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::ops::Deref;

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub schema_name: String,
    pub def: TableDef,
}

impl Deref for ResolvedEntity {
    type Target = TableDef;

    fn deref(&self) -> &TableDef {
        &self.def
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub schema_name: String,
    /// Catalog order: parents before children.
    pub entities: Vec<ResolvedEntity>,
    by_path: HashMap<String, usize>,
    by_table: HashMap<String, usize>,
}

impl ResolvedModel {
    /// Entity served under `/api/:path_segment`. Hidden tables are not reachable here.
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.by_path
            .get(path)
            .map(|&i| &self.entities[i])
            .filter(|e| e.exposed)
    }

    pub fn entity_by_table(&self, table: &str) -> Option<&ResolvedEntity> {
        self.by_table.get(table).map(|&i| &self.entities[i])
    }

    /// Like `entity_by_table` for tables the code itself names; a miss is a catalog bug.
    pub fn table(&self, table: &str) -> Result<&ResolvedEntity, ConfigError> {
        self.entity_by_table(table).ok_or(ConfigError::MissingReference {
            kind: "table",
            id: table.to_string(),
        })
    }
}

/// Build the resolved model from the built-in catalog, placing every table in `schema_name`.
pub fn resolve(schema_name: &str) -> Result<ResolvedModel, ConfigError> {
    resolve_tables(schema_name, catalog())
}

pub fn resolve_tables(schema_name: &str, tables: Vec<TableDef>) -> Result<ResolvedModel, ConfigError> {
    validate(&tables)?;
    let mut by_path = HashMap::new();
    let mut by_table = HashMap::new();
    let mut entities = Vec::with_capacity(tables.len());
    for (i, def) in tables.into_iter().enumerate() {
        by_path.insert(def.path_segment.to_string(), i);
        by_table.insert(def.name.to_string(), i);
        entities.push(ResolvedEntity {
            schema_name: schema_name.to_string(),
            def,
        });
    }
    Ok(ResolvedModel {
        schema_name: schema_name.to_string(),
        entities,
        by_path,
        by_table,
    })
}
