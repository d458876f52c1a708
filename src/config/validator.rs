//! Catalog validation: referential integrity and API consistency.

use crate::config::types::{ColumnType, TableDef, PK};
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(tables: &[TableDef]) -> Result<(), ConfigError> {
    let mut seen_tables: HashSet<&str> = HashSet::new();
    let mut path_segments = HashSet::new();
    let mut index_names = HashSet::new();

    for t in tables {
        if !path_segments.insert(t.path_segment) {
            return Err(ConfigError::DuplicatePathSegment(t.path_segment.to_string()));
        }
        match t.column_by_name(PK) {
            Some(c) if c.ty == ColumnType::Serial => {}
            _ => {
                return Err(ConfigError::InvalidPrimaryKey {
                    table_id: t.name.to_string(),
                    column: PK.to_string(),
                })
            }
        }

        let mut names = HashSet::new();
        for c in &t.columns {
            if !names.insert(c.name) {
                return Err(ConfigError::Validation(format!("{}: duplicate column {}", t.name, c.name)));
            }
            if let Some(fk) = &c.references {
                // Parents must precede children so DDL can run top to bottom.
                if !seen_tables.contains(fk.table) && fk.table != t.name {
                    return Err(ConfigError::MissingReference {
                        kind: "table",
                        id: format!("{} (referenced by {}.{})", fk.table, t.name, c.name),
                    });
                }
                if !c.ty.is_integer() {
                    return Err(ConfigError::Validation(format!(
                        "{}.{}: foreign keys must be integer columns",
                        t.name, c.name
                    )));
                }
            }
        }

        for col in t.search.iter().chain(t.distributions.iter()).chain(t.label.iter()) {
            if !t.has_column(col) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", t.name, col),
                });
            }
        }
        for idx in &t.indexes {
            if !index_names.insert(idx.name) {
                return Err(ConfigError::Validation(format!("duplicate index name {}", idx.name)));
            }
            if let Some(col) = idx.columns.iter().find(|c| !t.has_column(c)) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{} (index {})", t.name, col, idx.name),
                });
            }
        }

        if let Some(m) = &t.mirror {
            let fk_ok = t
                .column_by_name(m.fk_column)
                .and_then(|c| c.references.as_ref())
                .map(|fk| fk.table == m.parent_table)
                .unwrap_or(false);
            if !fk_ok {
                return Err(ConfigError::Validation(format!(
                    "{}: mirror column {} must reference {}",
                    t.name, m.fk_column, m.parent_table
                )));
            }
            let parent = tables.iter().find(|p| p.name == m.parent_table);
            let flag_ok = parent
                .and_then(|p| p.column_by_name(m.flag_column))
                .map(|c| c.ty == ColumnType::Bool && c.managed)
                .unwrap_or(false);
            if !flag_ok {
                return Err(ConfigError::Validation(format!(
                    "{}: {}.{} must be a managed boolean",
                    t.name, m.parent_table, m.flag_column
                )));
            }
        }

        seen_tables.insert(t.name);
    }

    Ok(())
}
