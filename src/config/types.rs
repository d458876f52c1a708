//! Table and column definitions: the data model expressed once, consumed by DDL, validation and SQL.

use serde_json::Value;

/// PostgreSQL column type for a catalog column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Serial,
    SmallInt,
    Int,
    Bool,
    Varchar(u32),
    Text,
    Date,
    Timestamptz,
}

impl ColumnType {
    /// Type as written in CREATE TABLE.
    pub fn ddl(&self) -> String {
        match self {
            ColumnType::Serial => "SERIAL".into(),
            ColumnType::SmallInt => "SMALLINT".into(),
            ColumnType::Int => "INTEGER".into(),
            ColumnType::Bool => "BOOLEAN".into(),
            ColumnType::Varchar(n) => format!("VARCHAR({})", n),
            ColumnType::Text => "TEXT".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::Timestamptz => "TIMESTAMPTZ".into(),
        }
    }

    /// Cast applied to bound parameters so JSON values land in the column type.
    pub fn cast(&self) -> &'static str {
        match self {
            ColumnType::Serial | ColumnType::Int => "int4",
            ColumnType::SmallInt => "int2",
            ColumnType::Bool => "bool",
            ColumnType::Varchar(_) | ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::Timestamptz => "timestamptz",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Serial | ColumnType::SmallInt | ColumnType::Int)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ValidationRule {
    pub pattern: Option<&'static str>,
    pub allowed: Option<Vec<Value>>,
    pub minimum: Option<i64>,
}

/// Foreign key to another catalog table's primary key. Always ON DELETE CASCADE.
#[derive(Clone, Debug)]
pub struct ForeignKey {
    pub table: &'static str,
}

#[derive(Clone, Debug)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    /// SQL default expression, e.g. `NOW()` or `FALSE`.
    pub default: Option<&'static str>,
    pub unique: bool,
    pub references: Option<ForeignKey>,
    /// Maintained by the service layer or the database; rejected in payloads.
    pub managed: bool,
    /// Never serialized in responses.
    pub sensitive: bool,
    pub rule: ValidationRule,
}

impl ColumnDef {
    pub fn new(name: &'static str, ty: ColumnType) -> Self {
        ColumnDef {
            name,
            ty,
            nullable: false,
            default: None,
            unique: false,
            references: None,
            managed: false,
            sensitive: false,
            rule: ValidationRule::default(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_to(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, table: &'static str) -> Self {
        self.references = Some(ForeignKey { table });
        self
    }

    pub fn managed(mut self) -> Self {
        self.managed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn pattern(mut self, pattern: &'static str) -> Self {
        self.rule.pattern = Some(pattern);
        self
    }

    /// Restrict an integer column to the inclusive range `min..=max`.
    pub fn choices(mut self, min: i64, max: i64) -> Self {
        self.rule.allowed = Some((min..=max).map(Value::from).collect());
        self
    }

    pub fn minimum(mut self, min: i64) -> Self {
        self.rule.minimum = Some(min);
        self
    }

    /// Whether an add payload must carry this column.
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none() && !self.managed && self.ty != ColumnType::Serial
    }
}

/// Detail table whose existence a boolean on the parent mirrors (e.g. low_income -> residents.is_low_income).
#[derive(Clone, Debug)]
pub struct FlagMirror {
    /// Our foreign key column pointing at the parent.
    pub fk_column: &'static str,
    pub parent_table: &'static str,
    pub flag_column: &'static str,
}

/// Non-generic queries an entity opts into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    NewCount,
    Import,
    AgeDistribution,
    SpecialStats,
    ByCommunity,
}

#[derive(Clone, Debug)]
pub struct IndexDef {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
}

#[derive(Clone, Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub path_segment: &'static str,
    pub columns: Vec<ColumnDef>,
    /// Text columns matched by keyword search.
    pub search: Vec<&'static str>,
    /// Columns allowed for grouped counts.
    pub distributions: Vec<&'static str>,
    /// Human-readable column joined into distributions over a foreign key to this table.
    pub label: Option<&'static str>,
    pub indexes: Vec<IndexDef>,
    pub mirror: Option<FlagMirror>,
    pub capabilities: Vec<Capability>,
    /// Served by the generic entity routes.
    pub exposed: bool,
    /// POST commands require a privileged role.
    pub privileged_writes: bool,
}

pub const PK: &str = "id";
pub const REGISTRATION_DATE: &str = "registration_date";
pub const LAST_UPDATE_TIME: &str = "last_update_time";

impl TableDef {
    pub fn new(name: &'static str, path_segment: &'static str) -> Self {
        TableDef {
            name,
            path_segment,
            columns: vec![ColumnDef::new(PK, ColumnType::Serial).managed()],
            search: Vec::new(),
            distributions: Vec::new(),
            label: None,
            indexes: Vec::new(),
            mirror: None,
            capabilities: Vec::new(),
            exposed: true,
            privileged_writes: false,
        }
    }

    pub fn column(mut self, c: ColumnDef) -> Self {
        self.columns.push(c);
        self
    }

    /// Append `registration_date` and `last_update_time`.
    pub fn timestamps(mut self) -> Self {
        self.columns.push(
            ColumnDef::new(REGISTRATION_DATE, ColumnType::Timestamptz)
                .default_to("NOW()")
                .managed(),
        );
        self.columns.push(
            ColumnDef::new(LAST_UPDATE_TIME, ColumnType::Timestamptz)
                .default_to("NOW()")
                .managed(),
        );
        self
    }

    pub fn search(mut self, cols: &[&'static str]) -> Self {
        self.search = cols.to_vec();
        self
    }

    pub fn distributions(mut self, cols: &[&'static str]) -> Self {
        self.distributions = cols.to_vec();
        self
    }

    pub fn label(mut self, col: &'static str) -> Self {
        self.label = Some(col);
        self
    }

    pub fn index(mut self, name: &'static str, cols: &[&'static str]) -> Self {
        self.indexes.push(IndexDef {
            name,
            columns: cols.to_vec(),
        });
        self
    }

    pub fn mirror(mut self, fk_column: &'static str, parent_table: &'static str, flag_column: &'static str) -> Self {
        self.mirror = Some(FlagMirror {
            fk_column,
            parent_table,
            flag_column,
        });
        self
    }

    pub fn capability(mut self, cap: Capability) -> Self {
        self.capabilities.push(cap);
        self
    }

    pub fn privileged_writes(mut self) -> Self {
        self.privileged_writes = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.exposed = false;
        self
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_by_name(name).is_some()
    }

    pub fn supports(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.unique)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.references.is_some())
    }
}
