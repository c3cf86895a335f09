//! Type definitions for live schema snapshots and planned DDL

use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

use crate::model::{AttributeDefinition, ForeignKeyConstraint, IndexDefinition};

/// The frozen read of every module's live schema, taken once per run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSnapshot {
    pub modules: IndexMap<String, ModuleSnapshot>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, module: ModuleSnapshot) {
        self.modules.insert(module.module_name.clone(), module);
    }

    pub fn module(&self, module_name: &str) -> Option<&ModuleSnapshot> {
        self.modules.get(module_name)
    }

    /// Every live table (and view), module by module
    pub fn tables(&self) -> impl Iterator<Item = &ExistingTable> {
        self.modules.values().flat_map(|module| module.tables.values())
    }
}

/// The live schema of one module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleSnapshot {
    pub module_name: String,
    pub schema_name: String,
    pub tables: IndexMap<String, ExistingTable>,
    pub columns: HashMap<String, Vec<LiveColumn>>,
    pub indexes: HashMap<String, Vec<LiveIndex>>,
    pub foreign_keys: HashMap<String, Vec<LiveForeignKey>>,
}

impl ModuleSnapshot {
    pub fn new(module_name: &str, schema_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            schema_name: schema_name.to_string(),
            ..Self::default()
        }
    }

    pub fn add_table(&mut self, name: &str, table_type: TableType) {
        self.tables.insert(
            name.to_string(),
            ExistingTable {
                name: name.to_string(),
                table_type,
                module_name: self.module_name.clone(),
                schema_name: self.schema_name.clone(),
            },
        );
    }

    pub fn add_column(&mut self, table_name: &str, column: LiveColumn) {
        self.columns.entry(table_name.to_string()).or_default().push(column);
    }

    pub fn add_index(&mut self, table_name: &str, index: LiveIndex) {
        self.indexes.entry(table_name.to_string()).or_default().push(index);
    }

    pub fn add_foreign_key(&mut self, table_name: &str, foreign_key: LiveForeignKey) {
        self.foreign_keys
            .entry(table_name.to_string())
            .or_default()
            .push(foreign_key);
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn columns(&self, table_name: &str) -> &[LiveColumn] {
        self.columns.get(table_name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn indexes(&self, table_name: &str) -> &[LiveIndex] {
        self.indexes.get(table_name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn foreign_keys(&self, table_name: &str) -> &[LiveForeignKey] {
        self.foreign_keys.get(table_name).map(Vec::as_slice).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    BaseTable,
    View,
}

impl TableType {
    pub fn from_information_schema(table_type: &str) -> Self {
        if table_type.eq_ignore_ascii_case("VIEW") || table_type.eq_ignore_ascii_case("SYSTEM VIEW") {
            TableType::View
        } else {
            TableType::BaseTable
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableType::BaseTable => f.write_str("BASE TABLE"),
            TableType::View => f.write_str("VIEW"),
        }
    }
}

/// A table as it existed when the snapshot was taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingTable {
    pub name: String,
    pub table_type: TableType,
    pub module_name: String,
    pub schema_name: String,
}

/// A live column, with `COLUMN_TYPE` split into base type and length
#[derive(Debug, Clone, PartialEq)]
pub struct LiveColumn {
    pub name: String,
    pub base_type: String,
    pub length_or_values: Option<String>,
    pub nullable: bool,
    pub default: Option<String>,
}

impl LiveColumn {
    /// Build a column from a full MySQL column type such as `varchar(255)`
    /// or `enum('a','b')`
    pub fn new(name: &str, column_type: &str) -> Self {
        let (base_type, length_or_values) = split_column_type(column_type);
        Self {
            name: name.to_string(),
            base_type,
            length_or_values,
            nullable: true,
            default: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

/// Split `decimal(10,2) unsigned` into `("decimal unsigned", Some("10,2"))`
pub fn split_column_type(column_type: &str) -> (String, Option<String>) {
    match (column_type.find('('), column_type.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            let base = format!("{}{}", &column_type[..open], &column_type[close + 1..]);
            let length = column_type[open + 1..close].to_string();
            (base.trim().to_string(), Some(length))
        }
        _ => (column_type.trim().to_string(), None),
    }
}

/// One live index. Composite indexes appear once per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveIndex {
    pub name: String,
    pub column_name: String,
    pub nullable: bool,
    pub index_type: String,
    /// Set when the index shares its name with a foreign key constraint
    pub referenced_table: Option<String>,
}

impl LiveIndex {
    pub fn is_primary(&self) -> bool {
        self.name.eq_ignore_ascii_case("PRIMARY")
    }

    pub fn backs_foreign_key(&self) -> bool {
        self.referenced_table.is_some()
    }
}

/// A live foreign key constraint on a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveForeignKey {
    pub constraint_name: String,
    pub table_name: String,
    pub column_name: String,
    pub referenced_table: String,
}

impl LiveForeignKey {
    pub fn identity(&self) -> crate::utils::naming::ForeignKeyIdentity {
        crate::utils::naming::foreign_key_identity(
            &self.table_name,
            &self.referenced_table,
            &self.column_name,
        )
    }
}

/// The full definition a column should have
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: String,
    pub length_or_values: Option<String>,
    pub default: ColumnDefault,
    pub allow_null: bool,
}

impl ColumnSpec {
    pub fn from_attribute(name: &str, attribute: &AttributeDefinition) -> Self {
        let default = match &attribute.default {
            Some(value) => {
                let value = value.to_sql_value();
                if value.is_empty() {
                    ColumnDefault::None
                } else if value.eq_ignore_ascii_case("CURRENT_TIMESTAMP") {
                    ColumnDefault::CurrentTimestamp
                } else {
                    ColumnDefault::Literal(value)
                }
            }
            None => ColumnDefault::None,
        };

        Self {
            name: name.to_string(),
            column_type: attribute.column_type.clone(),
            length_or_values: attribute.length_or_values.as_ref().map(|l| l.to_string()),
            default,
            allow_null: attribute.allow_null,
        }
    }

    /// Foreign key columns are nullable integers matching the primary key
    pub fn relationship(name: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: "INT".to_string(),
            length_or_values: None,
            default: ColumnDefault::None,
            allow_null: true,
        }
    }

    pub fn locking_constraint(name: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: "datetime".to_string(),
            length_or_values: None,
            default: ColumnDefault::CurrentTimestamp,
            allow_null: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDefault {
    None,
    CurrentTimestamp,
    Literal(String),
}

/// Column properties compared during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnProperty {
    Type,
    LengthOrValues,
    Default,
    AllowNull,
}

impl fmt::Display for ColumnProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnProperty::Type => f.write_str("type"),
            ColumnProperty::LengthOrValues => f.write_str("lengthOrValues"),
            ColumnProperty::Default => f.write_str("default"),
            ColumnProperty::AllowNull => f.write_str("allowNull"),
        }
    }
}

/// One DDL operation produced by the planner
#[derive(Debug, Clone, PartialEq)]
pub enum DdlOperation {
    DropTables { tables: Vec<String> },
    DropViews { views: Vec<String> },
    CreateTable { table: String, primary_key: String },
    DropForeignKey { table: String, constraint_name: String },
    DropColumn { table: String, column: String },
    AddPrimaryKey { table: String, column: String },
    AddColumn { table: String, column: ColumnSpec },
    ModifyColumn {
        table: String,
        column: ColumnSpec,
        mismatches: Vec<ColumnProperty>,
    },
    AddIndex { table: String, index: IndexDefinition },
    DropIndex { table: String, index_name: String },
    AddForeignKey {
        constraint: ForeignKeyConstraint,
        primary_key: String,
    },
}

impl DdlOperation {
    /// The table this operation alters, or the first dropped table
    pub fn table(&self) -> &str {
        match self {
            DdlOperation::DropTables { tables } => tables.first().map(String::as_str).unwrap_or(""),
            DdlOperation::DropViews { views } => views.first().map(String::as_str).unwrap_or(""),
            DdlOperation::CreateTable { table, .. }
            | DdlOperation::DropForeignKey { table, .. }
            | DdlOperation::DropColumn { table, .. }
            | DdlOperation::AddPrimaryKey { table, .. }
            | DdlOperation::AddColumn { table, .. }
            | DdlOperation::ModifyColumn { table, .. }
            | DdlOperation::AddIndex { table, .. }
            | DdlOperation::DropIndex { table, .. } => table,
            DdlOperation::AddForeignKey { constraint, .. } => &constraint.table_name,
        }
    }
}
