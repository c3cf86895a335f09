//! Schema module for datamodel_sync
//!
//! Live schema introspection, sync planning, DDL generation and the
//! confirmation step for destructive changes.

pub mod analyzer;
pub mod confirm;
pub mod diff;
pub mod generator;
pub mod types;

// Re-export key types
pub use analyzer::{snapshot, Analyzer, MySqlAnalyzer, StorageEngine};
pub use confirm::{confirm_removal, LineReader, ScriptedLineReader, TableRemoval, TerminalLineReader};
pub use diff::{plan_sync, removal_candidates, ChangeKind, Phase, PhasePlan, PlannedStatement, SyncPlan};
pub use generator::{column_definition, generate_plan_sql, generate_sql};
pub use types::{
    ColumnDefault, ColumnProperty, ColumnSpec, DdlOperation, ExistingTable, LiveColumn, LiveForeignKey,
    LiveIndex, ModuleSnapshot, SchemaSnapshot, TableType,
};
