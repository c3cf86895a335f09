//! Database module for datamodel_sync
//!
//! Module connections, their transactions, and plan execution.

pub mod connection;
pub mod executor;

// Re-export key types
pub use connection::{check_module_references, ModuleConnection, ModuleRegistry};
pub use executor::{apply_plan, DryRunExecutor, PhaseSummary, StatementExecutor, SyncTarget};
