//! Utilities for datamodel_sync

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use logging::init_logging;
pub use naming::{
    foreign_key_constraint_name, foreign_key_identity, quote_identifier, quote_literal, CaseImplementation,
    ForeignKeyIdentity,
};
