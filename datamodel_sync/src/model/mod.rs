//! Data model module
//!
//! This module handles parsing, validation and case normalization of the
//! declarative data model.

pub mod normalize;
pub mod types;
pub mod validation;

// Re-export key types
pub use normalize::{normalize_case, CasedDataModel, CasedEntity, ForeignKeyConstraint};
pub use types::{
    AttributeDefinition, DataModel, DefaultValue, EntityDefinition, EntityOptions, IndexChoice,
    IndexDefinition, IndexType, LengthOrValues, RawDataModel, RawEntityDefinition,
};
pub use validation::validate;
