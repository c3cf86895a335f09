//! Type definitions for the declarative data model

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::validation::validate;

/// The data model exactly as authored, before defaults and validation
pub type RawDataModel = IndexMap<String, RawEntityDefinition>;

/// An entity as authored. Every section is optional so that validation can
/// report what is missing instead of failing inside the JSON parser. Unknown
/// keys are rejected: a misspelled section would otherwise read as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawEntityDefinition {
    pub module: Option<String>,
    pub attributes: Option<IndexMap<String, AttributeDefinition>>,
    pub indexes: Option<Vec<IndexDefinition>>,
    pub relationships: Option<IndexMap<String, Vec<String>>>,
    pub options: Option<EntityOptions>,
}

/// A validated data model: entity name to definition, in authored order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataModel {
    pub entities: IndexMap<String, EntityDefinition>,
}

impl DataModel {
    /// Parse and validate a JSON data model
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entities: IndexMap<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| Error::ValidationError(format!("Data model is not valid JSON: {}", e)))?;

        // Entity by entity, so that errors name the entity they come from
        let mut raw = RawDataModel::with_capacity(entities.len());
        for (entity_name, definition) in entities {
            let entity: RawEntityDefinition = serde_json::from_value(definition).map_err(|e| {
                Error::ValidationError(format!("Entity '{}' has an invalid definition: {}", entity_name, e))
            })?;
            raw.insert(entity_name, entity);
        }

        validate(raw)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Data model file '{}' could not be read: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDefinition> {
        self.entities.get(name)
    }
}

/// A validated entity with all defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDefinition {
    pub module: String,
    pub attributes: IndexMap<String, AttributeDefinition>,
    pub indexes: Vec<IndexDefinition>,
    /// Related entity name to the foreign key columns pointing at it
    pub relationships: IndexMap<String, Vec<String>>,
    pub options: EntityOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttributeDefinition {
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub length_or_values: Option<LengthOrValues>,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default = "default_true")]
    pub allow_null: bool,
}

impl AttributeDefinition {
    pub fn new(column_type: &str) -> Self {
        Self {
            column_type: column_type.to_string(),
            length_or_values: None,
            default: None,
            allow_null: true,
        }
    }

    pub fn length(mut self, length: i64) -> Self {
        self.length_or_values = Some(LengthOrValues::Number(length));
        self
    }

    pub fn values(mut self, values: &str) -> Self {
        self.length_or_values = Some(LengthOrValues::Text(values.to_string()));
        self
    }

    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }
}

/// A column length, precision (`"10,2"`) or enum value list (`"'a','b'"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LengthOrValues {
    Number(i64),
    Text(String),
}

impl fmt::Display for LengthOrValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthOrValues::Number(n) => write!(f, "{}", n),
            LengthOrValues::Text(s) => f.write_str(s),
        }
    }
}

/// An attribute default. `"CURRENT_TIMESTAMP"` is kept as text and
/// recognised when the column definition is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl DefaultValue {
    /// The default as MySQL reports it in `COLUMN_DEFAULT`
    pub fn to_sql_value(&self) -> String {
        match self {
            DefaultValue::Bool(true) => "1".to_string(),
            DefaultValue::Bool(false) => "0".to_string(),
            DefaultValue::Number(n) => n.to_string(),
            DefaultValue::Text(s) => s.clone(),
        }
    }
}

/// An index declared on a single attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IndexDefinition {
    pub attribute: String,
    pub index_name: String,
    pub index_choice: IndexChoice,
    #[serde(rename = "type")]
    pub index_type: IndexType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum IndexChoice {
    Index,
    Unique,
    Spatial,
    Fulltext,
}

impl TryFrom<String> for IndexChoice {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "index" => Ok(IndexChoice::Index),
            "unique" => Ok(IndexChoice::Unique),
            "spatial" => Ok(IndexChoice::Spatial),
            "fulltext" => Ok(IndexChoice::Fulltext),
            _ => Err(format!(
                "invalid index choice '{}', expected one of: index, unique, spatial, fulltext",
                value
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum IndexType {
    Btree,
    Hash,
}

impl IndexType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IndexType::Btree => "BTREE",
            IndexType::Hash => "HASH",
        }
    }
}

impl TryFrom<String> for IndexType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.to_uppercase().as_str() {
            "BTREE" => Ok(IndexType::Btree),
            "HASH" => Ok(IndexType::Hash),
            _ => Err(format!("invalid index type '{}', expected BTREE or HASH", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityOptions {
    #[serde(default = "default_true")]
    pub enforce_locking_constraints: bool,
    /// Read by the application's audit layer. Accepted here so that models
    /// carrying it validate; it has no effect on the schema.
    #[serde(default = "default_true")]
    pub is_audit_enabled: bool,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            enforce_locking_constraints: true,
            is_audit_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}
