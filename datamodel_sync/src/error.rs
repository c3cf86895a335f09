//! Error types for datamodel_sync

use thiserror::Error;

/// Result type for datamodel_sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for datamodel_sync
///
/// Every variant is fatal for a sync run: nothing is retried and any open
/// module transaction is rolled back before the error is returned.
#[derive(Error, Debug)]
pub enum Error {
    /// The data model is malformed. Raised before any connection is opened.
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Could not connect module '{module}': {source}")]
    ConnectionError {
        module: String,
        #[source]
        source: sqlx::Error,
    },

    /// Unknown module reference or unsupported storage engine.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    #[error("Statement failed on module '{module}': {message}\n  SQL: {statement}")]
    DdlExecutionError {
        module: String,
        statement: String,
        message: String,
    },

    #[error("Aborted by user: {0}")]
    UserAbort(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Schema analysis error: {0}")]
    SchemaAnalysisError(String),

    #[error("Post-sync hook error: {0}")]
    HookError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Wrap a failed DDL statement with the module it ran against
    pub fn ddl(module: impl Into<String>, statement: impl Into<String>, err: impl ToString) -> Self {
        Error::DdlExecutionError {
            module: module.into(),
            statement: statement.into(),
            message: err.to_string(),
        }
    }
}

/// Convert Serde JSON errors to datamodel_sync errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to datamodel_sync errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
