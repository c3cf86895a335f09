//! Naming utilities for datamodel_sync
//!
//! Data models are authored in camelCase. Every database-facing name is
//! derived from that canonical form through a [`CaseImplementation`].

use inflector::Inflector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Canonical name of the auto-increment primary key column
const PRIMARY_KEY_COLUMN: &str = "id";

/// Canonical name of the optimistic-locking timestamp column
const LOCKING_CONSTRAINT_COLUMN: &str = "lastUpdated";

/// Identifier style used for all database-facing names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CaseImplementation {
    #[default]
    #[serde(rename = "snakecase")]
    SnakeCase,
    #[serde(rename = "camelcase")]
    CamelCase,
    #[serde(rename = "pascalcase")]
    PascalCase,
}

impl CaseImplementation {
    pub const ALL: [CaseImplementation; 3] = [
        CaseImplementation::SnakeCase,
        CaseImplementation::CamelCase,
        CaseImplementation::PascalCase,
    ];

    /// Rewrite a canonical camelCase identifier into this case
    pub fn normalize(&self, identifier: &str) -> String {
        match self {
            CaseImplementation::SnakeCase => identifier.to_snake_case(),
            CaseImplementation::CamelCase => identifier.to_snake_case().to_camel_case(),
            CaseImplementation::PascalCase => identifier.to_snake_case().to_pascal_case(),
        }
    }

    /// Rewrite an identifier in this case back to canonical camelCase
    pub fn denormalize(&self, identifier: &str) -> String {
        match self {
            CaseImplementation::SnakeCase => identifier.to_camel_case(),
            CaseImplementation::CamelCase | CaseImplementation::PascalCase => {
                identifier.to_snake_case().to_camel_case()
            }
        }
    }

    /// The primary key column every table carries: `id` or `Id`
    pub fn primary_key_column(&self) -> String {
        self.normalize(PRIMARY_KEY_COLUMN)
    }

    /// The "last updated" column: `last_updated`, `lastUpdated` or `LastUpdated`
    pub fn locking_constraint_column(&self) -> String {
        self.normalize(LOCKING_CONSTRAINT_COLUMN)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseImplementation::SnakeCase => "snakecase",
            CaseImplementation::CamelCase => "camelcase",
            CaseImplementation::PascalCase => "pascalcase",
        }
    }
}

impl fmt::Display for CaseImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseImplementation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CaseImplementation::ALL
            .into_iter()
            .find(|case| case.as_str() == s.to_lowercase())
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "Invalid case implementation provided: {}. Allowed options: snakecase, camelcase, pascalcase",
                    s
                ))
            })
    }
}

/// The `(table, related table, column)` triple that identifies a foreign key
/// across runs, whatever its constraint is called
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForeignKeyIdentity {
    pub table_name: String,
    pub related_table: String,
    pub column_name: String,
}

impl ForeignKeyIdentity {
    /// Unambiguous byte encoding of the triple. Parts are NUL separated, which
    /// no MySQL identifier can contain.
    fn encode(&self) -> String {
        format!("{}\0{}\0{}", self.table_name, self.related_table, self.column_name)
    }
}

impl fmt::Display for ForeignKeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.table_name, self.related_table, self.column_name)
    }
}

pub fn foreign_key_identity(table_name: &str, related_table: &str, column_name: &str) -> ForeignKeyIdentity {
    ForeignKeyIdentity {
        table_name: table_name.to_string(),
        related_table: related_table.to_string(),
        column_name: column_name.to_string(),
    }
}

/// Constraint name for a foreign key: the md5 of its identity triple.
///
/// Always 32 hex characters, so it fits MySQL's 64 character limit no
/// matter how long the table and column names are.
pub fn foreign_key_constraint_name(table_name: &str, related_table: &str, column_name: &str) -> String {
    let identity = foreign_key_identity(table_name, related_table, column_name);
    format!("{:x}", md5::compute(identity.encode().as_bytes()))
}

/// Quote an identifier with backticks for MySQL
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal for MySQL
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Check that an identifier is non-empty and free of whitespace
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}
