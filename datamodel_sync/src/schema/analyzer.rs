//! Live schema introspection
//!
//! Reads tables, columns, indexes and foreign keys of every module's schema
//! into a [`SchemaSnapshot`] before any DDL runs.

use async_trait::async_trait;
use sqlx::{FromRow, MySqlConnection};

use crate::db::connection::ModuleRegistry;
use crate::error::{Error, Result};
use crate::schema::types::{
    LiveColumn, LiveForeignKey, LiveIndex, ModuleSnapshot, SchemaSnapshot, TableType,
};

/// Schema analyzer trait
#[async_trait]
pub trait Analyzer: Send {
    /// Analyze one module's schema
    async fn analyze_module(&mut self, module_name: &str, schema_name: &str) -> Result<ModuleSnapshot> {
        let mut snapshot = ModuleSnapshot::new(module_name, schema_name);
        self.analyze_tables(&mut snapshot).await?;
        self.analyze_columns(&mut snapshot).await?;
        self.analyze_indexes(&mut snapshot).await?;
        self.analyze_foreign_keys(&mut snapshot).await?;
        Ok(snapshot)
    }

    async fn analyze_tables(&mut self, snapshot: &mut ModuleSnapshot) -> Result<()>;

    async fn analyze_columns(&mut self, snapshot: &mut ModuleSnapshot) -> Result<()>;

    async fn analyze_indexes(&mut self, snapshot: &mut ModuleSnapshot) -> Result<()>;

    async fn analyze_foreign_keys(&mut self, snapshot: &mut ModuleSnapshot) -> Result<()>;

    /// Storage engines the server offers, with their support level
    async fn storage_engines(&mut self) -> Result<Vec<StorageEngine>>;
}

/// One row of `information_schema.ENGINES`
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StorageEngine {
    pub engine: String,
    pub support: String,
}

/// Fail unless InnoDB is the server's default storage engine
pub fn verify_storage_engines(module_name: &str, engines: &[StorageEngine]) -> Result<()> {
    let innodb = engines
        .iter()
        .find(|row| row.engine.eq_ignore_ascii_case("InnoDB"));

    match innodb {
        Some(row) if row.support.eq_ignore_ascii_case("DEFAULT") => Ok(()),
        Some(row) => Err(Error::IntegrityError(format!(
            "The default storage engine for module '{}' is not InnoDB (InnoDB support: {}). Cannot proceed",
            module_name, row.support
        ))),
        None => Err(Error::IntegrityError(format!(
            "InnoDB is not available for module '{}'. Cannot proceed",
            module_name
        ))),
    }
}

// Row types for information_schema queries. Every text column is cast to
// CHAR since MySQL 8 reports some of them as binary strings.
#[derive(FromRow)]
struct TableRow {
    table_name: String,
    table_type: String,
}

#[derive(FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    column_type: String,
    is_nullable: String,
    column_default: Option<String>,
}

#[derive(FromRow)]
struct IndexRow {
    table_name: String,
    index_name: String,
    column_name: Option<String>,
    nullable: Option<String>,
    index_type: String,
    referenced_table: Option<String>,
}

#[derive(FromRow)]
struct ForeignKeyRow {
    constraint_name: String,
    table_name: String,
    column_name: String,
    referenced_table: String,
}

/// MySQL schema analyzer working on a module's open transaction
pub struct MySqlAnalyzer<'c> {
    conn: &'c mut MySqlConnection,
}

impl<'c> MySqlAnalyzer<'c> {
    pub fn new(conn: &'c mut MySqlConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<'c> Analyzer for MySqlAnalyzer<'c> {
    async fn analyze_tables(&mut self, snapshot: &mut ModuleSnapshot) -> Result<()> {
        let sql = r#"
            SELECT CAST(TABLE_NAME AS CHAR) AS table_name,
                   CAST(TABLE_TYPE AS CHAR) AS table_type
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME
        "#;

        let rows = sqlx::query_as::<_, TableRow>(sql)
            .bind(&snapshot.schema_name)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| analysis_error("tables", &snapshot.module_name, e))?;

        for row in rows {
            snapshot.add_table(&row.table_name, TableType::from_information_schema(&row.table_type));
        }

        Ok(())
    }

    async fn analyze_columns(&mut self, snapshot: &mut ModuleSnapshot) -> Result<()> {
        let sql = r#"
            SELECT CAST(TABLE_NAME AS CHAR) AS table_name,
                   CAST(COLUMN_NAME AS CHAR) AS column_name,
                   CAST(COLUMN_TYPE AS CHAR) AS column_type,
                   CAST(IS_NULLABLE AS CHAR) AS is_nullable,
                   CAST(COLUMN_DEFAULT AS CHAR) AS column_default
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME, ORDINAL_POSITION
        "#;

        let rows = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(&snapshot.schema_name)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| analysis_error("columns", &snapshot.module_name, e))?;

        for row in rows {
            let mut column = LiveColumn::new(&row.column_name, &row.column_type)
                .nullable(row.is_nullable.eq_ignore_ascii_case("YES"));
            column.default = row.column_default;
            snapshot.add_column(&row.table_name, column);
        }

        Ok(())
    }

    async fn analyze_indexes(&mut self, snapshot: &mut ModuleSnapshot) -> Result<()> {
        let sql = r#"
            SELECT CAST(S.TABLE_NAME AS CHAR) AS table_name,
                   CAST(S.INDEX_NAME AS CHAR) AS index_name,
                   CAST(S.COLUMN_NAME AS CHAR) AS column_name,
                   CAST(S.NULLABLE AS CHAR) AS nullable,
                   CAST(S.INDEX_TYPE AS CHAR) AS index_type,
                   CAST(RC.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table
            FROM information_schema.STATISTICS S
            LEFT JOIN information_schema.REFERENTIAL_CONSTRAINTS RC
                ON RC.CONSTRAINT_SCHEMA = S.TABLE_SCHEMA
                AND RC.TABLE_NAME = S.TABLE_NAME
                AND RC.CONSTRAINT_NAME = S.INDEX_NAME
            WHERE S.TABLE_SCHEMA = ?
            ORDER BY S.TABLE_NAME, S.INDEX_NAME, S.SEQ_IN_INDEX
        "#;

        let rows = sqlx::query_as::<_, IndexRow>(sql)
            .bind(&snapshot.schema_name)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| analysis_error("indexes", &snapshot.module_name, e))?;

        for row in rows {
            let index = LiveIndex {
                name: row.index_name,
                column_name: row.column_name.unwrap_or_default(),
                nullable: row.nullable.map_or(false, |n| n.eq_ignore_ascii_case("YES")),
                index_type: row.index_type,
                referenced_table: row.referenced_table,
            };
            snapshot.add_index(&row.table_name, index);
        }

        Ok(())
    }

    async fn analyze_foreign_keys(&mut self, snapshot: &mut ModuleSnapshot) -> Result<()> {
        let sql = r#"
            SELECT CAST(KCU.CONSTRAINT_NAME AS CHAR) AS constraint_name,
                   CAST(KCU.TABLE_NAME AS CHAR) AS table_name,
                   CAST(KCU.COLUMN_NAME AS CHAR) AS column_name,
                   CAST(KCU.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table
            FROM information_schema.REFERENTIAL_CONSTRAINTS RC
            INNER JOIN information_schema.KEY_COLUMN_USAGE KCU
                ON RC.CONSTRAINT_SCHEMA = KCU.CONSTRAINT_SCHEMA
                AND RC.TABLE_NAME = KCU.TABLE_NAME
                AND RC.CONSTRAINT_NAME = KCU.CONSTRAINT_NAME
            WHERE KCU.TABLE_SCHEMA = ?
            ORDER BY KCU.TABLE_NAME, KCU.CONSTRAINT_NAME, KCU.ORDINAL_POSITION
        "#;

        let rows = sqlx::query_as::<_, ForeignKeyRow>(sql)
            .bind(&snapshot.schema_name)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| analysis_error("foreign keys", &snapshot.module_name, e))?;

        for row in rows {
            let table_name = row.table_name.clone();
            snapshot.add_foreign_key(
                &table_name,
                LiveForeignKey {
                    constraint_name: row.constraint_name,
                    table_name: row.table_name,
                    column_name: row.column_name,
                    referenced_table: row.referenced_table,
                },
            );
        }

        Ok(())
    }

    async fn storage_engines(&mut self) -> Result<Vec<StorageEngine>> {
        let sql = r#"
            SELECT CAST(ENGINE AS CHAR) AS engine,
                   CAST(SUPPORT AS CHAR) AS support
            FROM information_schema.ENGINES
        "#;

        sqlx::query_as::<_, StorageEngine>(sql)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| Error::IntegrityError(format!("Could not check database engine: {}", e)))
    }
}

fn analysis_error(what: &str, module_name: &str, err: sqlx::Error) -> Error {
    Error::SchemaAnalysisError(format!(
        "Could not read {} for module '{}': {}",
        what, module_name, err
    ))
}

/// Snapshot every module in registry order, using each module's open transaction
pub async fn snapshot(registry: &mut ModuleRegistry) -> Result<SchemaSnapshot> {
    let mut snapshot = SchemaSnapshot::new();

    for module in registry.modules_mut() {
        let module_name = module.module_name.clone();
        let schema_name = module.schema_name.clone();

        let mut analyzer = MySqlAnalyzer::new(module.connection()?);
        let module_snapshot = analyzer.analyze_module(&module_name, &schema_name).await?;

        tracing::info!(
            module = %module_name,
            schema = %schema_name,
            tables = module_snapshot.tables.len(),
            "Schema snapshot taken"
        );

        snapshot.add_module(module_snapshot);
    }

    Ok(snapshot)
}
