//! Database connection handling
//!
//! One connection (and one transaction) per configured module, held for the
//! whole sync run.

use indexmap::IndexMap;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::{MySql, MySqlConnection, MySqlPool, Transaction};
use std::collections::BTreeSet;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::model::DataModel;
use crate::schema::analyzer::{verify_storage_engines, Analyzer, MySqlAnalyzer};

/// Fail before any I/O if an entity names a module the config does not declare
pub fn check_module_references(model: &DataModel, config: &DatabaseConfig) -> Result<()> {
    let missing: BTreeSet<&str> = model
        .entities
        .values()
        .map(|entity| entity.module.as_str())
        .filter(|module| config.module(module).is_none())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(Error::IntegrityError(format!(
        "The data model references module(s) that are not configured: {}",
        missing.into_iter().collect::<Vec<_>>().join(", ")
    )))
}

/// A live connection to one module's schema
pub struct ModuleConnection {
    pub module_name: String,
    pub schema_name: String,
    pool: MySqlPool,
    transaction: Option<Transaction<'static, MySql>>,
}

impl ModuleConnection {
    /// Connect to a module's schema with a single-connection pool
    pub async fn connect(config: &DatabaseConfig, module_name: &str, schema_name: &str) -> Result<Self> {
        let ssl_mode = if config.ssl {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Preferred
        };

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(schema_name)
            .ssl_mode(ssl_mode);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|source| Error::ConnectionError {
                module: module_name.to_string(),
                source,
            })?;

        tracing::info!(module = %module_name, schema = %schema_name, "Connected to module");

        Ok(Self {
            module_name: module_name.to_string(),
            schema_name: schema_name.to_string(),
            pool,
            transaction: None,
        })
    }

    /// Open the run's transaction and disable foreign key checks on it
    pub async fn begin(&mut self) -> Result<()> {
        let mut transaction = self.pool.begin().await?;

        sqlx::query("SET FOREIGN_KEY_CHECKS = 0")
            .execute(&mut *transaction)
            .await
            .map_err(|e| {
                Error::IntegrityError(format!(
                    "Could not disable FK checks for '{}': {}",
                    self.module_name, e
                ))
            })?;

        self.transaction = Some(transaction);
        Ok(())
    }

    /// The connection behind the open transaction
    pub fn connection(&mut self) -> Result<&mut MySqlConnection> {
        match self.transaction.as_mut() {
            Some(transaction) => Ok(&mut **transaction),
            None => Err(Error::IntegrityError(format!(
                "No open transaction for module '{}'",
                self.module_name
            ))),
        }
    }

    /// Run one statement inside the module's transaction
    pub async fn execute(&mut self, sql: &str) -> Result<()> {
        let module_name = self.module_name.clone();
        let conn = self.connection()?;

        sqlx::query(sql)
            .execute(conn)
            .await
            .map_err(|e| Error::ddl(module_name, sql, e))?;

        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        if let Some(transaction) = self.transaction.take() {
            transaction.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        if let Some(transaction) = self.transaction.take() {
            transaction.rollback().await?;
        }
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Every module connection of a run, in configuration order
#[derive(Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, ModuleConnection>,
}

impl ModuleRegistry {
    /// Open one connection per configured module, whether or not any entity uses it
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut registry = Self::default();

        for module in &config.modules {
            match ModuleConnection::connect(config, &module.module_name, &module.schema_name).await {
                Ok(connection) => {
                    registry.modules.insert(module.module_name.clone(), connection);
                }
                Err(e) => {
                    registry.close().await;
                    return Err(e);
                }
            }
        }

        Ok(registry)
    }

    /// Verify each module's server defaults to InnoDB. Runs before any transaction opens.
    pub async fn check_storage_engines(&mut self) -> Result<()> {
        for module in self.modules.values_mut() {
            let mut conn = module.pool.acquire().await?;
            let engines = MySqlAnalyzer::new(&mut *conn).storage_engines().await?;
            verify_storage_engines(&module.module_name, &engines)?;
        }

        tracing::info!("Data model integrity check succeeded");
        Ok(())
    }

    pub async fn begin_all(&mut self) -> Result<()> {
        for module in self.modules.values_mut() {
            module.begin().await?;
        }
        Ok(())
    }

    pub async fn commit_all(&mut self) -> Result<()> {
        for module in self.modules.values_mut() {
            module.commit().await?;
        }
        Ok(())
    }

    /// Roll back every open transaction. Failures are logged since the run is
    /// already failing.
    pub async fn rollback_all(&mut self) {
        for module in self.modules.values_mut() {
            if let Err(e) = module.rollback().await {
                tracing::error!(module = %module.module_name, error = %e, "Rollback failed");
            }
        }
    }

    pub async fn close(self) {
        for (_, module) in self.modules {
            module.close().await;
        }
    }

    pub fn module_mut(&mut self, module_name: &str) -> Option<&mut ModuleConnection> {
        self.modules.get_mut(module_name)
    }

    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut ModuleConnection> {
        self.modules.values_mut()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
