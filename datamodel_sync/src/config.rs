//! Configuration handling for datamodel_sync

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::DataModel;

pub use crate::utils::naming::CaseImplementation;

pub const DEFAULT_CONFIG_PATH: &str = "dx.toml";
pub const DEFAULT_DATA_MODEL_PATH: &str = "divblox/configs/datamodel.json";

/// Prefix of the environment variables that override connection settings
const ENV_PREFIX: &str = "DX_DATABASE_";

/// Load configuration from a TOML file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    let mut config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

    config.database.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;

    Ok(config)
}

/// Represents the complete datamodel_sync configuration file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub dx: DxConfig,
    pub database: DatabaseConfig,
    pub hooks: Option<HooksConfig>,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.database.validate()
    }
}

/// Engine behaviour settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DxConfig {
    #[serde(default)]
    pub database_case_implementation: CaseImplementation,
    #[serde(default = "default_data_model_path")]
    pub data_model_path: PathBuf,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for DxConfig {
    fn default() -> Self {
        Self {
            database_case_implementation: CaseImplementation::default(),
            data_model_path: default_data_model_path(),
            dry_run: false,
        }
    }
}

fn default_data_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_MODEL_PATH)
}

/// Database server connection configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    pub modules: Vec<ModuleConfig>,
}

fn default_port() -> u16 {
    3306
}

impl DatabaseConfig {
    /// Replace connection settings with `DX_DATABASE_*` values when present
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(&format!("{}HOST", ENV_PREFIX)) {
            self.host = host;
        }
        if let Some(user) = lookup(&format!("{}USER", ENV_PREFIX)) {
            self.user = user;
        }
        if let Some(password) = lookup(&format!("{}PASSWORD", ENV_PREFIX)) {
            self.password = password;
        }
        if let Some(port) = lookup(&format!("{}PORT", ENV_PREFIX)) {
            self.port = port.parse().map_err(|_| {
                Error::ConfigError(format!("{}PORT must be a port number, got '{}'", ENV_PREFIX, port))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::ConfigError("database.host is required".into()));
        }
        if self.user.is_empty() {
            return Err(Error::ConfigError("database.user is required".into()));
        }
        if self.modules.is_empty() {
            return Err(Error::ConfigError(
                "database.modules must declare at least one module".into(),
            ));
        }

        let mut seen = HashSet::new();
        for module in &self.modules {
            if module.module_name.is_empty() || module.schema_name.is_empty() {
                return Err(Error::ConfigError(
                    "every module needs a module_name and a schema_name".into(),
                ));
            }
            if !seen.insert(module.module_name.as_str()) {
                return Err(Error::ConfigError(format!(
                    "module '{}' is declared more than once",
                    module.module_name
                )));
            }
        }

        Ok(())
    }

    pub fn module(&self, module_name: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.module_name == module_name)
    }
}

/// One database module: a named group of entities living in one schema
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub module_name: String,
    pub schema_name: String,
}

/// Hooks configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HooksConfig {
    #[serde(default)]
    pub after_sync: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

/// Everything a sync run needs: the typed form of `{dxConfig, dataModel, databaseConfig}`
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub dx_config: DxConfig,
    pub data_model: DataModel,
    pub database_config: DatabaseConfig,
    pub hooks: HooksConfig,
}

impl SyncOptions {
    /// Load the config file and the data model it points to.
    ///
    /// A relative `data_model_path` is resolved against the config file's directory.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let config = load_from_file(config_path)?;
        Self::from_config(config, config_path)
    }

    /// Build options from an already loaded config file found at `config_path`
    pub fn from_config(config: Config, config_path: &Path) -> Result<Self> {
        let data_model_path = if config.dx.data_model_path.is_absolute() {
            config.dx.data_model_path.clone()
        } else {
            config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&config.dx.data_model_path)
        };

        let data_model = DataModel::load_from_file(&data_model_path)?;

        Ok(Self::new(config, data_model))
    }

    pub fn new(config: Config, data_model: DataModel) -> Self {
        Self {
            dx_config: config.dx,
            data_model,
            database_config: config.database,
            hooks: config.hooks.unwrap_or_default(),
        }
    }

    pub fn case_implementation(&self) -> CaseImplementation {
        self.dx_config.database_case_implementation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::tempdir;

    const CONFIG: &str = r#"
        [dx]
        database_case_implementation = "pascalcase"
        data_model_path = "datamodel.json"

        [database]
        host = "localhost"
        user = "root"
        password = "secret"
        port = 3307
        ssl = false
        modules = [
            { module_name = "main", schema_name = "dev_schema_name" },
            { module_name = "other", schema_name = "dev_schema_name_2" },
        ]

        [hooks]
        after_sync = ["echo synced"]
    "#;

    #[test]
    fn test_config_parsing() {
        let config: Config = toml::from_str(CONFIG).unwrap();

        assert_eq!(config.dx.database_case_implementation, CaseImplementation::PascalCase);
        assert_eq!(config.database.port, 3307);
        assert_eq!(config.database.modules.len(), 2);
        assert_eq!(
            config.database.module("other").map(|m| m.schema_name.as_str()),
            Some("dev_schema_name_2")
        );
        assert_eq!(config.hooks.unwrap().after_sync, vec!["echo synced".to_string()]);
        assert!(!config.dx.dry_run);
    }

    #[test]
    fn test_dx_section_defaults() {
        let config: Config = toml::from_str(
            r#"
            [database]
            host = "localhost"
            user = "root"
            modules = [{ module_name = "main", schema_name = "main_db" }]
            "#,
        )
        .unwrap();

        assert_eq!(config.dx.database_case_implementation, CaseImplementation::SnakeCase);
        assert_eq!(config.dx.data_model_path, PathBuf::from(DEFAULT_DATA_MODEL_PATH));
        assert_eq!(config.database.port, 3306);
        assert_eq!(config.database.password, "");
    }

    #[test]
    fn test_invalid_case_implementation_is_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str(
            r#"
            [dx]
            database_case_implementation = "kebabcase"

            [database]
            host = "localhost"
            user = "root"
            modules = [{ module_name = "main", schema_name = "main_db" }]
            "#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_modules_are_rejected() {
        let mut config: Config = toml::from_str(CONFIG).unwrap();
        config.database.modules[1].module_name = "main".to_string();

        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_missing_modules_are_rejected() {
        let mut config: Config = toml::from_str(CONFIG).unwrap();
        config.database.modules.clear();

        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config: Config = toml::from_str(CONFIG).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("DX_DATABASE_HOST", "db.internal"),
            ("DX_DATABASE_PASSWORD", "rotated"),
            ("DX_DATABASE_PORT", "3310"),
        ]);

        config
            .database
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.user, "root");
        assert_eq!(config.database.password, "rotated");
        assert_eq!(config.database.port, 3310);
    }

    #[test]
    fn test_env_override_rejects_bad_port() {
        let mut config: Config = toml::from_str(CONFIG).unwrap();
        let result = config
            .database
            .apply_env_overrides(|key| (key == "DX_DATABASE_PORT").then(|| "not-a-port".to_string()));

        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_sync_options_load_resolves_data_model_next_to_config() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("dx.toml"), CONFIG).unwrap();
        std::fs::write(
            dir.path().join("datamodel.json"),
            r#"{
                "organisation": {
                    "module": "main",
                    "attributes": {
                        "name": { "type": "varchar", "lengthOrValues": 255, "default": null, "allowNull": true }
                    }
                }
            }"#,
        )
        .unwrap();

        let options = SyncOptions::load(dir.path().join("dx.toml")).unwrap();

        assert_eq!(options.case_implementation(), CaseImplementation::PascalCase);
        assert_eq!(options.data_model.entities.len(), 1);
        assert!(options.data_model.entities.contains_key("organisation"));
        assert_eq!(options.hooks.after_sync.len(), 1);
    }
}
