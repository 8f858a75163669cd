use crate::models::AppConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// File name of the application configuration.
pub const CONFIG_FILE_NAME: &str = "Hydrospanner Config.yaml";

/// Prefix of environment variables that override file settings,
/// e.g. `HYDROSPANNER_GAME_INSTALL_PATH`.
pub const ENV_PREFIX: &str = "HYDROSPANNER";

/// Configuration manager for loading and saving `Hydrospanner Config.yaml`.
///
/// Loading layers the YAML file (optional) under `HYDROSPANNER_*` environment
/// variables, then fills empty storage paths with directories next to the
/// configuration file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding the configuration file; created if missing
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            env_prefix: ENV_PREFIX.to_string(),
        })
    }

    /// Use a different environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Load the application configuration.
    ///
    /// # Returns
    /// The layered AppConfig, or defaults if neither the file nor any
    /// environment override exists
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let layered = Config::builder()
            .add_source(File::new(self.config_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(Environment::with_prefix(&self.env_prefix).try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let mut config: AppConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        self.apply_default_paths(&mut config);

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the application configuration.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Fill empty storage paths with `Warehouse`, `Profiles` and `Backups` under the config directory.
    pub fn apply_default_paths(&self, config: &mut AppConfig) {
        let defaults = [
            (&mut config.warehouse_path, "Warehouse"),
            (&mut config.profiles_path, "Profiles"),
            (&mut config.backup_path, "Backups"),
        ];

        for (path, dir_name) in defaults {
            if path.trim().is_empty() {
                *path = self.config_dir.join(dir_name).to_string();
            }
        }
    }
}
