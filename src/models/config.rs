use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Application configuration from `Hydrospanner Config.yaml`
///
/// Every field has a default so a missing or partial file still loads.
/// Empty storage paths are filled in by
/// [`ConfigManager::load_config`](crate::config::ConfigManager::load_config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the X-Wing vs. TIE Fighter installation
    pub game_install_path: String,

    /// Directory holding warehouse files and `catalog.yaml`
    pub warehouse_path: String,

    /// Directory holding one YAML file per profile
    pub profiles_path: String,

    /// Root for per-file backups and the base LST store
    pub backup_path: String,

    pub active_profile_id: Option<String>,

    /// Take per-file backups before overwriting
    pub auto_backup: bool,

    pub confirm_before_apply: bool,

    /// Per-file backup versions kept per modification
    pub max_backup_versions: u32,

    pub debug_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game_install_path: String::new(),
            warehouse_path: String::new(),
            profiles_path: String::new(),
            backup_path: String::new(),
            active_profile_id: None,
            auto_backup: true,
            confirm_before_apply: true,
            max_backup_versions: default_max_backup_versions(),
            debug_mode: false,
        }
    }
}

fn default_max_backup_versions() -> u32 {
    5
}

impl AppConfig {
    pub fn game_root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.game_install_path)
    }

    pub fn warehouse_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.warehouse_path)
    }

    pub fn profiles_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.profiles_path)
    }

    pub fn backup_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.backup_path)
    }

    /// Collect every configuration problem; an empty list means usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.game_install_path.trim().is_empty() {
            errors.push("Game install path is not set".to_string());
        } else if !self.game_root().is_dir() {
            errors.push(format!(
                "Game install path does not exist: {}",
                self.game_install_path
            ));
        }

        if self.warehouse_path.trim().is_empty() {
            errors.push("Warehouse path is not set".to_string());
        }
        if self.profiles_path.trim().is_empty() {
            errors.push("Profiles path is not set".to_string());
        }
        if self.backup_path.trim().is_empty() {
            errors.push("Backup path is not set".to_string());
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
