//! YAML persistence shared by the warehouse catalog and the profile store.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;

/// Errors from catalog and profile persistence
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Source file not found: {0}")]
    SourceNotFound(Utf8PathBuf),

    #[error("Invalid target path: {0}")]
    InvalidTarget(String),

    #[error("Profile {0} not found")]
    ProfileNotFound(String),

    #[error("Cannot delete the active profile {0}")]
    ActiveProfile(String),
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: &Utf8Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_owned();
        move |source| StoreError::Io { action, path, source }
    }
}

pub(crate) async fn read_yaml<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(StoreError::io("read", path))?;
    serde_yaml_ng::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Serialize to YAML and write through a sibling temp file.
pub(crate) async fn write_yaml<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), StoreError> {
    let yaml = serde_yaml_ng::to_string(value).map_err(|source| StoreError::Serialize {
        path: path.to_owned(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(StoreError::io("create directory", parent))?;
    }

    let temp_path = path.with_extension("yaml.tmp");
    fs::write(&temp_path, yaml)
        .await
        .map_err(StoreError::io("write", &temp_path))?;
    fs::rename(&temp_path, path)
        .await
        .map_err(StoreError::io("finalize", path))?;
    Ok(())
}
