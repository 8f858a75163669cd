use super::path_resolver::{PathResolver, normalize_relative};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::fs;

/// Directory under the backup root holding pristine list-file captures.
pub const BASE_STORE_DIR: &str = "BaseLstFiles";

/// Registry file inside [`BASE_STORE_DIR`]: one relative path per line, sorted.
pub const REGISTRY_FILE: &str = "registry.txt";

/// Errors from the base-backup registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid relative path: {0}")]
    InvalidPath(String),

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    fn io(action: &'static str, path: &Utf8Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_owned();
        move |source| RegistryError::Io { action, path, source }
    }
}

/// Durable record of which list files have had their pristine content captured.
///
/// A path is registered only after its capture is on disk, and the registry
/// file is rewritten after every registration. Membership is case-insensitive;
/// the spelling seen first is the one stored and mirrored under the store.
///
/// Entries are never dropped by [`restore`](Self::restore) or
/// [`restore_all`](Self::restore_all). Only [`release`](Self::release) forgets a
/// capture.
#[derive(Debug)]
pub struct BackupRegistry {
    store_root: Utf8PathBuf,
    registry_path: Utf8PathBuf,
    resolver: PathResolver,

    /// Lowercased path -> stored spelling
    entries: BTreeMap<String, String>,
}

impl BackupRegistry {
    /// Open (or create) the registry under `backup_root` for the game at `game_root`.
    pub async fn open(backup_root: &Utf8Path, game_root: &Utf8Path) -> Result<Self, RegistryError> {
        let store_root = backup_root.join(BASE_STORE_DIR);
        fs::create_dir_all(&store_root)
            .await
            .map_err(RegistryError::io("create directory", &store_root))?;

        let registry_path = store_root.join(REGISTRY_FILE);
        let mut entries = BTreeMap::new();

        if fs::try_exists(&registry_path).await.unwrap_or(false) {
            let content = fs::read_to_string(&registry_path)
                .await
                .map_err(RegistryError::io("read", &registry_path))?;

            for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                match normalize_relative(line) {
                    Some(path) => {
                        entries.entry(path.to_lowercase()).or_insert(path);
                    }
                    None => tracing::warn!("Ignoring invalid registry entry: {}", line),
                }
            }
        }

        tracing::debug!(
            "Opened base backup registry at {} ({} entries)",
            registry_path,
            entries.len()
        );

        Ok(Self {
            store_root,
            registry_path,
            resolver: PathResolver::new(game_root),
            entries,
        })
    }

    pub fn store_root(&self) -> &Utf8Path {
        &self.store_root
    }

    pub fn registry_path(&self) -> &Utf8Path {
        &self.registry_path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        normalize_relative(relative_path)
            .is_some_and(|p| self.entries.contains_key(&p.to_lowercase()))
    }

    /// Registered paths in stored spelling, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.values().cloned().collect();
        paths.sort();
        paths
    }

    /// Where the pristine capture of `relative_path` lives (or would live).
    pub fn backup_path_for(&self, relative_path: &str) -> Result<Utf8PathBuf, RegistryError> {
        let stored = self.stored_spelling(relative_path)?;
        Ok(self.store_path(&stored))
    }

    /// Capture the pristine content of a live list file the first time it is touched.
    ///
    /// Returns `Ok(true)` when the path is (now) registered and `Ok(false)` when
    /// the live file does not exist, in which case nothing is registered. A
    /// capture left on disk by an interrupted earlier run is adopted as is.
    pub async fn ensure_base_backup(&mut self, relative_path: &str) -> Result<bool, RegistryError> {
        let normalized = normalize_relative(relative_path)
            .ok_or_else(|| RegistryError::InvalidPath(relative_path.to_string()))?;
        let key = normalized.to_lowercase();

        if self.entries.contains_key(&key) {
            return Ok(true);
        }

        let live_path = self.resolver.resolve(&normalized).await;
        if !is_file(&live_path).await {
            tracing::debug!("No live file to capture for {}", normalized);
            return Ok(false);
        }

        let backup_path = self.store_path(&normalized);
        if is_file(&backup_path).await {
            tracing::info!("Adopting existing base capture for {}", normalized);
        } else {
            copy_atomic(&live_path, &backup_path).await?;
            tracing::info!("Captured base list file: {}", normalized);
        }

        self.entries.insert(key, normalized);
        self.save().await?;
        Ok(true)
    }

    /// Copy the pristine capture back over the live file.
    ///
    /// Returns `Ok(false)` if the path was never captured, or if its capture has
    /// gone missing. The latter is logged as a warning and the entry is kept.
    pub async fn restore(&self, relative_path: &str) -> Result<bool, RegistryError> {
        let Some(stored) = normalize_relative(relative_path)
            .and_then(|p| self.entries.get(&p.to_lowercase()).cloned())
        else {
            return Ok(false);
        };

        let backup_path = self.store_path(&stored);
        if !is_file(&backup_path).await {
            tracing::warn!(
                "Base backup for {} is registered but missing at {}; leaving entry for manual repair",
                stored,
                backup_path
            );
            return Ok(false);
        }

        let live_path = self.resolver.resolve(&stored).await;
        if let Some(parent) = live_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(RegistryError::io("create directory", parent))?;
        }
        fs::copy(&backup_path, &live_path)
            .await
            .map_err(RegistryError::io("restore", &live_path))?;

        tracing::debug!("Restored base list file: {}", stored);
        Ok(true)
    }

    /// Restore every registered path, returning how many were restored.
    ///
    /// Failures are logged and skipped so one bad entry never blocks the rest.
    pub async fn restore_all(&self) -> usize {
        let mut restored = 0;
        for path in self.entries() {
            match self.restore(&path).await {
                Ok(true) => restored += 1,
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to restore base list file {}: {}", path, e),
            }
        }

        tracing::info!("Restored {}/{} base list files", restored, self.entries.len());
        restored
    }

    /// Forget a capture: delete the pristine copy and drop the registry entry.
    ///
    /// Returns `Ok(false)` if the path was not registered.
    pub async fn release(&mut self, relative_path: &str) -> Result<bool, RegistryError> {
        let Some(key) = normalize_relative(relative_path).map(|p| p.to_lowercase()) else {
            return Ok(false);
        };
        let Some(stored) = self.entries.get(&key).cloned() else {
            return Ok(false);
        };

        let backup_path = self.store_path(&stored);
        if is_file(&backup_path).await {
            fs::remove_file(&backup_path)
                .await
                .map_err(RegistryError::io("delete", &backup_path))?;
        }

        self.entries.remove(&key);
        self.save().await?;
        tracing::info!("Released base capture for {}", stored);
        Ok(true)
    }

    /// Registered paths whose pristine capture is no longer on disk.
    pub async fn missing_backups(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for path in self.entries() {
            if !is_file(&self.store_path(&path)).await {
                missing.push(path);
            }
        }
        missing
    }

    fn stored_spelling(&self, relative_path: &str) -> Result<String, RegistryError> {
        let normalized = normalize_relative(relative_path)
            .ok_or_else(|| RegistryError::InvalidPath(relative_path.to_string()))?;
        Ok(self
            .entries
            .get(&normalized.to_lowercase())
            .cloned()
            .unwrap_or(normalized))
    }

    fn store_path(&self, normalized: &str) -> Utf8PathBuf {
        let mut path = self.store_root.clone();
        for component in normalized.split('/') {
            path.push(component);
        }
        path
    }

    async fn save(&self) -> Result<(), RegistryError> {
        let mut content = self.entries().join("\n");
        content.push('\n');
        write_atomic(&self.registry_path, content.as_bytes()).await
    }
}

async fn is_file(path: &Utf8Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

fn temp_path_for(path: &Utf8Path) -> Utf8PathBuf {
    let file_name = path.file_name().unwrap_or("registry");
    path.with_file_name(format!("{file_name}.tmp"))
}

/// Write through a sibling temp file so readers never see a half-written file.
pub(crate) async fn write_atomic(path: &Utf8Path, contents: &[u8]) -> Result<(), RegistryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(RegistryError::io("create directory", parent))?;
    }
    let temp_path = temp_path_for(path);
    fs::write(&temp_path, contents)
        .await
        .map_err(RegistryError::io("write", &temp_path))?;
    fs::rename(&temp_path, path)
        .await
        .map_err(RegistryError::io("finalize", path))?;
    Ok(())
}

async fn copy_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), RegistryError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(RegistryError::io("create directory", parent))?;
    }
    let temp_path = temp_path_for(dest);
    fs::copy(source, &temp_path)
        .await
        .map_err(RegistryError::io("capture", source))?;
    fs::rename(&temp_path, dest)
        .await
        .map_err(RegistryError::io("finalize", dest))?;
    Ok(())
}
