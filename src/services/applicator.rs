use super::backup_registry::{BackupRegistry, RegistryError};
use super::lst::LstDocument;
use super::path_resolver::{PathResolver, normalize_relative};
use super::progress::{LogProgress, ProgressSink};
use super::warehouse::Warehouse;
use crate::metrics::Metrics;
use crate::models::{FileModification, WarehouseFile, is_lst_name};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::fs;

/// Errors from applying or reverting a single modification
#[derive(Error, Debug)]
pub enum ModificationError {
    #[error("Warehouse file {0} not found")]
    WarehouseFileNotFound(String),

    #[error("Warehouse file missing from storage: {0}")]
    SourceMissing(Utf8PathBuf),

    #[error("Invalid target path: {0}")]
    InvalidTargetPath(String),

    #[error("List file {0} can only be restored as a set, not reverted individually")]
    LstRevertRefused(String),

    #[error("Nothing to revert at {0}")]
    NothingToRevert(String),

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ModificationError {
    fn io(action: &'static str, path: &Utf8Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_owned();
        move |source| ModificationError::Io { action, path, source }
    }
}

/// What a successful apply did to the live installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Plain overwrite, with the per-file backup taken beforehand if any
    Copied { backup: Option<Utf8PathBuf> },

    /// Merged into an existing list file
    LstMerged { missions_added: usize },

    /// List file copied in because no live one existed
    LstCopied,
}

/// What a successful revert did to the live installation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    RestoredBackup,
    Deleted,
}

/// Applies and reverts single file modifications against the live game directory.
///
/// Regular files are overwritten, optionally after a timestamped per-file
/// backup. List files are merged structurally, after their pristine content
/// has been captured in the [`BackupRegistry`]; they are never reverted one at
/// a time, only restored as a set with [`restore_all_base`](Self::restore_all_base).
///
/// All I/O is awaited sequentially. One engine instance is expected per game
/// installation.
pub struct ModApplicator {
    resolver: PathResolver,
    backup_root: Utf8PathBuf,
    warehouse: Arc<dyn Warehouse>,
    registry: BackupRegistry,
    progress: Arc<dyn ProgressSink>,
    metrics: Arc<Metrics>,

    /// Matches the `{yyyyMMdd_HHmmss}_{file_name}` tail of a per-file backup name
    backup_name_pattern: Regex,
}

impl ModApplicator {
    /// Create an engine for the game at `game_root`, keeping backups under `backup_root`.
    pub async fn new(
        game_root: &Utf8Path,
        backup_root: &Utf8Path,
        warehouse: Arc<dyn Warehouse>,
    ) -> Result<Self, ModificationError> {
        fs::create_dir_all(backup_root)
            .await
            .map_err(ModificationError::io("create directory", backup_root))?;
        let registry = BackupRegistry::open(backup_root, game_root).await?;

        Ok(Self {
            resolver: PathResolver::new(game_root),
            backup_root: backup_root.to_owned(),
            warehouse,
            registry,
            progress: Arc::new(LogProgress),
            metrics: Arc::new(Metrics::new()),
            backup_name_pattern: Regex::new(r"^\d{8}_\d{6}_.+$").expect("Invalid backup name regex"),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn game_root(&self) -> &Utf8Path {
        self.resolver.root()
    }

    pub fn backup_root(&self) -> &Utf8Path {
        &self.backup_root
    }

    pub fn registry(&self) -> &BackupRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BackupRegistry {
        &mut self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn progress(&self) -> &dyn ProgressSink {
        self.progress.as_ref()
    }

    /// Resolve the live path of a modification's target.
    pub async fn target_path(&self, modification: &FileModification) -> Result<Utf8PathBuf, ModificationError> {
        let relative = normalized_target(modification)?;
        Ok(self.resolver.resolve(&relative).await)
    }

    /// Whether a modification targets a list file.
    ///
    /// Decided by the warehouse file's original name; when the warehouse entry
    /// is gone, the target path's extension decides instead.
    pub fn is_lst_modification(&self, modification: &FileModification) -> bool {
        match self.warehouse.get_file(&modification.warehouse_file_id) {
            Some(file) => file.is_lst(),
            None => is_lst_name(&modification.relative_game_path),
        }
    }

    /// Apply a modification, reporting any failure instead of returning it.
    pub async fn apply(&mut self, modification: &mut FileModification, create_backup: bool) -> bool {
        match self.try_apply(modification, create_backup).await {
            Ok(outcome) => {
                let message = match &outcome {
                    ApplyOutcome::Copied { backup: Some(backup) } => {
                        format!("Applied {} (backup {})", modification.relative_game_path, backup)
                    }
                    ApplyOutcome::Copied { backup: None } => {
                        format!("Applied {}", modification.relative_game_path)
                    }
                    ApplyOutcome::LstMerged { missions_added } => format!(
                        "Merged {} missions into {}",
                        missions_added, modification.relative_game_path
                    ),
                    ApplyOutcome::LstCopied => {
                        format!("Copied new list file {}", modification.relative_game_path)
                    }
                };
                self.progress.on_progress(&message);
                self.metrics.record_applied();
                true
            }
            Err(e) => {
                tracing::error!("Failed to apply {}: {}", modification.relative_game_path, e);
                self.progress
                    .on_progress(&format!("Error applying {}: {}", modification.relative_game_path, e));
                self.metrics.record_failed();
                false
            }
        }
    }

    /// Apply a modification and return what happened or why it failed.
    pub async fn try_apply(
        &mut self,
        modification: &mut FileModification,
        create_backup: bool,
    ) -> Result<ApplyOutcome, ModificationError> {
        let relative = normalized_target(modification)?;
        let file = self.lookup(modification)?;
        let source = Utf8PathBuf::from(&file.storage_path);
        if !is_file(&source).await {
            return Err(ModificationError::SourceMissing(source));
        }

        let target = self.resolver.resolve(&relative).await;
        ensure_parent(&target).await?;

        let outcome = if file.is_lst() {
            self.apply_lst(&relative, &source, &target).await?
        } else {
            let backup = if create_backup && is_file(&target).await {
                let backup = self.create_file_backup(&target, &modification.id).await?;
                modification.backup_path = Some(backup.to_string());
                Some(backup)
            } else {
                None
            };

            fs::copy(&source, &target)
                .await
                .map_err(ModificationError::io("copy over", &target))?;
            tracing::debug!("Copied {} -> {}", source, target);
            ApplyOutcome::Copied { backup }
        };

        modification.is_applied = true;
        Ok(outcome)
    }

    async fn apply_lst(
        &mut self,
        relative: &str,
        source: &Utf8Path,
        target: &Utf8Path,
    ) -> Result<ApplyOutcome, ModificationError> {
        let already_captured = self.registry.contains(relative);
        if self.registry.ensure_base_backup(relative).await? && !already_captured {
            self.metrics.record_base_capture();
            self.progress
                .on_progress(&format!("Backed up base list file {relative}"));
        }

        if !is_file(target).await {
            fs::copy(source, target)
                .await
                .map_err(ModificationError::io("copy list file to", target))?;
            return Ok(ApplyOutcome::LstCopied);
        }

        let live_bytes = fs::read(target)
            .await
            .map_err(ModificationError::io("read", target))?;
        let incoming_bytes = fs::read(source)
            .await
            .map_err(ModificationError::io("read", source))?;

        let mut live = LstDocument::from_bytes(&live_bytes);
        let incoming = LstDocument::from_bytes(&incoming_bytes);
        let missions_added = live.merge_from(&incoming);

        fs::write(target, live.to_bytes())
            .await
            .map_err(ModificationError::io("write merged list file", target))?;

        self.metrics.record_missions_merged(missions_added);
        tracing::debug!("Merged {} missions into {}", missions_added, target);
        Ok(ApplyOutcome::LstMerged { missions_added })
    }

    /// Revert a regular-file modification, reporting any failure instead of returning it.
    pub async fn revert(&self, modification: &mut FileModification) -> bool {
        match self.try_revert(modification).await {
            Ok(outcome) => {
                let verb = match outcome {
                    RevertOutcome::RestoredBackup => "Restored",
                    RevertOutcome::Deleted => "Removed",
                };
                self.progress
                    .on_progress(&format!("{verb} {}", modification.relative_game_path));
                self.metrics.record_reverted();
                true
            }
            Err(e @ ModificationError::LstRevertRefused(_)) => {
                tracing::warn!("{}", e);
                self.progress.on_progress(&e.to_string());
                self.metrics.record_failed();
                false
            }
            Err(e) => {
                tracing::error!("Failed to revert {}: {}", modification.relative_game_path, e);
                self.progress
                    .on_progress(&format!("Error reverting {}: {}", modification.relative_game_path, e));
                self.metrics.record_failed();
                false
            }
        }
    }

    /// Revert a regular-file modification and return what happened or why it failed.
    ///
    /// Restores the recorded per-file backup when it still exists; otherwise
    /// deletes the target, since nothing was there before. When neither the
    /// backup nor the target exists the modification is marked unapplied and
    /// [`ModificationError::NothingToRevert`] is returned.
    pub async fn try_revert(&self, modification: &mut FileModification) -> Result<RevertOutcome, ModificationError> {
        let relative = normalized_target(modification)?;
        if self.is_lst_modification(modification) {
            return Err(ModificationError::LstRevertRefused(relative));
        }

        let target = self.resolver.resolve(&relative).await;

        if let Some(backup) = modification.backup_path.as_deref().map(Utf8PathBuf::from) {
            if is_file(&backup).await {
                ensure_parent(&target).await?;
                fs::copy(&backup, &target)
                    .await
                    .map_err(ModificationError::io("restore", &target))?;
                modification.is_applied = false;
                return Ok(RevertOutcome::RestoredBackup);
            }
            tracing::warn!("Recorded backup {} for {} is missing", backup, relative);
        }

        if is_file(&target).await {
            fs::remove_file(&target)
                .await
                .map_err(ModificationError::io("delete", &target))?;
            modification.is_applied = false;
            return Ok(RevertOutcome::Deleted);
        }

        modification.is_applied = false;
        Err(ModificationError::NothingToRevert(relative))
    }

    /// Return every captured list file to its pristine content.
    pub async fn restore_all_base(&self) -> usize {
        self.progress
            .on_progress("Restoring base list files to a clean state");
        let restored = self.registry.restore_all().await;
        self.metrics.record_base_restores(restored);
        self.progress
            .on_progress(&format!("Restored {restored} base list file(s)"));
        restored
    }

    /// Check that the live target matches its warehouse source.
    ///
    /// Regular files must be byte-identical. A list file passes when every
    /// mission of the warehouse copy is present in the live file. Never errors:
    /// anything missing or unreadable is simply `false`.
    pub async fn verify(&self, modification: &FileModification) -> bool {
        let Some(file) = self.warehouse.get_file(&modification.warehouse_file_id) else {
            return false;
        };
        let Ok(target) = self.target_path(modification).await else {
            return false;
        };

        let (Ok(source_bytes), Ok(target_bytes)) =
            (fs::read(&file.storage_path).await, fs::read(&target).await)
        else {
            return false;
        };

        if file.is_lst() {
            let live = LstDocument::from_bytes(&target_bytes);
            LstDocument::from_bytes(&source_bytes)
                .filename_set()
                .is_subset(&live.filename_set())
        } else {
            source_bytes == target_bytes
        }
    }

    /// Per-file backups of a modification, newest first.
    pub async fn list_backups(&self, modification_id: &str) -> Result<Vec<Utf8PathBuf>, ModificationError> {
        let mut entries = fs::read_dir(&self.backup_root)
            .await
            .map_err(ModificationError::io("list", &self.backup_root))?;

        let mut backups: Vec<(SystemTime, String, Utf8PathBuf)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(ModificationError::io("list", &self.backup_root))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let is_ours = name
                .strip_prefix(modification_id)
                .and_then(|rest| rest.strip_prefix('_'))
                .is_some_and(|rest| self.backup_name_pattern.is_match(rest));
            if !is_ours {
                continue;
            }

            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let stamp = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            backups.push((stamp, name.clone(), self.backup_root.join(name)));
        }

        backups.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(backups.into_iter().map(|(_, _, path)| path).collect())
    }

    /// Delete all but the newest `max_versions` per-file backups of a modification.
    ///
    /// Returns how many backups were deleted.
    pub async fn cleanup_old_backups(
        &self,
        modification_id: &str,
        max_versions: usize,
    ) -> Result<usize, ModificationError> {
        let backups = self.list_backups(modification_id).await?;
        let mut deleted = 0;

        for path in backups.iter().skip(max_versions) {
            fs::remove_file(path)
                .await
                .map_err(ModificationError::io("delete", path))?;
            deleted += 1;
        }

        if deleted > 0 {
            tracing::info!(
                "Deleted {} old backups of modification {}",
                deleted,
                modification_id
            );
        }
        Ok(deleted)
    }

    fn lookup(&self, modification: &FileModification) -> Result<WarehouseFile, ModificationError> {
        self.warehouse
            .get_file(&modification.warehouse_file_id)
            .ok_or_else(|| ModificationError::WarehouseFileNotFound(modification.warehouse_file_id.clone()))
    }

    async fn create_file_backup(
        &self,
        target: &Utf8Path,
        modification_id: &str,
    ) -> Result<Utf8PathBuf, ModificationError> {
        let file_name = target.file_name().unwrap_or("file");
        let backup = self
            .backup_root
            .join(backup_file_name(modification_id, file_name, local_now()));

        fs::copy(target, &backup)
            .await
            .map_err(ModificationError::io("back up", target))?;
        self.metrics.record_file_backup();
        tracing::debug!("Backed up {} to {}", target, backup);
        Ok(backup)
    }
}

/// `{modification_id}_{yyyyMMdd_HHmmss}_{file_name}`
pub fn backup_file_name(modification_id: &str, file_name: &str, at: OffsetDateTime) -> String {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = at
        .format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    format!("{modification_id}_{stamp}_{file_name}")
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn normalized_target(modification: &FileModification) -> Result<String, ModificationError> {
    normalize_relative(&modification.relative_game_path)
        .ok_or_else(|| ModificationError::InvalidTargetPath(modification.relative_game_path.clone()))
}

async fn is_file(path: &Utf8Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn ensure_parent(path: &Utf8Path) -> Result<(), ModificationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(ModificationError::io("create directory", parent))?;
    }
    Ok(())
}
