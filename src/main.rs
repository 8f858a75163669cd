//! Hydrospanner - mod overlay engine for X-Wing vs. TIE Fighter
//!
//! Main entry point for the command line application.
//!
//! # Overview
//!
//! This binary crate provides the command line front end for Hydrospanner. It initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime (single thread, the engine awaits its I/O sequentially)
//! - State management ([`StateManager`]) as the engine's progress sink
//! - Configuration loading ([`ConfigManager`])
//! - Warehouse catalog, profile store and the overlay engine
//!
//! # Execution Flow
//!
//! 1. Parse the command line
//! 2. Load `Hydrospanner Config.yaml` (plus `HYDROSPANNER_*` overrides)
//! 3. Initialize logging → `<config dir>/logs/hydrospanner.<date>`
//! 4. Create tokio runtime
//! 5. Run the subcommand; mutated profiles and config are saved before returning
//! 6. Log the metrics summary and shut the runtime down with a 5s timeout
//!
//! # Data Directory
//!
//! Defaults to `Hydrospanner Data/`:
//! - `Hydrospanner Config.yaml`: game path, storage paths and preferences
//! - `Warehouse/`: stored mod files and `catalog.yaml`
//! - `Profiles/`: one YAML file per profile
//! - `Backups/`: per-file backups and `BaseLstFiles/` with `registry.txt`

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use hydrospanner::logging::{LOG_PREFIX, LogFormat, LogOptions};
use hydrospanner::models::{FileModification, ModCategory, is_lst_name};
use hydrospanner::services::{LstDocument, NewWarehouseFile, ProgressSink, Warehouse, merge};
use hydrospanner::{
    APP_NAME, AppConfig, ConfigManager, Metrics, ModApplicator, ModProfile, ProfileOperator, ProfileStore,
    StateChange, StateManager, VERSION, WarehouseCatalog,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Parser)]
#[command(name = "hydrospanner", version, about = "Mod overlay manager for X-Wing vs. TIE Fighter")]
struct Cli {
    /// Directory holding the configuration, warehouse, profiles and backups
    #[arg(long, global = true, env = "HYDROSPANNER_CONFIG_DIR", default_value = "Hydrospanner Data")]
    config_dir: Utf8PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Write the log file as JSON lines
    #[arg(long, global = true)]
    json_log: bool,

    /// Do not ask for confirmation before changing the installation
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List profiles
    Profiles,

    /// Create an empty profile
    NewProfile {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Copy a profile under a new name
    CloneProfile { source: String, name: String },

    /// Delete an inactive profile
    DeleteProfile { profile: String },

    /// Store a file in the warehouse, optionally adding it to a profile
    AddFile {
        source: Utf8PathBuf,

        /// Target path relative to the game root, e.g. `MELEE/m1.tie`
        #[arg(long)]
        target: String,

        #[arg(long, default_value = "")]
        name: String,

        #[arg(long)]
        profile: Option<String>,
    },

    /// List warehouse files
    Warehouse {
        /// Only files whose name, description or tags contain this term
        search: Option<String>,
    },

    /// Apply a profile (the active one by default)
    Apply { profile: Option<String> },

    /// Revert a profile's regular files (the active one by default)
    Revert { profile: Option<String> },

    /// Revert the active profile, restore list files and apply another profile
    Switch { profile: String },

    /// Return the installation to its unmodified state
    RestoreBase,

    /// Restore every captured list file to its pristine content
    RestoreLst,

    /// Check applied modifications against their warehouse files
    Verify { profile: Option<String> },

    /// Delete old per-file backups beyond the configured version count
    CleanupBackups { profile: Option<String> },

    /// Merge one list file into another without touching the installation
    MergeLst {
        base: Utf8PathBuf,
        incoming: Utf8PathBuf,

        /// Write here instead of overwriting `base`
        #[arg(long)]
        output: Option<Utf8PathBuf>,
    },

    /// Show configuration, active profile and base list file captures
    Status,
}

impl Command {
    fn touches_installation(&self) -> bool {
        matches!(
            self,
            Command::Apply { .. }
                | Command::Revert { .. }
                | Command::Switch { .. }
                | Command::RestoreBase
                | Command::RestoreLst
                | Command::Verify { .. }
                | Command::CleanupBackups { .. }
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Loaded before logging so the configured debug mode applies from the start
    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let config = config_manager.load_config()?;

    let log_dir = cli.config_dir.join("logs");
    let _log_guard = hydrospanner::logging::setup_logging_with_console(&LogOptions {
        log_dir: &log_dir,
        log_prefix: LOG_PREFIX,
        debug_mode: cli.debug || config.debug_mode,
        console_output: true,
        format: if cli.json_log { LogFormat::Json } else { LogFormat::Text },
    })?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Using configuration {}", config_manager.config_path());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("hydrospanner-worker")
        .build()?;

    let metrics = Arc::new(Metrics::new());
    let result = runtime.block_on(run(cli, config_manager, config, Arc::clone(&metrics)));

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Shutdown complete");

    result.inspect_err(|e| tracing::error!("{:#}", e))
}

async fn run(cli: Cli, config_manager: ConfigManager, config: AppConfig, metrics: Arc<Metrics>) -> Result<()> {
    if cli.command.touches_installation() {
        let problems = config.validate();
        if !problems.is_empty() {
            bail!(
                "Configuration in {} is not usable:\n  {}",
                config_manager.config_path(),
                problems.join("\n  ")
            );
        }
    }

    let state = Arc::new(StateManager::new().with_metrics(Arc::clone(&metrics)));
    spawn_state_logger(&state);

    let mut profiles = ProfileStore::open(&config.profiles_dir()).await?;
    let base = profiles.ensure_base_profile().await?;
    if profiles.active().is_none() {
        profiles.set_active(&base.id).await?;
    }
    if let Some(active) = profiles.active() {
        state.set_active_profile(Some(active.id.clone()), Some(active.name.clone()));
    }

    let mut session = Session {
        config_manager,
        config,
        profiles,
        state,
        metrics,
        assume_yes: cli.yes,
    };

    session.dispatch(cli.command).await
}

/// Forward state events to the log at debug level.
fn spawn_state_logger(state: &StateManager) {
    let mut rx = state.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(StateChange::OperationFinished { kind, succeeded, failed }) => {
                    tracing::debug!("State: {} finished ({} ok, {} failed)", kind, succeeded, failed);
                }
                Ok(change) => tracing::debug!("State: {:?}", change),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("State logger skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

struct Session {
    config_manager: ConfigManager,
    config: AppConfig,
    profiles: ProfileStore,
    state: Arc<StateManager>,
    metrics: Arc<Metrics>,
    assume_yes: bool,
}

impl Session {
    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Profiles => self.list_profiles(),
            Command::NewProfile { name, description } => {
                let profile = self.profiles.create(&name, &description).await?;
                println!("Created profile {} ({})", profile.name, profile.id);
                Ok(())
            }
            Command::CloneProfile { source, name } => {
                let source = self.profile(Some(&source))?;
                let clone = self.profiles.clone_profile(&source.id, &name).await?;
                println!("Cloned {} into {} ({})", source.name, clone.name, clone.id);
                Ok(())
            }
            Command::DeleteProfile { profile } => {
                let profile = self.profile(Some(&profile))?;
                self.profiles.delete(&profile.id).await?;
                println!("Deleted profile {}", profile.name);
                Ok(())
            }
            Command::AddFile {
                source,
                target,
                name,
                profile,
            } => self.add_file(&source, target, name, profile.as_deref()).await,
            Command::Warehouse { search } => self.list_warehouse(search.as_deref()).await,
            Command::Apply { profile } => self.apply(profile.as_deref()).await,
            Command::Revert { profile } => self.revert(profile.as_deref()).await,
            Command::Switch { profile } => self.switch(&profile).await,
            Command::RestoreBase => self.restore_base().await,
            Command::RestoreLst => {
                let engine = self.engine().await?;
                let restored = engine.restore_all_base().await;
                println!("Restored {restored} list file(s)");
                Ok(())
            }
            Command::Verify { profile } => self.verify(profile.as_deref()).await,
            Command::CleanupBackups { profile } => self.cleanup_backups(profile.as_deref()).await,
            Command::MergeLst {
                base,
                incoming,
                output,
            } => merge_lst_files(&base, &incoming, output.as_deref()).await,
            Command::Status => self.status().await,
        }
    }

    /// Build the overlay engine over the configured warehouse and game.
    async fn engine(&self) -> Result<ModApplicator> {
        let warehouse: Arc<dyn Warehouse> = Arc::new(WarehouseCatalog::open(&self.config.warehouse_dir()).await?);
        let progress: Arc<dyn ProgressSink> = self.state.clone();

        let engine = ModApplicator::new(&self.config.game_root(), &self.config.backup_dir(), warehouse)
            .await
            .context("Failed to initialize the overlay engine")?
            .with_progress(progress)
            .with_metrics(Arc::clone(&self.metrics));
        Ok(engine)
    }

    /// Owned copy of a profile by id or name, or of the active profile.
    fn profile(&self, id_or_name: Option<&str>) -> Result<ModProfile> {
        let found = match id_or_name {
            Some(key) => self.profiles.find(key),
            None => self.profiles.active(),
        };
        match (found, id_or_name) {
            (Some(profile), _) => Ok(profile.clone()),
            (None, Some(key)) => bail!("No profile named {key}"),
            (None, None) => bail!("No active profile"),
        }
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.assume_yes || !self.config.confirm_before_apply {
            return Ok(true);
        }

        print!("{prompt} [y/N] ");
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    /// Persist which profile is active in both the profile store and the config.
    async fn mark_active(&mut self, profile: &ModProfile) -> Result<()> {
        self.profiles.set_active(&profile.id).await?;
        self.config.active_profile_id = Some(profile.id.clone());
        self.config_manager.save_config(&self.config)?;
        self.state
            .set_active_profile(Some(profile.id.clone()), Some(profile.name.clone()));
        Ok(())
    }

    fn list_profiles(&self) -> Result<()> {
        for profile in self.profiles.all() {
            let marker = if profile.is_active { "*" } else { " " };
            let read_only = if profile.is_read_only { " (read-only)" } else { "" };
            println!(
                "{marker} {}{read_only}  {} modification(s), {} applied  [{}]",
                profile.name,
                profile.file_modifications.len(),
                profile.applied_count(),
                profile.id
            );
        }
        Ok(())
    }

    async fn add_file(
        &mut self,
        source: &Utf8Path,
        target: String,
        name: String,
        profile: Option<&str>,
    ) -> Result<()> {
        let mut target_profile = profile.map(|key| self.profile(Some(key))).transpose()?;
        if let Some(p) = target_profile.as_ref().filter(|p| p.is_read_only) {
            bail!("Profile {} is read-only", p.name);
        }

        let mut catalog = WarehouseCatalog::open(&self.config.warehouse_dir()).await?;
        let file = catalog
            .add_file(
                source,
                NewWarehouseFile {
                    name,
                    target_relative_path: target,
                    ..NewWarehouseFile::default()
                },
            )
            .await?;
        println!("Stored {} as {} ({:?})", file.original_file_name, file.id, file.category);

        if let Some(profile) = target_profile.as_mut() {
            profile.add_modification(FileModification::new(&file.target_relative_path, &file.id));
            self.profiles.save(profile).await?;
            println!("Added {} to profile {}", file.target_relative_path, profile.name);
        }
        Ok(())
    }

    async fn list_warehouse(&self, search: Option<&str>) -> Result<()> {
        let catalog = WarehouseCatalog::open(&self.config.warehouse_dir()).await?;
        let files = match search {
            Some(term) => catalog.search(term),
            None => catalog.all_files(),
        };

        for file in files {
            let category = if file.category == ModCategory::Other {
                String::new()
            } else {
                format!(" [{:?}]", file.category)
            };
            println!("{}  {} -> {}{category}", file.id, file.name, file.target_relative_path);
        }
        Ok(())
    }

    async fn apply(&mut self, key: Option<&str>) -> Result<()> {
        let mut profile = self.profile(key)?;
        if !self.confirm(&format!("Apply profile {} to {}?", profile.name, self.config.game_install_path))? {
            println!("Cancelled");
            return Ok(());
        }

        let mut operator = ProfileOperator::new(self.engine().await?);
        let tally = operator.apply_profile(&mut profile, self.config.auto_backup).await?;
        self.profiles.save(&mut profile).await?;

        println!("Applied {}: {} succeeded, {} failed", profile.name, tally.succeeded, tally.failed);
        Ok(())
    }

    async fn revert(&mut self, key: Option<&str>) -> Result<()> {
        let mut profile = self.profile(key)?;
        if !self.confirm(&format!("Revert profile {}?", profile.name))? {
            println!("Cancelled");
            return Ok(());
        }

        let mut operator = ProfileOperator::new(self.engine().await?);
        let tally = operator.revert_profile(&mut profile).await;
        self.profiles.save(&mut profile).await?;

        println!("Reverted {}: {} succeeded, {} failed", profile.name, tally.succeeded, tally.failed);
        if profile.file_modifications.iter().any(|m| is_lst_name(&m.relative_game_path)) {
            println!("List files keep their merged missions until `restore-lst` or `switch`");
        }
        Ok(())
    }

    async fn switch(&mut self, key: &str) -> Result<()> {
        let mut new_profile = self.profile(Some(key))?;
        let mut old_profile = self.profiles.active().cloned();

        if new_profile.is_read_only {
            // The base profile: nothing to apply, only restore
            return self.restore_base().await;
        }

        if !self.confirm(&format!("Switch to profile {}?", new_profile.name))? {
            println!("Cancelled");
            return Ok(());
        }

        let mut operator = ProfileOperator::new(self.engine().await?);
        let create_backup = self.config.auto_backup;

        let tally = match old_profile.as_mut() {
            Some(old) if old.id == new_profile.id => operator.rebuild_profile(&mut new_profile, create_backup).await?,
            Some(old) if old.is_read_only => operator.switch_profile(None, &mut new_profile, create_backup).await?,
            Some(old) => {
                let tally = operator
                    .switch_profile(Some(&mut *old), &mut new_profile, create_backup)
                    .await?;
                self.profiles.save(old).await?;
                tally
            }
            None => operator.switch_profile(None, &mut new_profile, create_backup).await?,
        };

        self.profiles.save(&mut new_profile).await?;
        self.mark_active(&new_profile).await?;

        println!(
            "Switched to {}: {} succeeded, {} failed",
            new_profile.name, tally.succeeded, tally.failed
        );
        Ok(())
    }

    async fn restore_base(&mut self) -> Result<()> {
        if !self.confirm("Restore the unmodified game installation?")? {
            println!("Cancelled");
            return Ok(());
        }

        let mut old_profile = self.profiles.active().filter(|p| !p.is_read_only).cloned();
        let mut operator = ProfileOperator::new(self.engine().await?);
        let summary = operator.restore_base_installation(old_profile.as_mut()).await;

        if let Some(old) = old_profile.as_mut() {
            self.profiles.save(old).await?;
        }

        let base = self.profiles.ensure_base_profile().await?;
        self.mark_active(&base).await?;

        println!(
            "Restored base installation: {} file(s) reverted, {} failed, {} list file(s) restored",
            summary.reverted.succeeded, summary.reverted.failed, summary.lst_restored
        );
        Ok(())
    }

    async fn verify(&self, key: Option<&str>) -> Result<()> {
        let profile = self.profile(key)?;
        let engine = self.engine().await?;

        let mut mismatched = 0;
        for modification in profile.file_modifications.iter().filter(|m| m.is_applied) {
            let ok = engine.verify(modification).await;
            if !ok {
                mismatched += 1;
            }
            println!("{}  {}", if ok { "ok  " } else { "FAIL" }, modification.relative_game_path);
        }

        if mismatched > 0 {
            bail!("{mismatched} modification(s) of {} do not match the warehouse", profile.name);
        }
        println!("All applied modifications of {} verified", profile.name);
        Ok(())
    }

    async fn cleanup_backups(&self, key: Option<&str>) -> Result<()> {
        let profiles = match key {
            Some(_) => vec![self.profile(key)?],
            None => self.profiles.all(),
        };
        let engine = self.engine().await?;
        let keep = self.config.max_backup_versions as usize;

        let mut deleted = 0;
        for modification in profiles.iter().flat_map(|p| &p.file_modifications) {
            deleted += engine.cleanup_old_backups(&modification.id, keep).await?;
        }

        println!("Deleted {deleted} old backup(s), keeping {keep} per modification");
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        println!("{} v{}", APP_NAME, VERSION);
        println!("Config:    {}", self.config_manager.config_path());
        println!("Game:      {}", self.config.game_install_path);
        println!("Warehouse: {}", self.config.warehouse_path);
        println!("Profiles:  {}", self.config.profiles_path);
        println!("Backups:   {}", self.config.backup_path);

        if let Some(active) = self.profiles.active() {
            println!(
                "Active:    {} ({} of {} applied)",
                active.name,
                active.applied_count(),
                active.file_modifications.len()
            );
        }

        let problems = self.config.validate();
        if !problems.is_empty() {
            for problem in problems {
                println!("Problem:   {problem}");
            }
            return Ok(());
        }

        let engine = self.engine().await?;
        let registry = engine.registry();
        println!("Captured list files: {}", registry.len());
        for entry in registry.entries() {
            println!("  {entry}");
        }
        for missing in registry.missing_backups().await {
            println!("  missing capture: {missing}");
        }
        Ok(())
    }
}

/// Merge `incoming` into `base`, writing to `output` or back over `base`.
async fn merge_lst_files(base: &Utf8Path, incoming: &Utf8Path, output: Option<&Utf8Path>) -> Result<()> {
    let base_bytes = tokio::fs::read(base)
        .await
        .with_context(|| format!("Failed to read {}", base))?;
    let incoming_bytes = tokio::fs::read(incoming)
        .await
        .with_context(|| format!("Failed to read {}", incoming))?;

    let (merged, added) = merge(
        LstDocument::from_bytes(&base_bytes),
        &LstDocument::from_bytes(&incoming_bytes),
    );

    let output = output.unwrap_or(base);
    tokio::fs::write(output, merged.to_bytes())
        .await
        .with_context(|| format!("Failed to write {}", output))?;

    println!("Added {added} mission(s); {} now lists {}", output, merged.mission_count());
    Ok(())
}
