//! Services module - the mod overlay engine and its collaborators.
//!
//! This module contains the business logic for overlaying warehouse files onto an
//! X-Wing vs. TIE Fighter installation and switching between sets of overlays
//! ("profiles"). The services have no dependency on the command line front end.
//!
//! # Components
//!
//! - [`lst`]: Structural parser and merger for mission list (`.lst`) files. List files
//!   are merged, never overwritten, because several mods may add missions to the
//!   same list and multiplayer needs a reproducible result.
//!
//! - [`BackupRegistry`]: Captures the pristine content of every list file the first
//!   time a mod touches it, and restores it on demand.
//!
//! - [`ModApplicator`]: Applies and reverts a single [`FileModification`](crate::models::FileModification):
//!   - Plain copy with timestamped per-file backups for regular files
//!   - Capture-then-merge for list files
//!   - Backup pruning and verification
//!
//! - [`ProfileOperator`]: Applies, reverts and switches whole profiles, returning an
//!   [`OperationTally`] instead of failing.
//!
//! - [`PathResolver`]: Case-insensitive resolution of game-relative paths.
//!
//! - [`Warehouse`], [`WarehouseCatalog`] and [`ProfileStore`]: lookup and YAML persistence
//!   for warehouse files and profiles.
//!
//! - [`ProgressSink`]: Injected progress notifications.
//!
//! # Switch Sequence
//!
//! 1. Revert the old profile's regular files
//! 2. Restore every captured list file to pristine
//! 3. Apply the new profile, regular files first, then list files
//!
//! # Usage Example
//!
//! ```ignore
//! use hydrospanner::services::{ModApplicator, ProfileOperator, WarehouseCatalog};
//!
//! let warehouse = Arc::new(WarehouseCatalog::open(&config.warehouse_dir()).await?);
//! let engine = ModApplicator::new(&config.game_root(), &config.backup_dir(), warehouse).await?;
//! let mut operator = ProfileOperator::new(engine);
//!
//! let tally = operator.switch_profile(Some(&mut old), &mut new, true).await?;
//! profiles.save(&mut old).await?;
//! profiles.save(&mut new).await?;
//! ```

pub mod applicator;
pub mod backup_registry;
pub mod lst;
pub mod path_resolver;
pub mod profile_operator;
pub mod profile_store;
pub mod progress;
pub mod store;
pub mod warehouse;

pub use applicator::{ApplyOutcome, ModApplicator, ModificationError, RevertOutcome, backup_file_name};
pub use backup_registry::{BASE_STORE_DIR, BackupRegistry, REGISTRY_FILE, RegistryError};
pub use lst::{LstDocument, Mission, Section, merge, parse_sections, render_sections};
pub use path_resolver::{PathResolver, normalize_relative};
pub use profile_operator::{BaseRestoreSummary, OperationTally, ProfileOperationError, ProfileOperator};
pub use profile_store::ProfileStore;
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use store::StoreError;
pub use warehouse::{CATALOG_FILE, NewWarehouseFile, Warehouse, WarehouseCatalog};
