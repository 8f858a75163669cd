//! Data models for Hydrospanner.
//!
//! This module contains the data structures shared by the engine and the binary:
//! - [`FileModification`] and [`ModProfile`]: ordered overlays of warehouse files onto the game
//! - [`WarehouseFile`]: immutable metadata for a file held in the mod warehouse
//! - [`AppConfig`]: paths and preferences loaded from `Hydrospanner Config.yaml`
//! - [`AppState`]: runtime progress and results, owned by [`StateManager`](crate::state::StateManager)
//!
//! # Architecture Note
//!
//! Persisted models derive `Serialize`/`Deserialize` for YAML storage. The engine mutates
//! `FileModification::is_applied` and `backup_path` in memory only; writing profiles back
//! to disk is the job of [`ProfileStore`](crate::services::ProfileStore).

pub mod app_state;
pub mod config;
pub mod profile;
pub mod warehouse;

pub use app_state::{AppState, OperationKind};
pub use config::AppConfig;
pub use profile::{BASE_PROFILE_NAME, FileModification, ModCategory, ModProfile};
pub use warehouse::{WarehouseFile, is_lst_name};
