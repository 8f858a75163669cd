use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Name given to the read-only profile that represents the untouched install.
pub const BASE_PROFILE_NAME: &str = "Base Game Install";

/// Category of a mod file, mostly informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModCategory {
    Mission,
    Graphics,
    Sound,
    Music,
    Configuration,
    Resource,
    Campaign,
    Training,
    Battle,
    Melee,
    Tournament,
    #[default]
    Other,
}

impl ModCategory {
    /// Infer a category from a game-relative target path.
    ///
    /// Known XvT / Balance of Power directory names win over the file extension.
    pub fn from_target_path(target: &str) -> Self {
        let upper = format!("/{}", target.replace('\\', "/").to_uppercase());

        let by_dir = [
            ("/BATTLE/", ModCategory::Battle),
            ("/COMBAT/", ModCategory::Mission),
            ("/TRAIN/", ModCategory::Training),
            ("/MELEE/", ModCategory::Melee),
            ("/CAMPAIGN/", ModCategory::Campaign),
            ("/TOURN/", ModCategory::Tournament),
            ("/CP320/", ModCategory::Graphics),
            ("/CP640/", ModCategory::Graphics),
            ("/AMOVIE/", ModCategory::Graphics),
            ("/BMOVIE/", ModCategory::Graphics),
            ("/MUSIC/", ModCategory::Music),
            ("/WAVE/", ModCategory::Sound),
            ("/RESOURCE/", ModCategory::Resource),
        ];

        for (needle, category) in by_dir {
            if upper.contains(needle) {
                return category;
            }
        }

        let extension = upper.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        Self::from_extension(extension)
    }

    /// Category for a bare extension (without the dot, any case).
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_uppercase().as_str() {
            "TIE" => ModCategory::Mission,
            "LST" => ModCategory::Battle,
            "LFD" => ModCategory::Resource,
            "WAV" | "VOC" => ModCategory::Sound,
            "WRK" => ModCategory::Graphics,
            "CFG" | "TXT" => ModCategory::Configuration,
            _ => ModCategory::Other,
        }
    }
}

/// One intended overlay of a warehouse file onto a game-relative path.
///
/// `is_applied` and `backup_path` are mutated by the
/// [`ModApplicator`](crate::services::ModApplicator); persisting them is the
/// caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileModification {
    pub id: String,

    /// Path relative to the game root, e.g. `BalanceOfPower/BATTLE/Battle.lst`
    pub relative_game_path: String,

    pub warehouse_file_id: String,

    /// Per-file backup taken before the last overwrite, if any
    #[serde(default)]
    pub backup_path: Option<String>,

    #[serde(default)]
    pub category: ModCategory,

    #[serde(default)]
    pub is_applied: bool,

    #[serde(default)]
    pub description: String,
}

impl FileModification {
    pub fn new(relative_game_path: impl Into<String>, warehouse_file_id: impl Into<String>) -> Self {
        let relative_game_path = relative_game_path.into();
        Self {
            id: Uuid::new_v4().to_string(),
            category: ModCategory::from_target_path(&relative_game_path),
            relative_game_path,
            warehouse_file_id: warehouse_file_id.into(),
            backup_path: None,
            is_applied: false,
            description: String::new(),
        }
    }
}

/// A named, ordered collection of file modifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    #[serde(default)]
    pub is_active: bool,

    /// Read-only profiles (the base install) never receive mod content
    #[serde(default)]
    pub is_read_only: bool,

    #[serde(default)]
    pub file_modifications: Vec<FileModification>,

    #[serde(default)]
    pub custom_settings: IndexMap<String, String>,
}

impl ModProfile {
    pub fn new(name: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            created_date: now,
            last_modified: now,
            is_active: false,
            is_read_only: false,
            file_modifications: Vec::new(),
            custom_settings: IndexMap::new(),
        }
    }

    /// The read-only profile standing for the unmodified installation.
    pub fn base_install() -> Self {
        let mut profile = Self::new(BASE_PROFILE_NAME);
        profile.description = "Unmodified game installation".to_string();
        profile.is_read_only = true;
        profile
    }

    /// Append a modification and return a mutable handle to it.
    pub fn add_modification(&mut self, modification: FileModification) -> &mut FileModification {
        self.file_modifications.push(modification);
        self.last_modified = OffsetDateTime::now_utc();
        let last = self.file_modifications.len() - 1;
        &mut self.file_modifications[last]
    }

    pub fn remove_modification(&mut self, modification_id: &str) -> Option<FileModification> {
        let index = self
            .file_modifications
            .iter()
            .position(|m| m.id == modification_id)?;
        self.last_modified = OffsetDateTime::now_utc();
        Some(self.file_modifications.remove(index))
    }

    pub fn applied_count(&self) -> usize {
        self.file_modifications.iter().filter(|m| m.is_applied).count()
    }
}
