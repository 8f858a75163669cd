use super::ModCategory;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Metadata for a file held in the mod warehouse.
///
/// Immutable once added; the engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,

    /// Where the bytes live inside the warehouse directory
    pub storage_path: String,

    pub original_file_name: String,

    /// Extension including the dot, e.g. `.TIE`
    #[serde(default)]
    pub file_extension: String,

    #[serde(default)]
    pub category: ModCategory,

    /// Intended target relative to the game root
    pub target_relative_path: String,

    #[serde(default)]
    pub file_size_bytes: u64,

    #[serde(with = "time::serde::rfc3339")]
    pub date_added: OffsetDateTime,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub mod_package_id: Option<String>,
}

impl WarehouseFile {
    /// True when the original file name has the list-file extension.
    pub fn is_lst(&self) -> bool {
        is_lst_name(&self.original_file_name)
    }
}

/// Case-insensitive `.lst` extension check on a file name or path.
pub fn is_lst_name(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("lst"))
}
