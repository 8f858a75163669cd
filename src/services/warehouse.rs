use super::path_resolver::normalize_relative;
use super::store::{StoreError, read_yaml, write_yaml};
use crate::models::{ModCategory, WarehouseFile};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::fs;
use uuid::Uuid;

/// Catalog file kept in the warehouse directory.
pub const CATALOG_FILE: &str = "catalog.yaml";

/// Lookup of warehouse files by id.
///
/// Returned values are snapshots; the engine never holds on to them.
#[cfg_attr(test, mockall::automock)]
pub trait Warehouse: Send + Sync {
    fn get_file(&self, id: &str) -> Option<WarehouseFile>;
}

/// Metadata supplied when adding a file to the warehouse.
#[derive(Debug, Clone, Default)]
pub struct NewWarehouseFile {
    pub name: String,
    pub description: String,
    pub target_relative_path: String,

    /// Inferred from the target path when `None`
    pub category: Option<ModCategory>,

    pub tags: Vec<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub mod_package_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    files: Vec<WarehouseFile>,
}

/// YAML-backed warehouse: stored files plus `catalog.yaml` describing them.
#[derive(Debug)]
pub struct WarehouseCatalog {
    root: Utf8PathBuf,
    catalog_path: Utf8PathBuf,
    files: IndexMap<String, WarehouseFile>,
}

impl WarehouseCatalog {
    /// Open the warehouse at `root`, creating the directory if needed.
    pub async fn open(root: &Utf8Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root)
            .await
            .map_err(StoreError::io("create directory", root))?;

        let catalog_path = root.join(CATALOG_FILE);
        let document: CatalogDocument = if fs::try_exists(&catalog_path).await.unwrap_or(false) {
            read_yaml(&catalog_path).await?
        } else {
            tracing::debug!("No warehouse catalog at {}, starting empty", catalog_path);
            CatalogDocument::default()
        };

        let files = document
            .files
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect::<IndexMap<_, _>>();
        tracing::info!("Loaded warehouse catalog with {} files", files.len());

        Ok(Self {
            root: root.to_owned(),
            catalog_path,
            files,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Copy `source` into the warehouse as `{id}{ext}` and record it.
    pub async fn add_file(
        &mut self,
        source: &Utf8Path,
        request: NewWarehouseFile,
    ) -> Result<WarehouseFile, StoreError> {
        let metadata = fs::metadata(source)
            .await
            .map_err(|_| StoreError::SourceNotFound(source.to_owned()))?;
        if !metadata.is_file() {
            return Err(StoreError::SourceNotFound(source.to_owned()));
        }

        let target_relative_path = normalize_relative(&request.target_relative_path)
            .ok_or_else(|| StoreError::InvalidTarget(request.target_relative_path.clone()))?;

        let original_file_name = source.file_name().unwrap_or_default().to_string();
        let file_extension = source
            .extension()
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let id = Uuid::new_v4().to_string();
        let storage_path = self.root.join(format!("{id}{file_extension}"));
        fs::copy(source, &storage_path)
            .await
            .map_err(StoreError::io("copy into warehouse", &storage_path))?;

        let name = if request.name.trim().is_empty() {
            original_file_name.clone()
        } else {
            request.name
        };

        let file = WarehouseFile {
            id: id.clone(),
            name,
            description: request.description,
            storage_path: storage_path.to_string(),
            original_file_name,
            file_extension,
            category: request
                .category
                .unwrap_or_else(|| ModCategory::from_target_path(&target_relative_path)),
            target_relative_path,
            file_size_bytes: metadata.len(),
            date_added: OffsetDateTime::now_utc(),
            tags: request.tags,
            author: request.author,
            version: request.version,
            mod_package_id: request.mod_package_id,
        };

        self.files.insert(id, file.clone());
        self.save().await?;
        tracing::info!("Added {} to warehouse as {}", file.original_file_name, file.id);
        Ok(file)
    }

    /// Remove a file and its stored bytes. Returns `Ok(false)` for unknown ids.
    pub async fn remove_file(&mut self, id: &str) -> Result<bool, StoreError> {
        let Some(file) = self.files.shift_remove(id) else {
            return Ok(false);
        };

        let storage_path = Utf8PathBuf::from(&file.storage_path);
        if fs::try_exists(&storage_path).await.unwrap_or(false) {
            fs::remove_file(&storage_path)
                .await
                .map_err(StoreError::io("delete", &storage_path))?;
        }

        self.save().await?;
        tracing::info!("Removed {} from warehouse", file.id);
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&WarehouseFile> {
        self.files.get(id)
    }

    pub fn all_files(&self) -> Vec<WarehouseFile> {
        self.files.values().cloned().collect()
    }

    pub fn files_by_category(&self, category: ModCategory) -> Vec<WarehouseFile> {
        self.files
            .values()
            .filter(|f| f.category == category)
            .cloned()
            .collect()
    }

    /// Case-insensitive search over name, description, file name and tags.
    pub fn search(&self, term: &str) -> Vec<WarehouseFile> {
        let term = term.to_lowercase();
        self.files
            .values()
            .filter(|f| {
                f.name.to_lowercase().contains(&term)
                    || f.description.to_lowercase().contains(&term)
                    || f.original_file_name.to_lowercase().contains(&term)
                    || f.tags.iter().any(|t| t.to_lowercase().contains(&term))
            })
            .cloned()
            .collect()
    }

    async fn save(&self) -> Result<(), StoreError> {
        let document = CatalogDocument {
            files: self.all_files(),
        };
        write_yaml(&self.catalog_path, &document).await
    }
}

impl Warehouse for WarehouseCatalog {
    fn get_file(&self, id: &str) -> Option<WarehouseFile> {
        self.files.get(id).cloned()
    }
}
