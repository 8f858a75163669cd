use super::store::{StoreError, read_yaml, write_yaml};
use crate::models::{BASE_PROFILE_NAME, FileModification, ModProfile};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use time::OffsetDateTime;
use tokio::fs;
use uuid::Uuid;

/// Persists one `{id}.yaml` file per profile.
///
/// The engine only mutates profiles in memory; callers hand them back here
/// with [`save`](Self::save) after every apply, revert or switch.
#[derive(Debug)]
pub struct ProfileStore {
    root: Utf8PathBuf,
    profiles: IndexMap<String, ModProfile>,
}

impl ProfileStore {
    /// Open the store at `root` and load every profile in it.
    pub async fn open(root: &Utf8Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root)
            .await
            .map_err(StoreError::io("create directory", root))?;

        let mut store = Self {
            root: root.to_owned(),
            profiles: IndexMap::new(),
        };
        store.load_all().await?;
        Ok(store)
    }

    /// Reload all profiles from disk. Unreadable files are logged and skipped.
    pub async fn load_all(&mut self) -> Result<usize, StoreError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(StoreError::io("list", &self.root))?;

        let mut loaded = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StoreError::io("list", &self.root))?
        {
            let Ok(path) = Utf8PathBuf::try_from(entry.path()) else {
                continue;
            };
            if path.extension() != Some("yaml") {
                continue;
            }

            match read_yaml::<ModProfile>(&path).await {
                Ok(profile) => loaded.push(profile),
                Err(e) => tracing::warn!("Skipping unreadable profile {}: {}", path, e),
            }
        }

        loaded.sort_by(|a, b| a.created_date.cmp(&b.created_date).then_with(|| a.name.cmp(&b.name)));
        self.profiles = loaded.into_iter().map(|p| (p.id.clone(), p)).collect();

        tracing::info!("Loaded {} profiles from {}", self.profiles.len(), self.root);
        Ok(self.profiles.len())
    }

    /// Write a profile to disk, bumping its `last_modified`.
    pub async fn save(&mut self, profile: &mut ModProfile) -> Result<(), StoreError> {
        profile.last_modified = OffsetDateTime::now_utc();
        write_yaml(&self.profile_path(&profile.id), profile).await?;
        self.profiles.insert(profile.id.clone(), profile.clone());
        tracing::debug!("Saved profile {} ({})", profile.name, profile.id);
        Ok(())
    }

    pub async fn create(&mut self, name: &str, description: &str) -> Result<ModProfile, StoreError> {
        let mut profile = ModProfile::new(name);
        profile.description = description.to_string();
        self.save(&mut profile).await?;
        tracing::info!("Created profile {}", profile.name);
        Ok(profile)
    }

    /// Delete a profile. The active profile cannot be deleted.
    pub async fn delete(&mut self, profile_id: &str) -> Result<(), StoreError> {
        let profile = self
            .profiles
            .get(profile_id)
            .ok_or_else(|| StoreError::ProfileNotFound(profile_id.to_string()))?;
        if profile.is_active {
            return Err(StoreError::ActiveProfile(profile.name.clone()));
        }

        let path = self.profile_path(profile_id);
        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path)
                .await
                .map_err(StoreError::io("delete", &path))?;
        }

        if let Some(removed) = self.profiles.shift_remove(profile_id) {
            tracing::info!("Deleted profile {}", removed.name);
        }
        Ok(())
    }

    pub fn get(&self, profile_id: &str) -> Option<&ModProfile> {
        self.profiles.get(profile_id)
    }

    /// Case-insensitive lookup by name.
    pub fn find_by_name(&self, name: &str) -> Option<&ModProfile> {
        let wanted = name.to_lowercase();
        self.profiles.values().find(|p| p.name.to_lowercase() == wanted)
    }

    /// Look up by id first, then by name.
    pub fn find(&self, id_or_name: &str) -> Option<&ModProfile> {
        self.get(id_or_name).or_else(|| self.find_by_name(id_or_name))
    }

    pub fn active(&self) -> Option<&ModProfile> {
        self.profiles.values().find(|p| p.is_active)
    }

    /// Snapshot of every profile.
    pub fn all(&self) -> Vec<ModProfile> {
        self.profiles.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Mark `profile_id` as the only active profile and persist the change.
    pub async fn set_active(&mut self, profile_id: &str) -> Result<(), StoreError> {
        if !self.profiles.contains_key(profile_id) {
            return Err(StoreError::ProfileNotFound(profile_id.to_string()));
        }

        let previously_active: Vec<String> = self
            .profiles
            .values()
            .filter(|p| p.is_active && p.id != profile_id)
            .map(|p| p.id.clone())
            .collect();

        for id in previously_active {
            if let Some(mut profile) = self.profiles.get(&id).cloned() {
                profile.is_active = false;
                self.save(&mut profile).await?;
            }
        }

        if let Some(mut profile) = self.profiles.get(profile_id).cloned() {
            profile.is_active = true;
            self.save(&mut profile).await?;
            tracing::info!("Activated profile {}", profile.name);
        }
        Ok(())
    }

    /// Copy a profile under a new name with fresh ids and nothing applied.
    pub async fn clone_profile(&mut self, source_id: &str, new_name: &str) -> Result<ModProfile, StoreError> {
        let source = self
            .profiles
            .get(source_id)
            .ok_or_else(|| StoreError::ProfileNotFound(source_id.to_string()))?;

        let mut clone = ModProfile::new(new_name);
        clone.description = format!("Cloned from {}", source.name);
        clone.custom_settings = source.custom_settings.clone();
        clone.file_modifications = source
            .file_modifications
            .iter()
            .map(|m| FileModification {
                id: Uuid::new_v4().to_string(),
                backup_path: None,
                is_applied: false,
                ..m.clone()
            })
            .collect();

        self.save(&mut clone).await?;
        Ok(clone)
    }

    /// Return the read-only base-install profile, creating it on first use.
    pub async fn ensure_base_profile(&mut self) -> Result<ModProfile, StoreError> {
        if let Some(existing) = self
            .profiles
            .values()
            .find(|p| p.is_read_only && p.name == BASE_PROFILE_NAME)
        {
            return Ok(existing.clone());
        }

        let mut base = ModProfile::base_install();
        self.save(&mut base).await?;
        tracing::info!("Created {} profile", BASE_PROFILE_NAME);
        Ok(base)
    }

    fn profile_path(&self, profile_id: &str) -> Utf8PathBuf {
        self.root.join(format!("{profile_id}.yaml"))
    }
}
