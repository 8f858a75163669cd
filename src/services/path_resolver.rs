use camino::{Utf8Path, Utf8PathBuf};
use tokio::fs;

/// Resolves game-relative paths against the real on-disk casing.
///
/// Mod archives often carry their own directory casing (`MELEE` vs `Melee`)
/// while modifications name a canonical one. Each component is matched
/// case-insensitively against the existing directory entries; components
/// that do not exist yet keep their nominal spelling so new files still get
/// a sensible location.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: Utf8PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Path under the root with the nominal casing, no disk access.
    pub fn nominal(&self, relative: &str) -> Utf8PathBuf {
        let mut path = self.root.clone();
        for component in components(relative) {
            path.push(component);
        }
        path
    }

    /// Resolve `relative` to the actual on-disk path.
    pub async fn resolve(&self, relative: &str) -> Utf8PathBuf {
        let nominal = self.nominal(relative);
        if fs::try_exists(&nominal).await.unwrap_or(false) {
            return nominal;
        }

        let mut current = self.root.clone();
        let mut parent_exists = is_dir(&current).await;

        for component in components(relative) {
            let on_disk = if parent_exists {
                find_entry(&current, component).await
            } else {
                None
            };

            match on_disk {
                Some(name) => current.push(name),
                None => {
                    current.push(component);
                    parent_exists = false;
                }
            }
        }

        if current != nominal {
            tracing::debug!("Resolved {} to {}", relative, current);
        }
        current
    }
}

/// Normalise a game-relative path to `/`-separated form.
///
/// Returns `None` for empty paths, absolute paths (including drive-letter
/// paths) and paths that climb out of the root with `..`.
pub fn normalize_relative(path: &str) -> Option<String> {
    let unified = path.trim().replace('\\', "/");
    if unified.starts_with('/') {
        return None;
    }

    let mut parts = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            c if c.len() >= 2 && c.as_bytes()[1] == b':' && parts.is_empty() => return None,
            c => parts.push(c),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn components(relative: &str) -> impl Iterator<Item = &str> {
    relative
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
}

async fn is_dir(path: &Utf8Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

/// Find the entry of `dir` matching `name` case-insensitively.
///
/// An exact match wins; otherwise the lexicographically smallest candidate,
/// so repeated runs pick the same entry.
async fn find_entry(dir: &Utf8Path, name: &str) -> Option<String> {
    let mut entries = fs::read_dir(dir).await.ok()?;
    let wanted = name.to_lowercase();
    let mut best: Option<String> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(entry_name) = entry.file_name().into_string() else {
            continue;
        };
        if entry_name == name {
            return Some(entry_name);
        }
        if entry_name.to_lowercase() == wanted && best.as_ref().is_none_or(|b| entry_name < *b) {
            best = Some(entry_name);
        }
    }

    best
}
