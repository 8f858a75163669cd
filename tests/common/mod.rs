//! Shared fixture for engine integration tests: a throwaway game installation,
//! warehouse and backup root inside one temporary directory.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use hydrospanner::services::{NewWarehouseFile, NoProgress, ProgressSink, Warehouse};
use hydrospanner::{ModApplicator, OperationKind, WarehouseCatalog, WarehouseFile};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub struct Fixture {
    _temp: TempDir,
    pub game: Utf8PathBuf,
    pub backups: Utf8PathBuf,
    pub warehouse: Utf8PathBuf,
    incoming: Utf8PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();

        let fixture = Self {
            game: root.join("XvT"),
            backups: root.join("Backups"),
            warehouse: root.join("Warehouse"),
            incoming: root.join("incoming"),
            _temp: temp,
        };
        fs::create_dir_all(&fixture.game).unwrap();
        fs::create_dir_all(&fixture.incoming).unwrap();
        fixture
    }

    pub fn game_path(&self, relative: &str) -> Utf8PathBuf {
        self.game.join(relative)
    }

    pub fn write_game(&self, relative: &str, contents: &[u8]) {
        let path = self.game_path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn read_game(&self, relative: &str) -> Vec<u8> {
        fs::read(self.game_path(relative)).unwrap()
    }

    /// Put a file into the warehouse, targeting `target`.
    pub async fn stock(&self, file_name: &str, contents: &[u8], target: &str) -> WarehouseFile {
        let source = self.incoming.join(file_name);
        fs::write(&source, contents).unwrap();

        let mut catalog = WarehouseCatalog::open(&self.warehouse).await.unwrap();
        catalog
            .add_file(
                &source,
                NewWarehouseFile {
                    target_relative_path: target.to_string(),
                    ..NewWarehouseFile::default()
                },
            )
            .await
            .unwrap()
    }

    /// Engine over the warehouse as currently stocked.
    pub async fn engine(&self) -> ModApplicator {
        self.engine_with_progress(Arc::new(NoProgress)).await
    }

    pub async fn engine_with_progress(&self, progress: Arc<dyn ProgressSink>) -> ModApplicator {
        let catalog: Arc<dyn Warehouse> = Arc::new(WarehouseCatalog::open(&self.warehouse).await.unwrap());
        ModApplicator::new(&self.game, &self.backups, catalog)
            .await
            .unwrap()
            .with_progress(progress)
    }
}

/// Render a CRLF list file from `(header, [(id, filename, name)])` sections.
pub fn lst(sections: &[(&str, &[(&str, &str, &str)])]) -> Vec<u8> {
    let mut text = String::new();
    for (header, missions) in sections {
        text.push_str(header);
        text.push_str("\r\n//\r\n");
        for (id, filename, name) in missions.iter() {
            text.push_str(&format!("{id}\r\n{filename}\r\n{name}\r\n"));
        }
        text.push_str("//\r\n");
    }
    text.into_bytes()
}

pub fn file_names(path: &Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

/// Records which modifications were processed, in order.
#[derive(Default)]
pub struct Recorder {
    pub items: Mutex<Vec<(String, bool)>>,
    pub finished: Mutex<Vec<(OperationKind, usize, usize)>>,
}

impl ProgressSink for Recorder {
    fn on_progress(&self, _message: &str) {}

    fn on_item_processed(&self, relative_path: &str, success: bool) {
        self.items
            .lock()
            .unwrap()
            .push((relative_path.to_string(), success));
    }

    fn on_operation_finished(&self, kind: OperationKind, succeeded: usize, failed: usize) {
        self.finished.lock().unwrap().push((kind, succeeded, failed));
    }
}

impl Recorder {
    pub fn paths(&self) -> Vec<String> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }
}
