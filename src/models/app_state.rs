use std::fmt;

/// Long-running operations the engine reports progress for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Apply,
    Revert,
    Switch,
    RestoreBase,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationKind::Apply => "apply",
            OperationKind::Revert => "revert",
            OperationKind::Switch => "switch",
            OperationKind::RestoreBase => "restore base",
        };
        f.write_str(label)
    }
}

/// Single source of truth for runtime state.
///
/// Holds the active profile, the operation in flight and its progress, and the
/// tally of the last finished operation.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Never mutate it directly; go through the manager:
/// - [`read()`](crate::state::StateManager::read) for read-only access
/// - [`update()`](crate::state::StateManager::update) for mutations with automatic change events
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Profile selection
    pub active_profile_id: Option<String>,
    pub active_profile_name: Option<String>,

    // Runtime state
    pub is_busy: bool,
    pub current_operation: Option<OperationKind>,
    pub status_message: String,
    pub current_path: Option<String>,

    // Progress state
    pub progress: usize,
    pub total: usize,

    // Results of the operation in flight (or the last one)
    pub succeeded: usize,
    pub failed: usize,
    pub failed_paths: Vec<String>,
}

impl AppState {
    /// Begin tracking a new operation over `total` modifications.
    pub fn begin_operation(&mut self, kind: OperationKind, total: usize) {
        self.is_busy = true;
        self.current_operation = Some(kind);
        self.current_path = None;
        self.progress = 0;
        self.total = total;
        self.succeeded = 0;
        self.failed = 0;
        self.failed_paths.clear();
    }

    /// Record the outcome of one modification.
    pub fn record_item(&mut self, relative_path: &str, success: bool) {
        self.current_path = Some(relative_path.to_string());
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            self.failed_paths.push(relative_path.to_string());
        }
        self.progress += 1;
    }

    pub fn finish_operation(&mut self) {
        self.is_busy = false;
        self.current_path = None;
    }

    /// Reset all operation-related state, keeping the active profile.
    pub fn reset_operation_state(&mut self) {
        self.is_busy = false;
        self.current_operation = None;
        self.status_message.clear();
        self.current_path = None;
        self.progress = 0;
        self.total = 0;
        self.succeeded = 0;
        self.failed = 0;
        self.failed_paths.clear();
    }

    /// Get (succeeded, failed, progress, total).
    pub fn operation_stats(&self) -> (usize, usize, usize, usize) {
        (self.succeeded, self.failed, self.progress, self.total)
    }

    /// One-line summary of the current or last operation.
    ///
    /// Returns an empty string if nothing has run.
    pub fn summary(&self) -> String {
        let Some(kind) = self.current_operation else {
            return String::new();
        };

        if self.failed == 0 {
            format!("{kind}: {} succeeded", self.succeeded)
        } else {
            format!("{kind}: {} succeeded, {} failed", self.succeeded, self.failed)
        }
    }
}
