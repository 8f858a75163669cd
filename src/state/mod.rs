// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for front ends.

use crate::metrics::Metrics;
use crate::models::{AppState, OperationKind};
use crate::services::ProgressSink;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events notify interested parties (a front end, a log forwarder)
/// about state changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A profile-level operation has started
    OperationStarted { kind: OperationKind, total: usize },

    /// Progress has been updated during an operation
    ProgressUpdated {
        current: usize,
        total: usize,
        current_path: Option<String>,
    },

    /// A single modification has been applied or reverted
    ModificationProcessed { relative_path: String, success: bool },

    /// A profile-level operation has finished
    OperationFinished {
        kind: OperationKind,
        succeeded: usize,
        failed: usize,
    },

    /// Status message has changed
    OperationChanged { message: String },

    /// A different profile is now active
    ActiveProfileChanged {
        profile_id: Option<String>,
        profile_name: Option<String>,
    },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the central state management component that:
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
/// - Receives engine progress as a [`ProgressSink`]
///
/// # Usage
///
/// Always use `StateManager` instead of accessing [`AppState`] directly:
/// - [`read()`](Self::read) for reading state through a closure
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,

    metrics: Option<Arc<Metrics>>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
            metrics: None,
        }
    }

    /// Count updates and broadcasts in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get a clone of the current state
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_busy);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// This is the primary way to modify state. It:
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        drop(state);

        if let Some(metrics) = &self.metrics {
            metrics.record_state_update();
        }
        for change in &changes {
            self.emit(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    ///
    /// Returns a receiver that will get notified of all future state changes.
    /// Multiple subscribers can listen simultaneously.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Send an event; having no subscribers is fine
    fn emit(&self, change: StateChange) {
        let sent = self.state_tx.send(change).is_ok();
        if let Some(metrics) = &self.metrics {
            if sent {
                metrics.record_state_broadcast();
            } else {
                metrics.record_state_broadcast_error();
            }
        }
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.active_profile_id != new.active_profile_id {
            changes.push(StateChange::ActiveProfileChanged {
                profile_id: new.active_profile_id.clone(),
                profile_name: new.active_profile_name.clone(),
            });
        }

        if let (true, Some(kind)) = (old.is_busy != new.is_busy, new.current_operation) {
            if new.is_busy {
                changes.push(StateChange::OperationStarted {
                    kind,
                    total: new.total,
                });
            } else {
                changes.push(StateChange::OperationFinished {
                    kind,
                    succeeded: new.succeeded,
                    failed: new.failed,
                });
            }
        }

        if old.progress != new.progress || old.total != new.total || old.current_path != new.current_path {
            changes.push(StateChange::ProgressUpdated {
                current: new.progress,
                total: new.total,
                current_path: new.current_path.clone(),
            });
        }

        if old.status_message != new.status_message {
            changes.push(StateChange::OperationChanged {
                message: new.status_message.clone(),
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Start tracking an operation over `total` modifications
    pub fn start_operation(&self, kind: OperationKind, total: usize) -> Vec<StateChange> {
        self.update(|state| state.begin_operation(kind, total))
    }

    /// Record the outcome of one modification
    pub fn record_item(&self, relative_path: &str, success: bool) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.record_item(relative_path, success));

        let event = StateChange::ModificationProcessed {
            relative_path: relative_path.to_string(),
            success,
        };
        self.emit(event.clone());
        changes.push(event);

        changes
    }

    /// Finish the current operation with its final tally
    pub fn finish_operation(&self, succeeded: usize, failed: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.succeeded = succeeded;
            state.failed = failed;
            state.finish_operation();
        })
    }

    pub fn set_status(&self, message: &str) -> Vec<StateChange> {
        self.update(|state| state.status_message = message.to_string())
    }

    pub fn set_active_profile(&self, profile_id: Option<String>, profile_name: Option<String>) -> Vec<StateChange> {
        self.update(|state| {
            state.active_profile_name = profile_name;
            state.active_profile_id = profile_id;
        })
    }

    /// Reset all operation-related state
    pub fn reset_operation_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset_operation_state());

        let reset_event = StateChange::StateReset;
        self.emit(reset_event.clone());
        changes.push(reset_event);

        changes
    }

    /// Get an Arc reference to the state for sharing across tasks
    pub fn state_arc(&self) -> Arc<RwLock<AppState>> {
        Arc::clone(&self.state)
    }
}

impl ProgressSink for StateManager {
    fn on_progress(&self, message: &str) {
        self.set_status(message);
    }

    fn on_operation_started(&self, kind: OperationKind, total: usize) {
        self.start_operation(kind, total);
    }

    fn on_item_processed(&self, relative_path: &str, success: bool) {
        self.record_item(relative_path, success);
    }

    fn on_operation_finished(&self, _kind: OperationKind, succeeded: usize, failed: usize) {
        self.finish_operation(succeeded, failed);
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Cloning shares the same state and channel
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert!(!state.is_busy);
        assert!(state.active_profile_id.is_none());
        assert_eq!(state.progress, 0);
    }

    #[test]
    fn test_update_with_change_detection() {
        let manager = StateManager::new();

        let changes = manager.update(|state| {
            state.is_busy = true;
            state.current_operation = Some(OperationKind::Apply);
            state.total = 10;
        });

        assert_eq!(changes.len(), 2);
        assert!(matches!(
            changes[0],
            StateChange::OperationStarted { kind: OperationKind::Apply, total: 10 }
        ));
        assert!(matches!(changes[1], StateChange::ProgressUpdated { .. }));
    }

    #[test]
    fn test_busy_without_operation_emits_no_lifecycle_event() {
        let manager = StateManager::new();
        let changes = manager.update(|state| state.is_busy = true);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_start_and_finish_operation() {
        let manager = StateManager::new();
        manager.start_operation(OperationKind::Switch, 3);
        manager.record_item("a.tie", true);
        manager.record_item("b.tie", false);

        let changes = manager.finish_operation(1, 1);
        assert!(matches!(
            changes[0],
            StateChange::OperationFinished { kind: OperationKind::Switch, succeeded: 1, failed: 1 }
        ));

        let state = manager.snapshot();
        assert!(!state.is_busy);
        assert_eq!(state.progress, 2);
        assert_eq!(state.failed_paths, vec!["b.tie".to_string()]);
    }

    #[test]
    fn test_record_item_emits_processed_event() {
        let manager = StateManager::new();
        manager.start_operation(OperationKind::Apply, 1);

        let changes = manager.record_item("BATTLE/Battle.lst", true);

        assert!(matches!(changes[0], StateChange::ProgressUpdated { current: 1, total: 1, .. }));
        assert!(changes.iter().any(|c| matches!(
            c,
            StateChange::ModificationProcessed { success: true, .. }
        )));
    }

    #[test]
    fn test_active_profile_change() {
        let manager = StateManager::new();
        let changes = manager.set_active_profile(Some("id-1".to_string()), Some("Campaign".to_string()));

        assert_eq!(
            changes,
            vec![StateChange::ActiveProfileChanged {
                profile_id: Some("id-1".to_string()),
                profile_name: Some("Campaign".to_string()),
            }]
        );

        let unchanged = manager.set_active_profile(Some("id-1".to_string()), Some("Campaign".to_string()));
        assert!(unchanged.is_empty());
    }

    #[test]
    fn test_reset_operation_state() {
        let manager = StateManager::new();
        manager.start_operation(OperationKind::Apply, 2);
        manager.record_item("a.tie", true);

        let changes = manager.reset_operation_state();
        assert!(changes.iter().any(|c| matches!(c, StateChange::StateReset)));

        let state = manager.snapshot();
        assert_eq!(state.progress, 0);
        assert_eq!(state.total, 0);
    }

    #[test]
    fn test_progress_sink_routes_messages() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        let sink: &dyn ProgressSink = &manager;
        sink.on_progress("Restoring base list files");

        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::OperationChanged {
                message: "Restoring base list files".to_string()
            }
        );
        assert_eq!(manager.read(|s| s.status_message.clone()), "Restoring base list files");
    }

    #[test]
    fn test_metrics_count_broadcasts() {
        let metrics = Arc::new(Metrics::new());
        let manager = StateManager::new().with_metrics(Arc::clone(&metrics));
        let _rx = manager.subscribe();

        manager.set_status("hello");

        assert_eq!(metrics.state_updates.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.state_broadcasts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_multiple_subscribers() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.start_operation(OperationKind::Apply, 1);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_state_manager_clone_shares_state() {
        let manager = StateManager::new();
        let clone = manager.clone();

        manager.set_status("shared");
        assert_eq!(clone.read(|s| s.status_message.clone()), "shared");
    }
}
