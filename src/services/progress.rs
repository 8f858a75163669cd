use crate::models::OperationKind;

/// Receives progress notifications from the engine.
///
/// Calls are synchronous and informational; nothing in the engine depends on
/// what a sink does with them.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, message: &str);

    fn on_operation_started(&self, kind: OperationKind, total: usize) {
        self.on_progress(&format!("Starting {kind} of {total} modifications"));
    }

    fn on_item_processed(&self, relative_path: &str, success: bool) {
        let outcome = if success { "done" } else { "failed" };
        self.on_progress(&format!("{relative_path}: {outcome}"));
    }

    fn on_operation_finished(&self, kind: OperationKind, succeeded: usize, failed: usize) {
        self.on_progress(&format!("Finished {kind}: {succeeded} succeeded, {failed} failed"));
    }
}

/// Sink that forwards progress to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn on_item_processed(&self, relative_path: &str, success: bool) {
        if success {
            tracing::debug!("Processed {}", relative_path);
        } else {
            tracing::warn!("Failed to process {}", relative_path);
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ProgressSink for Recorder {
        fn on_progress(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_default_methods_route_to_on_progress() {
        let recorder = Recorder::default();
        recorder.on_operation_started(OperationKind::Apply, 2);
        recorder.on_item_processed("MELEE/m.tie", false);
        recorder.on_operation_finished(OperationKind::Apply, 1, 1);

        let messages = recorder.0.lock().unwrap();
        assert_eq!(
            *messages,
            vec![
                "Starting apply of 2 modifications".to_string(),
                "MELEE/m.tie: failed".to_string(),
                "Finished apply: 1 succeeded, 1 failed".to_string(),
            ]
        );
    }
}
