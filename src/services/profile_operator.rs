use super::applicator::ModApplicator;
use crate::models::{ModProfile, OperationKind};
use std::time::Instant;
use thiserror::Error;

/// Errors from profile-level operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileOperationError {
    #[error("Profile {0} is read-only and cannot receive modifications")]
    ReadOnlyProfile(String),
}

/// Success and failure counts of a profile-level operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationTally {
    pub succeeded: usize,
    pub failed: usize,
}

impl OperationTally {
    pub fn record(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Result of returning the installation to its unmodified state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseRestoreSummary {
    /// Regular files reverted from the previously active profile
    pub reverted: OperationTally,

    /// List files restored from their pristine captures
    pub lst_restored: usize,
}

/// Applies, reverts and switches whole profiles through a [`ModApplicator`].
///
/// Regular files are always applied before list files so merges see the
/// final set of mission files. Switching reverts the old profile's regular
/// files, restores every captured list file to pristine, then applies the new
/// profile; merging is additive, so restore-then-remerge is the only way to
/// drop the old profile's list entries.
///
/// Per-item failures never abort an operation and nothing is rolled back;
/// the returned [`OperationTally`] reports the split. The caller persists the
/// mutated profiles afterwards.
pub struct ProfileOperator {
    engine: ModApplicator,
}

impl ProfileOperator {
    pub fn new(engine: ModApplicator) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ModApplicator {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ModApplicator {
        &mut self.engine
    }

    pub fn into_engine(self) -> ModApplicator {
        self.engine
    }

    /// Apply every modification of `profile`, regular files first, then list files.
    pub async fn apply_profile(
        &mut self,
        profile: &mut ModProfile,
        create_backup: bool,
    ) -> Result<OperationTally, ProfileOperationError> {
        ensure_writable(profile)?;

        let started = Instant::now();
        tracing::info!("Applying profile {}", profile.name);
        self.engine
            .progress()
            .on_operation_started(OperationKind::Apply, profile.file_modifications.len());

        let tally = self.apply_modifications(profile, create_backup).await;

        self.finish(OperationKind::Apply, tally, started);
        Ok(tally)
    }

    /// Revert the applied modifications of `profile`, last applied first.
    ///
    /// List-file modifications are only marked unapplied; their content comes
    /// back with [`ModApplicator::restore_all_base`].
    pub async fn revert_profile(&mut self, profile: &mut ModProfile) -> OperationTally {
        let started = Instant::now();
        tracing::info!("Reverting profile {}", profile.name);
        self.engine
            .progress()
            .on_operation_started(OperationKind::Revert, profile.applied_count());

        let tally = self.revert_modifications(profile).await;

        self.finish(OperationKind::Revert, tally, started);
        tally
    }

    /// Switch from `old_profile` (if any) to `new_profile`.
    ///
    /// 1. revert the old profile's regular files
    /// 2. restore every captured list file to pristine
    /// 3. apply the new profile
    ///
    /// A read-only `new_profile` is rejected before anything is touched. The
    /// tally is that of step 3. Active flags are updated on both profiles.
    pub async fn switch_profile(
        &mut self,
        old_profile: Option<&mut ModProfile>,
        new_profile: &mut ModProfile,
        create_backup: bool,
    ) -> Result<OperationTally, ProfileOperationError> {
        ensure_writable(new_profile)?;

        let started = Instant::now();
        tracing::info!("Switching to profile {}", new_profile.name);

        let reverting = old_profile.as_ref().map_or(0, |p| p.applied_count());
        self.engine.progress().on_operation_started(
            OperationKind::Switch,
            reverting + new_profile.file_modifications.len(),
        );

        if let Some(old) = old_profile {
            self.engine
                .progress()
                .on_progress(&format!("Reverting regular files of {}", old.name));
            let reverted = self.revert_modifications(old).await;
            if !reverted.is_clean() {
                tracing::warn!(
                    "{} files of {} could not be reverted",
                    reverted.failed,
                    old.name
                );
            }
            old.is_active = false;
        }

        self.engine.restore_all_base().await;

        self.engine
            .progress()
            .on_progress(&format!("Applying {}", new_profile.name));
        let tally = self.apply_modifications(new_profile, create_backup).await;
        new_profile.is_active = true;

        self.finish(OperationKind::Switch, tally, started);
        Ok(tally)
    }

    /// Rebuild a profile in place: switch from it to itself.
    ///
    /// List files end up equal to applying the profile to a pristine base.
    pub async fn rebuild_profile(
        &mut self,
        profile: &mut ModProfile,
        create_backup: bool,
    ) -> Result<OperationTally, ProfileOperationError> {
        ensure_writable(profile)?;

        let started = Instant::now();
        tracing::info!("Rebuilding profile {}", profile.name);
        self.engine.progress().on_operation_started(
            OperationKind::Switch,
            profile.applied_count() + profile.file_modifications.len(),
        );

        self.revert_modifications(profile).await;
        self.engine.restore_all_base().await;
        let tally = self.apply_modifications(profile, create_backup).await;
        profile.is_active = true;

        self.finish(OperationKind::Switch, tally, started);
        Ok(tally)
    }

    /// Return the installation to its unmodified state.
    ///
    /// Reverts the old profile's regular files and restores every captured
    /// list file. Nothing is copied in, which is how the read-only base
    /// profile is activated.
    pub async fn restore_base_installation(&mut self, old_profile: Option<&mut ModProfile>) -> BaseRestoreSummary {
        let started = Instant::now();
        tracing::info!("Restoring base installation");
        let reverting = old_profile.as_ref().map_or(0, |p| p.applied_count());
        self.engine
            .progress()
            .on_operation_started(OperationKind::RestoreBase, reverting);

        let reverted = match old_profile {
            Some(old) => {
                let tally = self.revert_modifications(old).await;
                old.is_active = false;
                tally
            }
            None => OperationTally::default(),
        };
        let lst_restored = self.engine.restore_all_base().await;

        self.finish(OperationKind::RestoreBase, reverted, started);
        BaseRestoreSummary {
            reverted,
            lst_restored,
        }
    }

    async fn apply_modifications(&mut self, profile: &mut ModProfile, create_backup: bool) -> OperationTally {
        let (lst, regular): (Vec<usize>, Vec<usize>) = (0..profile.file_modifications.len())
            .partition(|&i| self.engine.is_lst_modification(&profile.file_modifications[i]));

        tracing::debug!(
            "Applying {} regular and {} list modifications",
            regular.len(),
            lst.len()
        );

        let mut tally = OperationTally::default();
        for index in regular.into_iter().chain(lst) {
            let modification = &mut profile.file_modifications[index];
            let success = self.engine.apply(modification, create_backup).await;
            tally.record(success);
            self.engine
                .progress()
                .on_item_processed(&modification.relative_game_path, success);
        }
        tally
    }

    async fn revert_modifications(&mut self, profile: &mut ModProfile) -> OperationTally {
        let mut tally = OperationTally::default();

        for modification in profile
            .file_modifications
            .iter_mut()
            .rev()
            .filter(|m| m.is_applied)
        {
            if self.engine.is_lst_modification(modification) {
                modification.is_applied = false;
                continue;
            }

            let success = self.engine.revert(modification).await;
            tally.record(success);
            self.engine
                .progress()
                .on_item_processed(&modification.relative_game_path, success);
        }
        tally
    }

    fn finish(&self, kind: OperationKind, tally: OperationTally, started: Instant) {
        self.engine.metrics().record_operation_time(started.elapsed());
        self.engine
            .progress()
            .on_operation_finished(kind, tally.succeeded, tally.failed);
        tracing::info!(
            "Finished {}: {} succeeded, {} failed",
            kind,
            tally.succeeded,
            tally.failed
        );
    }
}

fn ensure_writable(profile: &ModProfile) -> Result<(), ProfileOperationError> {
    if profile.is_read_only {
        tracing::warn!("Refusing to apply read-only profile {}", profile.name);
        return Err(ProfileOperationError::ReadOnlyProfile(profile.name.clone()));
    }
    Ok(())
}
