//! Integration tests for ProfileOperator
//!
//! These tests verify:
//! - Regular files are applied before list files
//! - Read-only profiles never receive modifications
//! - Switching drops the old profile's list entries
//! - Rebuilding a profile equals applying it to a pristine base
//! - Per-item failures are tallied, not raised

mod common;

use common::{Fixture, Recorder, lst};
use hydrospanner::services::{LstDocument, OperationTally, ProfileOperationError, ProfileStore, merge};
use hydrospanner::{FileModification, ModProfile, OperationKind, ProfileOperator};
use std::sync::Arc;

const PRISTINE: &[(&str, &[(&str, &str, &str)])] = &[
    ("//Melee", &[("1", "m1.tie", "Stock One")]),
    ("//Battle", &[("5", "b5.tie", "Stock Battle")]),
];
const PROFILE_A_LST: &[(&str, &[(&str, &str, &str)])] = &[("//Melee", &[("2", "a2.tie", "From A")])];
const PROFILE_B_LST: &[(&str, &[(&str, &str, &str)])] = &[
    ("//Melee", &[("3", "b3.tie", "From B")]),
    ("//Custom", &[("9", "c9.tie", "New Section")]),
];

/// Profile with a mission file plus a list file entry for it.
async fn stocked_profile(
    fixture: &Fixture,
    name: &str,
    mission_file: &str,
    list: &[(&str, &[(&str, &str, &str)])],
) -> ModProfile {
    let mission_target = format!("MELEE/{mission_file}");
    let mission = fixture
        .stock(mission_file, name.as_bytes(), &mission_target)
        .await;
    let list_file = fixture
        .stock(&format!("{name}.lst"), &lst(list), "MELEE/mission.lst")
        .await;

    let mut profile = ModProfile::new(name);
    // List file first on purpose: application order must not depend on profile order
    profile.add_modification(FileModification::new("MELEE/mission.lst", &list_file.id));
    profile.add_modification(FileModification::new(&mission_target, &mission.id));
    profile
}

fn live_list(fixture: &Fixture) -> LstDocument {
    LstDocument::from_bytes(&fixture.read_game("MELEE/mission.lst"))
}

#[tokio::test]
async fn test_regular_files_are_applied_before_list_files() {
    let fixture = Fixture::new();
    fixture.write_game("MELEE/mission.lst", &lst(PRISTINE));
    let mut profile = stocked_profile(&fixture, "A", "a2.tie", PROFILE_A_LST).await;

    let recorder = Arc::new(Recorder::default());
    let engine = fixture.engine_with_progress(recorder.clone()).await;
    let mut operator = ProfileOperator::new(engine);

    let tally = operator.apply_profile(&mut profile, true).await.unwrap();

    assert_eq!(tally, OperationTally { succeeded: 2, failed: 0 });
    assert_eq!(recorder.paths(), vec!["MELEE/a2.tie", "MELEE/mission.lst"]);
    assert_eq!(
        recorder.finished.lock().unwrap().as_slice(),
        &[(OperationKind::Apply, 2, 0)]
    );
    assert!(profile.file_modifications.iter().all(|m| m.is_applied));
    assert!(live_list(&fixture).contains_filename("a2.tie"));
}

#[tokio::test]
async fn test_read_only_profile_is_rejected() {
    let fixture = Fixture::new();
    let file = fixture.stock("m9.tie", b"mod", "MELEE/m9.tie").await;

    let mut base = ModProfile::base_install();
    base.add_modification(FileModification::new("MELEE/m9.tie", &file.id));

    let mut operator = ProfileOperator::new(fixture.engine().await);

    assert_eq!(
        operator.apply_profile(&mut base, true).await,
        Err(ProfileOperationError::ReadOnlyProfile(base.name.clone()))
    );
    assert!(operator.switch_profile(None, &mut base, true).await.is_err());
    assert!(operator.rebuild_profile(&mut base, true).await.is_err());

    assert!(!fixture.game_path("MELEE/m9.tie").exists());
    assert!(!base.file_modifications[0].is_applied);
    assert!(!base.is_active);
}

#[tokio::test]
async fn test_switch_drops_old_profile_list_entries() {
    let fixture = Fixture::new();
    let pristine = lst(PRISTINE);
    fixture.write_game("MELEE/mission.lst", &pristine);
    let mut profile_a = stocked_profile(&fixture, "A", "a2.tie", PROFILE_A_LST).await;
    let mut profile_b = stocked_profile(&fixture, "B", "b3.tie", PROFILE_B_LST).await;

    let mut operator = ProfileOperator::new(fixture.engine().await);
    operator.apply_profile(&mut profile_a, true).await.unwrap();
    profile_a.is_active = true;

    let tally = operator
        .switch_profile(Some(&mut profile_a), &mut profile_b, true)
        .await
        .unwrap();

    assert_eq!(tally, OperationTally { succeeded: 2, failed: 0 });
    assert!(!profile_a.is_active);
    assert!(profile_b.is_active);
    assert!(profile_a.file_modifications.iter().all(|m| !m.is_applied));
    assert!(profile_b.file_modifications.iter().all(|m| m.is_applied));

    // A's mission file had nothing underneath it, so reverting removed it
    assert!(!fixture.game_path("MELEE/a2.tie").exists());
    assert_eq!(fixture.read_game("MELEE/b3.tie"), b"B");

    let (expected, _) = merge(LstDocument::from_bytes(&pristine), &LstDocument::from_bytes(&lst(PROFILE_B_LST)));
    let live = live_list(&fixture);
    assert!(!live.contains_filename("a2.tie"));
    assert_eq!(live.sections, expected.sections);
    let headers: Vec<&str> = live.sections.iter().map(|s| s.header.as_str()).collect();
    assert_eq!(headers, vec!["//Melee", "//Battle", "//Custom"]);
}

#[tokio::test]
async fn test_rebuild_equals_applying_to_pristine_base() {
    let fixture = Fixture::new();
    let pristine = lst(PRISTINE);
    fixture.write_game("MELEE/mission.lst", &pristine);
    let mut profile = stocked_profile(&fixture, "A", "a2.tie", PROFILE_A_LST).await;

    let mut operator = ProfileOperator::new(fixture.engine().await);
    operator.apply_profile(&mut profile, true).await.unwrap();
    let after_direct_apply = fixture.read_game("MELEE/mission.lst");

    // Stray edits to the live list are discarded by the rebuild
    fixture.write_game("MELEE/mission.lst", &lst(PROFILE_B_LST));

    let tally = operator.rebuild_profile(&mut profile, true).await.unwrap();

    assert!(tally.is_clean());
    assert_eq!(fixture.read_game("MELEE/mission.lst"), after_direct_apply);
    assert_eq!(fixture.read_game("MELEE/a2.tie"), b"A");

    let (expected, _) = merge(LstDocument::from_bytes(&pristine), &LstDocument::from_bytes(&lst(PROFILE_A_LST)));
    assert_eq!(live_list(&fixture).sections, expected.sections);
}

#[tokio::test]
async fn test_restore_base_installation() {
    let fixture = Fixture::new();
    let pristine = lst(PRISTINE);
    fixture.write_game("MELEE/mission.lst", &pristine);
    fixture.write_game("MELEE/a2.tie", b"stock a2");
    let mut profile = stocked_profile(&fixture, "A", "a2.tie", PROFILE_A_LST).await;

    let mut operator = ProfileOperator::new(fixture.engine().await);
    operator.apply_profile(&mut profile, true).await.unwrap();
    profile.is_active = true;

    let summary = operator.restore_base_installation(Some(&mut profile)).await;

    assert_eq!(summary.reverted, OperationTally { succeeded: 1, failed: 0 });
    assert_eq!(summary.lst_restored, 1);
    assert_eq!(fixture.read_game("MELEE/mission.lst"), pristine);
    assert_eq!(fixture.read_game("MELEE/a2.tie"), b"stock a2");
    assert!(!profile.is_active);
    assert_eq!(profile.applied_count(), 0);
}

#[tokio::test]
async fn test_failures_are_tallied_and_siblings_continue() {
    let fixture = Fixture::new();
    let good = fixture.stock("ok.tie", b"ok", "COMBAT/ok.tie").await;

    let mut profile = ModProfile::new("Mixed");
    profile.add_modification(FileModification::new("COMBAT/ghost.tie", "missing-id"));
    profile.add_modification(FileModification::new("COMBAT/ok.tie", &good.id));

    let mut operator = ProfileOperator::new(fixture.engine().await);
    let tally = operator.apply_profile(&mut profile, true).await.unwrap();

    assert_eq!(tally, OperationTally { succeeded: 1, failed: 1 });
    assert!(!profile.file_modifications[0].is_applied);
    assert!(profile.file_modifications[1].is_applied);

    let reverted = operator.revert_profile(&mut profile).await;
    assert_eq!(reverted, OperationTally { succeeded: 1, failed: 0 });
    assert!(!fixture.game_path("COMBAT/ok.tie").exists());
}

#[tokio::test]
async fn test_stacked_modifications_unwind_in_reverse() {
    let fixture = Fixture::new();
    fixture.write_game("COMBAT/shared.tie", b"stock");
    let first = fixture.stock("first.tie", b"first", "COMBAT/shared.tie").await;
    let second = fixture.stock("second.tie", b"second", "COMBAT/shared.tie").await;

    let mut profile = ModProfile::new("Stacked");
    profile.add_modification(FileModification::new("COMBAT/shared.tie", &first.id));
    profile.add_modification(FileModification::new("COMBAT/shared.tie", &second.id));

    let mut operator = ProfileOperator::new(fixture.engine().await);
    operator.apply_profile(&mut profile, true).await.unwrap();
    assert_eq!(fixture.read_game("COMBAT/shared.tie"), b"second");

    let reverted = operator.revert_profile(&mut profile).await;
    assert!(reverted.is_clean());
    assert_eq!(fixture.read_game("COMBAT/shared.tie"), b"stock");
}

#[tokio::test]
async fn test_switched_profiles_persist_through_the_store() {
    let fixture = Fixture::new();
    fixture.write_game("MELEE/mission.lst", &lst(PRISTINE));
    let profiles_dir = fixture.backups.with_file_name("Profiles");
    let mut store = ProfileStore::open(&profiles_dir).await.unwrap();

    let mut profile_a = stocked_profile(&fixture, "A", "a2.tie", PROFILE_A_LST).await;
    let mut profile_b = stocked_profile(&fixture, "B", "b3.tie", PROFILE_B_LST).await;

    let mut operator = ProfileOperator::new(fixture.engine().await);
    operator.switch_profile(None, &mut profile_a, true).await.unwrap();
    operator
        .switch_profile(Some(&mut profile_a), &mut profile_b, true)
        .await
        .unwrap();

    store.save(&mut profile_a).await.unwrap();
    store.save(&mut profile_b).await.unwrap();

    let reopened = ProfileStore::open(&profiles_dir).await.unwrap();
    assert_eq!(reopened.active().map(|p| p.name.as_str()), Some("B"));
    let stored_a = reopened.find("a").unwrap();
    assert_eq!(stored_a.applied_count(), 0);
    assert_eq!(reopened.find("B").unwrap().applied_count(), 2);
}
