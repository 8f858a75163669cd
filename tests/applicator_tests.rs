//! Integration tests for ModApplicator and BackupRegistry
//!
//! These tests verify:
//! - Regular files revert to byte-identical content
//! - List files are captured once, then merged
//! - Per-file backups are named, listed and pruned
//! - Game paths resolve case-insensitively
//! - The registry survives reopening and tolerates missing captures

mod common;

use common::{Fixture, file_names, lst};
use hydrospanner::FileModification;
use hydrospanner::services::{
    ApplyOutcome, BASE_STORE_DIR, BackupRegistry, LstDocument, ModificationError, REGISTRY_FILE, RevertOutcome,
};
use std::fs;

const PRISTINE_MELEE: &[(&str, &[(&str, &str, &str)])] = &[("//Header A", &[("1", "M1.TIE", "Name1")])];
const MOD_MELEE: &[(&str, &[(&str, &str, &str)])] = &[("//Header A", &[("2", "M2.TIE", "Name2")])];

#[tokio::test]
async fn test_apply_then_revert_restores_original_bytes() {
    let fixture = Fixture::new();
    let original = b"stock battle file\x00\x01\x02".to_vec();
    fixture.write_game("BATTLE/b1.tie", &original);
    let file = fixture.stock("b1.tie", b"modded battle file", "BATTLE/b1.tie").await;

    let mut engine = fixture.engine().await;
    let mut modification = FileModification::new("BATTLE/b1.tie", &file.id);

    assert!(engine.apply(&mut modification, true).await);
    assert!(modification.is_applied);
    assert_eq!(fixture.read_game("BATTLE/b1.tie"), b"modded battle file");
    let backup = modification.backup_path.clone().expect("backup recorded");
    assert!(backup.contains(&modification.id));

    assert!(engine.revert(&mut modification).await);
    assert!(!modification.is_applied);
    assert_eq!(fixture.read_game("BATTLE/b1.tie"), original);
}

#[tokio::test]
async fn test_revert_without_backup_deletes_new_file() {
    let fixture = Fixture::new();
    let file = fixture.stock("new.tie", b"brand new", "COMBAT/new.tie").await;

    let mut engine = fixture.engine().await;
    let mut modification = FileModification::new("COMBAT/new.tie", &file.id);

    let outcome = engine.try_apply(&mut modification, true).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::Copied { backup: None });
    assert!(modification.backup_path.is_none());

    let reverted = engine.try_revert(&mut modification).await.unwrap();
    assert_eq!(reverted, RevertOutcome::Deleted);
    assert!(!fixture.game_path("COMBAT/new.tie").exists());

    // Nothing left: reported, but the modification is still marked unapplied
    modification.is_applied = true;
    assert!(matches!(
        engine.try_revert(&mut modification).await,
        Err(ModificationError::NothingToRevert(_))
    ));
    assert!(!modification.is_applied);
}

#[tokio::test]
async fn test_lst_is_captured_then_merged() {
    let fixture = Fixture::new();
    let pristine = lst(PRISTINE_MELEE);
    fixture.write_game("MELEE/mission.lst", &pristine);
    let file = fixture.stock("mission.lst", &lst(MOD_MELEE), "MELEE/mission.lst").await;

    let mut engine = fixture.engine().await;
    let mut modification = FileModification::new("MELEE/mission.lst", &file.id);

    let outcome = engine.try_apply(&mut modification, true).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::LstMerged { missions_added: 1 });
    // List files never get per-file backups
    assert!(modification.backup_path.is_none());

    assert!(engine.registry().contains("melee/MISSION.LST"));
    let capture = fixture.backups.join(BASE_STORE_DIR).join("MELEE/mission.lst");
    assert_eq!(fs::read(&capture).unwrap(), pristine);

    let live = LstDocument::from_bytes(&fixture.read_game("MELEE/mission.lst"));
    assert_eq!(live.sections.len(), 1);
    let order: Vec<&str> = live.sections[0]
        .missions
        .iter()
        .map(|m| m.filename.as_str())
        .collect();
    assert_eq!(order, vec!["M1.TIE", "M2.TIE"]);

    // Applying the same list again adds nothing
    let again = engine.try_apply(&mut modification, true).await.unwrap();
    assert_eq!(again, ApplyOutcome::LstMerged { missions_added: 0 });

    assert_eq!(engine.restore_all_base().await, 1);
    assert_eq!(fixture.read_game("MELEE/mission.lst"), pristine);
}

#[tokio::test]
async fn test_lst_without_live_file_is_copied_verbatim() {
    let fixture = Fixture::new();
    let contents = lst(MOD_MELEE);
    let file = fixture.stock("extra.lst", &contents, "TOURN/extra.lst").await;

    let mut engine = fixture.engine().await;
    let mut modification = FileModification::new("TOURN/extra.lst", &file.id);

    let outcome = engine.try_apply(&mut modification, false).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::LstCopied);
    assert_eq!(fixture.read_game("TOURN/extra.lst"), contents);
    assert!(engine.registry().is_empty());
}

#[tokio::test]
async fn test_lst_revert_is_refused() {
    let fixture = Fixture::new();
    fixture.write_game("MELEE/mission.lst", &lst(PRISTINE_MELEE));
    let file = fixture.stock("mission.lst", &lst(MOD_MELEE), "MELEE/mission.lst").await;

    let mut engine = fixture.engine().await;
    let mut modification = FileModification::new("MELEE/mission.lst", &file.id);
    assert!(engine.apply(&mut modification, true).await);

    assert!(matches!(
        engine.try_revert(&mut modification).await,
        Err(ModificationError::LstRevertRefused(_))
    ));
    assert!(!engine.revert(&mut modification).await);
    assert!(modification.is_applied);
}

#[tokio::test]
async fn test_target_directory_casing_on_disk_wins() {
    let fixture = Fixture::new();
    fixture.write_game("Melee/m1.tie", b"stock");
    let file = fixture.stock("m1.tie", b"modded", "MELEE/M1.TIE").await;

    let mut engine = fixture.engine().await;
    let mut modification = FileModification::new("MELEE/M1.TIE", &file.id);

    assert!(engine.apply(&mut modification, false).await);
    assert_eq!(fixture.read_game("Melee/m1.tie"), b"modded");
    assert_eq!(file_names(&fixture.game), vec!["Melee".to_string()]);
    assert_eq!(file_names(&fixture.game.join("Melee")), vec!["m1.tie".to_string()]);
}

#[tokio::test]
async fn test_apply_failures_are_reported_not_raised() {
    let fixture = Fixture::new();
    let file = fixture.stock("ok.tie", b"ok", "COMBAT/ok.tie").await;
    let mut engine = fixture.engine().await;

    let mut unknown = FileModification::new("COMBAT/ghost.tie", "no-such-id");
    assert!(!engine.apply(&mut unknown, true).await);
    assert!(!unknown.is_applied);
    assert!(matches!(
        engine.try_apply(&mut unknown, true).await,
        Err(ModificationError::WarehouseFileNotFound(_))
    ));

    let mut escaping = FileModification::new("../outside.tie", &file.id);
    assert!(matches!(
        engine.try_apply(&mut escaping, true).await,
        Err(ModificationError::InvalidTargetPath(_))
    ));

    fs::remove_file(&file.storage_path).unwrap();
    let mut orphaned = FileModification::new("COMBAT/ok.tie", &file.id);
    assert!(matches!(
        engine.try_apply(&mut orphaned, true).await,
        Err(ModificationError::SourceMissing(_))
    ));

    assert_eq!(
        engine
            .metrics()
            .modifications_failed
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_verify_detects_changed_target() {
    let fixture = Fixture::new();
    fixture.write_game("MELEE/mission.lst", &lst(PRISTINE_MELEE));
    let regular = fixture.stock("b1.tie", b"modded", "BATTLE/b1.tie").await;
    let list = fixture.stock("mission.lst", &lst(MOD_MELEE), "MELEE/mission.lst").await;

    let mut engine = fixture.engine().await;
    let mut regular_mod = FileModification::new("BATTLE/b1.tie", &regular.id);
    let mut list_mod = FileModification::new("MELEE/mission.lst", &list.id);
    assert!(engine.apply(&mut regular_mod, true).await);
    assert!(engine.apply(&mut list_mod, true).await);

    assert!(engine.verify(&regular_mod).await);
    assert!(engine.verify(&list_mod).await);

    fixture.write_game("BATTLE/b1.tie", b"tampered");
    engine.restore_all_base().await;

    assert!(!engine.verify(&regular_mod).await);
    assert!(!engine.verify(&list_mod).await);
}

#[tokio::test]
async fn test_cleanup_keeps_newest_backups() {
    let fixture = Fixture::new();
    let engine = fixture.engine().await;

    let stamps = ["20240101_000000", "20240102_000000", "20240103_000000", "20240104_000000"];
    for stamp in stamps {
        fs::write(fixture.backups.join(format!("mod-1_{stamp}_b1.tie")), stamp).unwrap();
    }
    fs::write(fixture.backups.join("mod-10_20240101_000000_b1.tie"), "other").unwrap();
    fs::write(fixture.backups.join("mod-1_notes.txt"), "not a backup").unwrap();

    assert_eq!(engine.list_backups("mod-1").await.unwrap().len(), 4);
    assert_eq!(engine.cleanup_old_backups("mod-1", 2).await.unwrap(), 2);

    let remaining: Vec<String> = file_names(&fixture.backups)
        .into_iter()
        .filter(|n| n.ends_with(".tie") || n.ends_with(".txt"))
        .collect();
    assert_eq!(
        remaining,
        vec![
            "mod-10_20240101_000000_b1.tie".to_string(),
            "mod-1_20240103_000000_b1.tie".to_string(),
            "mod-1_20240104_000000_b1.tie".to_string(),
            "mod-1_notes.txt".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_registry_capture_is_idempotent() {
    let fixture = Fixture::new();
    let pristine = lst(PRISTINE_MELEE);
    fixture.write_game("MELEE/mission.lst", &pristine);

    let mut registry = BackupRegistry::open(&fixture.backups, &fixture.game).await.unwrap();
    assert!(registry.ensure_base_backup("MELEE/mission.lst").await.unwrap());
    let registry_text = fs::read_to_string(registry.registry_path()).unwrap();
    let capture_path = registry.backup_path_for("MELEE/mission.lst").unwrap();

    // The live file changes, but the second call must not recapture it
    fixture.write_game("MELEE/mission.lst", &lst(MOD_MELEE));
    assert!(registry.ensure_base_backup("melee/mission.lst").await.unwrap());

    assert_eq!(registry.len(), 1);
    assert_eq!(fs::read_to_string(registry.registry_path()).unwrap(), registry_text);
    assert_eq!(fs::read(&capture_path).unwrap(), pristine);
    assert_eq!(registry.registry_path(), fixture.backups.join(BASE_STORE_DIR).join(REGISTRY_FILE));

    let reopened = BackupRegistry::open(&fixture.backups, &fixture.game).await.unwrap();
    assert_eq!(reopened.entries(), vec!["MELEE/mission.lst".to_string()]);
}

#[tokio::test]
async fn test_registry_skips_missing_live_file() {
    let fixture = Fixture::new();
    let mut registry = BackupRegistry::open(&fixture.backups, &fixture.game).await.unwrap();

    assert!(!registry.ensure_base_backup("MELEE/absent.lst").await.unwrap());
    assert!(registry.is_empty());
    assert!(!registry.restore("MELEE/absent.lst").await.unwrap());
}

#[tokio::test]
async fn test_missing_capture_keeps_registry_entry() {
    let fixture = Fixture::new();
    fixture.write_game("MELEE/mission.lst", &lst(PRISTINE_MELEE));

    let mut registry = BackupRegistry::open(&fixture.backups, &fixture.game).await.unwrap();
    registry.ensure_base_backup("MELEE/mission.lst").await.unwrap();
    fs::remove_file(registry.backup_path_for("MELEE/mission.lst").unwrap()).unwrap();

    assert!(!registry.restore("MELEE/mission.lst").await.unwrap());
    assert_eq!(registry.restore_all().await, 0);
    assert!(registry.contains("MELEE/mission.lst"));
    assert_eq!(registry.missing_backups().await, vec!["MELEE/mission.lst".to_string()]);

    assert!(registry.release("MELEE/mission.lst").await.unwrap());
    assert!(registry.is_empty());
}
