//! Tests for Store
//!
//! These tests verify, for both backends:
//! - Round trip of saved bytes
//! - Repeated saves and backup survival
//! - Invalid and unknown slots
//! - The score scenario: save 5, save 7, damage primary, load 5
//! - Lifecycle (initialize / shutdown / drop)

use std::fs;
use std::path::PathBuf;

use durasave::config::{BackendKind, Config, SyncPolicy};
use durasave::{Record, SaveGame, SaveOutcome, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const BACKENDS: [BackendKind; 2] = [BackendKind::LocalFile, BackendKind::MountedContainer];

fn setup_temp_store(kind: BackendKind) -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .backend(kind)
        .sync_policy(SyncPolicy::Never)
        .build();
    let mut store = Store::new(config);
    assert!(store.initialize(), "{:?} failed to initialize", kind);
    (temp_dir, store)
}

/// Where the primary copy of `slot` lives for a backend
fn primary_path(temp: &TempDir, kind: BackendKind, slot: &str) -> PathBuf {
    match kind {
        BackendKind::LocalFile => temp.path().join(slot),
        BackendKind::MountedContainer => temp.path().join("SAVEDATA00").join(slot),
    }
}

fn score_record(score: u32) -> Record {
    SaveGame::new(score).to_record().unwrap()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_round_trip() {
    for kind in BACKENDS {
        let (_temp, mut store) = setup_temp_store(kind);
        let payload: Vec<u8> = (0..=255).collect();

        assert!(store.save(&Record::new(payload.clone()), "slot"), "{:?}", kind);

        let record = store.load("slot");
        assert!(record.is_valid(), "{:?}", kind);
        assert_eq!(record.len(), payload.len());
        assert_eq!(record.into_bytes(), payload, "{:?}", kind);
    }
}

#[test]
fn test_round_trip_survives_restart() {
    for kind in BACKENDS {
        let temp = TempDir::new().unwrap();
        let config = Config::builder().data_dir(temp.path()).backend(kind).build();

        {
            let mut store = Store::new(config.clone());
            assert!(store.initialize());
            assert!(store.save(&Record::new(b"persisted".to_vec()), "slot"));
            store.shutdown();
        }

        let mut store = Store::new(config);
        assert!(store.initialize());
        assert_eq!(store.load("slot").bytes(), b"persisted", "{:?}", kind);
    }
}

#[test]
fn test_repeated_save_is_idempotent() {
    for kind in BACKENDS {
        let (temp, mut store) = setup_temp_store(kind);
        let record = Record::new(b"same".to_vec());

        assert!(store.save(&record, "slot"));
        assert!(store.save(&record, "slot"));
        assert_eq!(store.load("slot").bytes(), b"same");

        // The backup generation is the first write of the same bytes
        fs::remove_file(primary_path(&temp, kind, "slot")).unwrap();
        assert_eq!(store.load("slot").bytes(), b"same", "{:?}", kind);
    }
}

#[test]
fn test_backup_survives_deleted_primary() {
    for kind in BACKENDS {
        let (temp, mut store) = setup_temp_store(kind);

        assert!(store.save(&Record::new(b"B1".to_vec()), "slot"));
        assert!(store.save(&Record::new(b"B2".to_vec()), "slot"));
        fs::remove_file(primary_path(&temp, kind, "slot")).unwrap();

        let (record, report) = store.load_with_report("slot");
        assert_eq!(record.bytes(), b"B1", "{:?}", kind);
        assert!(report.restored_from_backup);
    }
}

// =============================================================================
// Score Scenario
// =============================================================================

#[test]
fn test_score_scenario_recovers_previous_generation() {
    for kind in BACKENDS {
        let (temp, mut store) = setup_temp_store(kind);

        assert!(store.save(&score_record(5), "save.dat"));
        assert!(store.save(&score_record(7), "save.dat"));
        fs::write(primary_path(&temp, kind, "save.dat"), b"\xff\xff").unwrap();

        let record = store.load("save.dat");
        assert!(record.is_valid(), "{:?}", kind);
        assert_eq!(SaveGame::from_record(&record).unwrap(), SaveGame::new(5), "{:?}", kind);
    }
}

#[test]
fn test_score_scenario_without_damage_loads_latest() {
    for kind in BACKENDS {
        let (_temp, mut store) = setup_temp_store(kind);

        store.save(&score_record(5), "save.dat");
        store.save(&score_record(7), "save.dat");

        let game = SaveGame::from_record(&store.load("save.dat")).unwrap();
        assert_eq!(game.score, 7, "{:?}", kind);
    }
}

// =============================================================================
// Invalid Input Tests
// =============================================================================

#[test]
fn test_load_nonexistent_slot_is_invalid() {
    for kind in BACKENDS {
        let (_temp, mut store) = setup_temp_store(kind);

        let record = store.load("nonexistent");
        assert!(!record.is_valid(), "{:?}", kind);
        assert!(record.is_empty());
        assert!(record.bytes().is_empty());
    }
}

#[test]
fn test_empty_record_is_rejected() {
    for kind in BACKENDS {
        let (_temp, mut store) = setup_temp_store(kind);

        let outcome = store.save_with_outcome(&Record::invalid(), "slot");
        assert_eq!(outcome, SaveOutcome::Rejected);
        assert!(!store.load("slot").is_valid(), "{:?}", kind);
    }
}

#[test]
fn test_path_like_slot_names_are_rejected() {
    for kind in BACKENDS {
        let (temp, mut store) = setup_temp_store(kind);
        let record = Record::new(b"escape".to_vec());

        assert!(!store.save(&record, "../outside"), "{:?}", kind);
        assert!(!store.save(&record, ""), "{:?}", kind);
        assert!(!store.load("../outside").is_valid());
        assert!(!temp.path().parent().unwrap().join("outside").exists());
    }
}

#[test]
fn test_save_outcome_reports_commit() {
    for kind in BACKENDS {
        let (_temp, mut store) = setup_temp_store(kind);

        let outcome = store.save_with_outcome(&Record::new(b"x".to_vec()), "slot");
        assert_eq!(outcome, SaveOutcome::Committed, "{:?}", kind);
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_operations_before_initialize_fail() {
    for kind in BACKENDS {
        let temp = TempDir::new().unwrap();
        let config = Config::builder().data_dir(temp.path()).backend(kind).build();
        let mut store = Store::new(config);

        assert!(!store.is_initialized());
        assert!(!store.save(&Record::new(b"x".to_vec()), "slot"));
        assert!(!store.load("slot").is_valid());
        assert!(!store.delete("slot"));

        let (_, report) = store.load_with_report("slot");
        assert!(report.failure.unwrap().contains("not initialized"));
    }
}

#[test]
fn test_invalid_config_fails_initialize() {
    let temp = TempDir::new().unwrap();

    let configs = [
        Config::builder().data_dir(temp.path()).staging_name("../temp.dat").build(),
        Config::builder().data_dir(temp.path()).staging_name("").build(),
        Config::builder()
            .data_dir(temp.path())
            .backend(BackendKind::MountedContainer)
            .container_dir_name("a/b")
            .build(),
        Config::builder().data_dir(temp.path()).expected_len(0).build(),
        Config::builder().data_dir("").build(),
    ];

    for config in configs {
        assert!(config.validate().is_err(), "{:?}", config);

        let mut store = Store::new(config);
        assert!(!store.initialize());
        assert!(!store.is_initialized());
    }

    assert!(Config::builder().data_dir(temp.path()).build().validate().is_ok());
}

#[test]
fn test_initialize_is_idempotent() {
    for kind in BACKENDS {
        let (_temp, mut store) = setup_temp_store(kind);

        assert!(store.initialize());
        assert!(store.initialize());
        assert!(store.save(&Record::new(b"x".to_vec()), "slot"), "{:?}", kind);
    }
}

#[test]
fn test_shutdown_then_reinitialize() {
    for kind in BACKENDS {
        let (_temp, mut store) = setup_temp_store(kind);

        assert!(store.save(&Record::new(b"before".to_vec()), "slot"));
        store.shutdown();
        store.shutdown();
        assert!(!store.load("slot").is_valid());

        assert!(store.initialize());
        assert_eq!(store.load("slot").bytes(), b"before", "{:?}", kind);
    }
}

#[test]
fn test_backend_selection_follows_config() {
    let (_temp, store) = setup_temp_store(BackendKind::LocalFile);
    assert_eq!(store.backend_name(), "local-file");

    let (_temp, store) = setup_temp_store(BackendKind::MountedContainer);
    assert_eq!(store.backend_name(), "mounted-container");
}

#[test]
fn test_open_path_uses_local_files() {
    let temp = TempDir::new().unwrap();
    let mut store = Store::open_path(temp.path());

    assert!(store.initialize());
    assert!(store.save(&Record::new(b"x".to_vec()), "slot"));
    assert!(temp.path().join("slot").is_file());
    assert_eq!(store.config().data_dir, temp.path());
}
