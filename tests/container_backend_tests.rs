//! Tests for the mounted container backend
//!
//! These tests verify:
//! - Container creation on first initialize, reuse afterwards
//! - Unmount-with-backup rotation
//! - Corruption reported at mount time and the backup restore path
//! - Busy containers, discarded sessions, interrupted commits and
//!   interrupted backup rotations
//! - Writes over a broken container recover it first
//! - Session cleanup when initialize fails partway

use std::fs;
use std::path::PathBuf;

use durasave::backend::container::{ContainerManager, Manifest, MountMode, MANIFEST_FILE};
use durasave::backend::{ContainerBackend, DirContainerManager, OpenMode, StorageBackend};
use durasave::config::{BackendKind, Config, SyncPolicy};
use durasave::record::{frame, SlotName};
use durasave::{Record, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const CONTAINER: &str = "SAVEDATA00";

fn container_config(temp: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp.path())
        .backend(BackendKind::MountedContainer)
        .sync_policy(SyncPolicy::Always)
        .build()
}

fn setup_temp_store() -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let mut store = Store::new(container_config(&temp_dir));
    assert!(store.initialize());
    (temp_dir, store)
}

/// Store sharing its mount table with the returned manager
fn setup_shared_manager() -> (TempDir, DirContainerManager, Store) {
    let temp_dir = TempDir::new().unwrap();
    let config = container_config(&temp_dir);
    let manager = DirContainerManager::new(temp_dir.path(), SyncPolicy::Never);
    let backend = ContainerBackend::new(manager.clone(), &config);
    let mut store = Store::with_backend(config, Box::new(backend));
    assert!(store.initialize());
    (temp_dir, manager, store)
}

fn committed(temp: &TempDir) -> PathBuf {
    temp.path().join(CONTAINER)
}

fn backup(temp: &TempDir) -> PathBuf {
    temp.path().join(format!("{}.bak", CONTAINER))
}

fn old(temp: &TempDir) -> PathBuf {
    temp.path().join(format!("{}.old", CONTAINER))
}

fn read_payload(path: &std::path::Path) -> Vec<u8> {
    let data = fs::read(path).unwrap();
    frame::decode(&data).unwrap().to_vec()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_initialize_creates_sealed_container() {
    let (temp, _store) = setup_temp_store();

    assert!(committed(&temp).is_dir());
    assert!(committed(&temp).join(MANIFEST_FILE).is_file());
    assert!(!temp.path().join(format!("{}.mnt", CONTAINER)).exists());
}

#[test]
fn test_initialize_reuses_existing_container() {
    let temp = TempDir::new().unwrap();

    {
        let mut store = Store::new(container_config(&temp));
        assert!(store.initialize());
        assert!(store.save(&Record::new(b"kept".to_vec()), "save.dat"));
    }

    let mut store = Store::new(container_config(&temp));
    assert!(store.initialize());
    assert_eq!(store.load("save.dat").bytes(), b"kept");
}

#[test]
fn test_failed_initialize_terminates_service() {
    let temp = TempDir::new().unwrap();
    let config = container_config(&temp);

    // A file where the session directory must go makes the create mount fail
    fs::write(temp.path().join(format!("{}.mnt", CONTAINER)), b"in the way").unwrap();

    let mut backend = ContainerBackend::new(
        DirContainerManager::new(temp.path(), SyncPolicy::Never),
        &config,
    );

    assert!(backend.initialize().is_err());
    assert!(!backend.manager().is_initialized());
    assert!(!backend.manager().is_mounted(CONTAINER));
}

#[test]
fn test_shutdown_terminates_service() {
    let (_temp, manager, mut store) = setup_shared_manager();

    store.shutdown();

    assert!(!store.is_initialized());
    assert!(!store.save(&Record::new(b"late".to_vec()), "save.dat"));
    assert!(!manager.is_mounted(CONTAINER));
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_save_rotates_previous_state_into_backup() {
    let (temp, mut store) = setup_temp_store();

    assert!(store.save(&Record::new(b"gen1".to_vec()), "save.dat"));
    assert!(store.save(&Record::new(b"gen2".to_vec()), "save.dat"));

    let committed_bytes = fs::read(committed(&temp).join("save.dat")).unwrap();
    let backup_bytes = fs::read(backup(&temp).join("save.dat")).unwrap();

    assert_ne!(committed_bytes, backup_bytes);
    assert_eq!(store.load("save.dat").bytes(), b"gen2");
}

#[test]
fn test_slots_share_one_container() {
    let (temp, mut store) = setup_temp_store();

    store.save(&Record::new(b"one".to_vec()), "slot1");
    store.save(&Record::new(b"two".to_vec()), "slot2");

    assert!(committed(&temp).join("slot1").is_file());
    assert!(committed(&temp).join("slot2").is_file());
    assert_eq!(store.load("slot1").bytes(), b"one");
    assert_eq!(store.load("slot2").bytes(), b"two");
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_broken_container_restores_backup() {
    let (temp, mut store) = setup_temp_store();

    store.save(&Record::new(b"gen1".to_vec()), "save.dat");
    store.save(&Record::new(b"gen2".to_vec()), "save.dat");
    fs::write(committed(&temp).join("save.dat"), b"garbage").unwrap();

    let (record, report) = store.load_with_report("save.dat");

    assert_eq!(record.bytes(), b"gen1");
    assert!(report.restored_from_backup);
    assert_eq!(report.restore_attempts, 1);
}

#[test]
fn test_missing_slot_file_counts_as_broken() {
    let (temp, mut store) = setup_temp_store();

    store.save(&Record::new(b"gen1".to_vec()), "save.dat");
    store.save(&Record::new(b"gen2".to_vec()), "save.dat");
    fs::remove_file(committed(&temp).join("save.dat")).unwrap();

    assert_eq!(store.load("save.dat").bytes(), b"gen1");
}

#[test]
fn test_broken_container_and_backup_gives_up() {
    let (temp, mut store) = setup_temp_store();

    store.save(&Record::new(b"gen1".to_vec()), "save.dat");
    store.save(&Record::new(b"gen2".to_vec()), "save.dat");
    fs::write(committed(&temp).join("save.dat"), b"garbage").unwrap();
    fs::write(backup(&temp).join("save.dat"), b"more garbage").unwrap();

    let (record, report) = store.load_with_report("save.dat");

    assert!(!record.is_valid());
    assert_eq!(report.restore_attempts, 1);
}

#[test]
fn test_broken_container_without_backup() {
    let (temp, mut store) = setup_temp_store();

    fs::write(committed(&temp).join(MANIFEST_FILE), b"xx").unwrap();

    let (record, report) = store.load_with_report("save.dat");

    assert!(!record.is_valid());
    assert_eq!(report.restore_attempts, 0);
}

#[test]
fn test_save_over_broken_container_restores_backup_first() {
    let (temp, mut store) = setup_temp_store();

    store.save(&Record::new(b"gen1".to_vec()), "save.dat");
    store.save(&Record::new(b"gen2".to_vec()), "save.dat");
    store.save(&Record::new(b"other".to_vec()), "other.dat");
    fs::write(committed(&temp).join("save.dat"), b"garbage").unwrap();

    assert!(store.save(&Record::new(b"gen3".to_vec()), "save.dat"));
    assert_eq!(store.load("save.dat").bytes(), b"gen3");

    // Restored state became the backup; the broken one was never demoted
    assert_eq!(read_payload(&backup(&temp).join("save.dat")), b"gen2");
    assert!(!backup(&temp).join("other.dat").exists());
}

#[test]
fn test_save_over_broken_container_without_backup_recreates_it() {
    let (temp, mut store) = setup_temp_store();

    store.save(&Record::new(b"gen1".to_vec()), "save.dat");
    fs::remove_dir_all(backup(&temp)).unwrap();
    fs::write(committed(&temp).join("save.dat"), b"garbage").unwrap();

    assert!(store.save(&Record::new(b"gen2".to_vec()), "save.dat"));
    assert_eq!(store.load("save.dat").bytes(), b"gen2");
}

#[test]
fn test_save_over_broken_container_and_backup_recreates_it() {
    let (temp, mut store) = setup_temp_store();

    store.save(&Record::new(b"gen1".to_vec()), "save.dat");
    store.save(&Record::new(b"gen2".to_vec()), "save.dat");
    fs::write(committed(&temp).join("save.dat"), b"garbage").unwrap();
    fs::write(backup(&temp).join("save.dat"), b"more garbage").unwrap();

    assert!(!store.load("save.dat").is_valid());

    assert!(store.save(&Record::new(b"gen3".to_vec()), "save.dat"));
    assert_eq!(store.load("save.dat").bytes(), b"gen3");
    assert!(store.delete("save.dat"));
}

#[test]
fn test_missing_slot_in_healthy_container() {
    let (_temp, mut store) = setup_temp_store();

    let (record, report) = store.load_with_report("nonexistent");

    assert!(!record.is_valid());
    assert_eq!(report.restore_attempts, 0);
}

// =============================================================================
// Session Tests
// =============================================================================

#[test]
fn test_busy_container_fails_save() {
    let (_temp, manager, mut store) = setup_shared_manager();

    let mut other = manager.clone();
    other.initialize().unwrap();
    let mount = other.mount(CONTAINER, MountMode::ReadOnly).unwrap();

    assert!(!store.save(&Record::new(b"blocked".to_vec()), "save.dat"));

    other.unmount(mount).unwrap();
    assert!(store.save(&Record::new(b"free".to_vec()), "save.dat"));
}

#[test]
fn test_dropped_session_discards_writes() {
    let temp = TempDir::new().unwrap();
    let config = container_config(&temp);
    let mut backend = ContainerBackend::new(
        DirContainerManager::new(temp.path(), SyncPolicy::Never),
        &config,
    );
    backend.initialize().unwrap();
    let slot = SlotName::parse("save.dat").unwrap();

    {
        let mut session = backend.open(&slot, OpenMode::ReadWrite).unwrap();
        session.write(b"never committed").unwrap();
    }

    assert!(!temp.path().join(format!("{}.mnt", CONTAINER)).exists());
    assert!(!committed(&temp).join("save.dat").exists());
    assert!(!backend.manager().is_mounted(CONTAINER));
}

#[test]
fn test_interrupted_commit_rolls_back() {
    let (temp, mut store) = setup_temp_store();

    store.save(&Record::new(b"gen1".to_vec()), "save.dat");

    // Process died after moving the committed state aside
    fs::rename(committed(&temp), old(&temp)).unwrap();

    assert_eq!(store.load("save.dat").bytes(), b"gen1");
    assert!(!old(&temp).exists());
}

#[test]
fn test_crash_between_swap_and_demotion() {
    let temp = TempDir::new().unwrap();

    {
        let mut store = Store::new(container_config(&temp));
        assert!(store.initialize());
        store.save(&Record::new(b"gen1".to_vec()), "save.dat");
        store.save(&Record::new(b"gen2".to_vec()), "save.dat");
    }

    // Process died with gen3 swapped in and gen2 still in `.old`
    fs::rename(committed(&temp), old(&temp)).unwrap();
    fs::create_dir(committed(&temp)).unwrap();
    fs::write(committed(&temp).join("save.dat"), frame::encode(b"gen3").unwrap()).unwrap();
    Manifest::seal(&committed(&temp), false).unwrap();

    let mut store = Store::new(container_config(&temp));
    assert!(store.initialize());

    assert!(!old(&temp).exists());
    assert_eq!(read_payload(&backup(&temp).join("save.dat")), b"gen2");
    assert_eq!(store.load("save.dat").bytes(), b"gen3");

    fs::write(committed(&temp).join("save.dat"), b"garbage").unwrap();
    assert_eq!(store.load("save.dat").bytes(), b"gen2");
}

#[test]
fn test_delete_slot_keeps_container() {
    let (temp, mut store) = setup_temp_store();

    store.save(&Record::new(b"gen1".to_vec()), "save.dat");
    assert!(store.delete("save.dat"));

    assert!(committed(&temp).is_dir());
    assert!(!committed(&temp).join("save.dat").exists());
    assert!(!store.load("save.dat").is_valid());
}

#[test]
fn test_delete_missing_slot_releases_mount() {
    let (_temp, manager, mut store) = setup_shared_manager();

    assert!(store.delete("never-saved"));
    assert!(!manager.is_mounted(CONTAINER));
    assert!(store.save(&Record::new(b"after".to_vec()), "save.dat"));
}

#[test]
fn test_manifest_name_is_reserved() {
    let (_temp, mut store) = setup_temp_store();
    assert!(!store.save(&Record::new(b"x".to_vec()), MANIFEST_FILE));
}
