//! Snapshot-file store tests: reopen, corruption detection, and an engine
//! restart that restores regions from disk.

#![cfg(feature = "persistent")]

use std::fs;
use std::sync::Arc;

use tempfile::tempdir;

use geofence::storage::{open_reminder_store, PersistentConfig};
use geofence::{
    AuthorizationState, EngineConfig, GeofenceEngine, NewReminder, RecordingSink, ReminderStore,
    SimulatedRegionMonitor, StorageError,
};

fn draft(name: &str, lat: f64) -> NewReminder {
    NewReminder {
        location_id: name.to_lowercase(),
        name: name.to_string(),
        latitude: lat,
        longitude: -122.0,
        radius: 120.0,
        category: "Test".to_string(),
        note: format!("note for {name}"),
    }
}

#[test]
fn mutations_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reminders.geof");

    let (kept, toggled) = {
        let store = open_reminder_store(&path, None).unwrap();
        let kept = store.create(draft("Library", 37.33)).unwrap();
        let toggled = store.create(draft("Gym", 37.34)).unwrap();
        let deleted = store.create(draft("Cafe", 37.35)).unwrap();
        assert!(store.update(toggled.id, false).unwrap());
        assert!(store.delete(deleted.id).unwrap());
        (kept, toggled)
    };

    let store = open_reminder_store(&path, None).unwrap();
    let all = store.fetch_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], kept);
    assert_eq!(all[1].id, toggled.id);
    assert!(!all[1].is_active);
    assert_eq!(all[1].note, "note for Gym");
}

#[test]
fn corrupted_snapshot_is_detected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reminders.geof");
    {
        let store = open_reminder_store(&path, Some(PersistentConfig { sync_on_write: false })).unwrap();
        store.create(draft("Library", 37.33)).unwrap();
    }

    let mut bytes = fs::read(&path).unwrap();
    // last byte of the JSON body, just before the CRC
    let idx = bytes.len() - 5;
    bytes[idx] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let err = open_reminder_store(&path, None).unwrap_err();
    assert!(matches!(err, StorageError::Corrupted(_)), "got {err:?}");
}

#[test]
fn wrong_magic_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reminders.geof");
    fs::write(&path, b"NOPE\x01garbage").unwrap();
    assert!(matches!(open_reminder_store(&path, None), Err(StorageError::Corrupted(_))));
}

#[test]
fn engine_restores_regions_after_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reminders.geof");

    let id = {
        let store = Arc::new(open_reminder_store(&path, None).unwrap());
        let monitor = Arc::new(SimulatedRegionMonitor::with_authorization(20, AuthorizationState::Always));
        let engine =
            GeofenceEngine::new(EngineConfig::default(), store, monitor.clone(), Arc::new(RecordingSink::new())).unwrap();
        let reminder = engine.create_reminder(draft("Library", 37.33)).unwrap();
        engine.sync().unwrap();
        assert!(monitor.region(reminder.id).is_some());
        reminder.id
    };

    // a fresh monitor, as after a device restart that dropped every region
    let store = Arc::new(open_reminder_store(&path, None).unwrap());
    let monitor = Arc::new(SimulatedRegionMonitor::with_authorization(20, AuthorizationState::Always));
    let engine = GeofenceEngine::new(EngineConfig::default(), store, monitor.clone(), Arc::new(RecordingSink::new())).unwrap();
    monitor.attach(engine.callbacks());
    engine.sync().unwrap();

    assert_eq!(engine.reminders().len(), 1);
    assert!(monitor.region(id).is_some());
    assert!(engine.registered_regions().contains(&id));
}
