#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use blackeye_lib::{
    backend::{Backend, DeviceRecord, LocationReading},
    location::{Accuracy, LocationFix, LocationSource, PermissionOutcome},
    storage::{KeyValueStore, MemoryStore},
    transmitter::{TransmitterController, TransmitterSettings},
};
use chrono::Utc;
use tokio::sync::Notify;

/// Parks a mock call until the test lets it continue.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

struct LocationInner {
    granted: AtomicBool,
    permission_error: Mutex<Option<String>>,
    fix_error: Mutex<Option<String>>,
    permission_calls: AtomicUsize,
    fix_calls: AtomicUsize,
}

#[derive(Clone)]
pub struct MockLocation {
    inner: Arc<LocationInner>,
}

impl MockLocation {
    pub fn granted() -> Self {
        Self {
            inner: Arc::new(LocationInner {
                granted: AtomicBool::new(true),
                permission_error: Mutex::new(None),
                fix_error: Mutex::new(None),
                permission_calls: AtomicUsize::new(0),
                fix_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn denied() -> Self {
        let mock = Self::granted();
        mock.set_granted(false);
        mock
    }

    pub fn set_granted(&self, granted: bool) {
        self.inner.granted.store(granted, Ordering::SeqCst);
    }

    pub fn fail_permission(&self, message: &str) {
        *self.inner.permission_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_fix(&self, message: &str) {
        *self.inner.fix_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn permission_calls(&self) -> usize {
        self.inner.permission_calls.load(Ordering::SeqCst)
    }

    pub fn fix_calls(&self) -> usize {
        self.inner.fix_calls.load(Ordering::SeqCst)
    }
}

impl LocationSource for MockLocation {
    async fn request_foreground_permission(&self) -> Result<PermissionOutcome> {
        self.inner.permission_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.inner.permission_error.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }
        if self.inner.granted.load(Ordering::SeqCst) {
            Ok(PermissionOutcome::Granted)
        } else {
            Ok(PermissionOutcome::Denied)
        }
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<LocationFix> {
        assert_eq!(accuracy, Accuracy::High);
        self.inner.fix_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.inner.fix_error.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }
        Ok(LocationFix {
            latitude: 52.520008,
            longitude: 13.404954,
            accuracy: Some(4.2),
            speed: Some(0.0),
            captured_at: Utc::now(),
        })
    }
}

#[derive(Default)]
struct BackendInner {
    devices: Mutex<HashMap<String, String>>,
    upserts: Mutex<Vec<(String, String)>>,
    inserts: Mutex<Vec<LocationReading>>,
    fail_upsert: AtomicBool,
    fail_insert: AtomicBool,
    insert_gate: Mutex<Option<Arc<Gate>>>,
}

/// In-memory stand-in for the hosted tables. Upserts are keyed on the
/// identifier, so the same identifier always maps to the same id.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<BackendInner>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upsert(&self, fail: bool) {
        self.inner.fail_upsert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_insert(&self, fail: bool) {
        self.inner.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn gate_inserts(&self, gate: Arc<Gate>) {
        *self.inner.insert_gate.lock().unwrap() = Some(gate);
    }

    pub fn upserts(&self) -> Vec<(String, String)> {
        self.inner.upserts.lock().unwrap().clone()
    }

    pub fn inserts(&self) -> Vec<LocationReading> {
        self.inner.inserts.lock().unwrap().clone()
    }
}

impl Backend for MockBackend {
    async fn upsert_device(&self, identifier: &str, display_name: &str) -> Result<DeviceRecord> {
        self.inner
            .upserts
            .lock()
            .unwrap()
            .push((identifier.to_string(), display_name.to_string()));

        if self.inner.fail_upsert.load(Ordering::SeqCst) {
            return Err(anyhow!("Network error during device registration"));
        }

        let mut devices = self.inner.devices.lock().unwrap();
        let next = devices.len() + 1;
        let id = devices
            .entry(identifier.to_string())
            .or_insert_with(|| format!("backend-{next}"))
            .clone();

        Ok(DeviceRecord {
            id,
            identifier: identifier.to_string(),
            display_name: display_name.to_string(),
        })
    }

    async fn insert_location(&self, reading: &LocationReading) -> Result<()> {
        let gate = self.inner.insert_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        if self.inner.fail_insert.load(Ordering::SeqCst) {
            return Err(anyhow!("Network error"));
        }
        self.inner.inserts.lock().unwrap().push(reading.clone());
        Ok(())
    }
}

pub struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(anyhow!("storage unavailable"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("storage unavailable"))
    }
}

pub const RESET_DELAY: Duration = Duration::from_millis(3000);
pub const INTERVAL: Duration = Duration::from_secs(60);

pub fn settings() -> TransmitterSettings {
    TransmitterSettings {
        interval: INTERVAL,
        reset_delay: RESET_DELAY,
    }
}

pub type TestController = TransmitterController<MockLocation, MockBackend, Arc<MemoryStore>>;

pub fn controller(
    location: &MockLocation,
    backend: &MockBackend,
    store: &Arc<MemoryStore>,
) -> TestController {
    TransmitterController::new(
        location.clone(),
        backend.clone(),
        Arc::clone(store),
        settings(),
    )
}
