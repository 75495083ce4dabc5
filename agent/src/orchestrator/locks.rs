//! Per-device exclusion for test runs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while a test runs against a device; releases on drop
pub type DeviceGuard = OwnedMutexGuard<()>;

/// One lock per device serial
#[derive(Default)]
pub struct DeviceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `serial` without waiting. `None` when it is held.
    pub fn try_acquire(&self, serial: &str) -> Option<DeviceGuard> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(serial.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.try_lock_owned().ok()
    }
}
