//! Last-known-state store for logical devices.
//!
//! Maps device key (`model_instanceId`) to the last validated state plus a
//! signal-quality snapshot. Single logical writer (the coordinator's
//! ingestion path), many readers; subscribers are notified of discoveries
//! and updates over a broadcast channel so the hosting application never
//! polls the process pipeline directly.
//!
//! Updates are full replacements of the field map, never merges: each record
//! reflects exactly the fields present and valid in that transmission.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::schema;
use crate::signal::{DegradedSignal, SignalGrade};
use crate::validate::ValidatedRecord;

/// Subscriber channel depth; slow subscribers miss old events rather than
/// back-pressuring the ingestion path.
const EVENT_CAPACITY: usize = 64;

// =============================================================================
// Records & Events
// =============================================================================

/// Signal-quality snapshot stored alongside each device record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// RSSI in dBm.
    pub rssi: f64,
    /// SNR in dB.
    pub snr: f64,
    /// Noise floor in dBm.
    pub noise: f64,
    /// Derived quality grade.
    pub grade: SignalGrade,
}

/// Last known validated state of one logical device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device model name.
    pub model: String,
    /// Per-transmitter instance id.
    pub instance_id: String,
    /// Validated sensor readings from the most recent transmission.
    pub fields: HashMap<String, Value>,
    /// Signal quality of the most recent transmission.
    pub signal: SignalSnapshot,
    /// Decoder timestamp of the most recent transmission, or receive time.
    pub last_update: String,
}

/// Notification delivered to store subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// First sighting of a device key.
    Discovered {
        /// Device key.
        key: String,
        /// Model name.
        model: String,
        /// Instance id.
        instance_id: String,
        /// Field names this model can report, per the schema registry.
        available_fields: Vec<String>,
    },
    /// A device record was replaced with fresh data.
    Updated {
        /// Device key.
        key: String,
        /// Fields present in this transmission.
        fields: Vec<String>,
        /// Derived quality grade.
        grade: SignalGrade,
    },
    /// A device crossed the sustained-degradation threshold.
    Degraded {
        /// Device key.
        key: String,
        /// Consecutive degraded readings observed.
        consecutive: usize,
    },
}

// =============================================================================
// Store
// =============================================================================

/// Shared device-state map with change notification.
#[derive(Debug)]
pub struct DeviceStateStore {
    devices: RwLock<HashMap<String, DeviceRecord>>,
    events: broadcast::Sender<StateEvent>,
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            devices: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to discovery and update events.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Write one validated record into the store.
    ///
    /// Replaces any previous record for the device key in full. Returns
    /// `true` on the first sighting of the key, in which case a
    /// [`StateEvent::Discovered`] is emitted before the
    /// [`StateEvent::Updated`].
    pub fn apply(&self, record: ValidatedRecord, grade: SignalGrade) -> bool {
        let last_update = record
            .time
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let device = DeviceRecord {
            model: record.model.clone(),
            instance_id: record.instance_id.clone(),
            fields: record.fields.clone().into_iter().collect(),
            signal: SignalSnapshot {
                rssi: record.rssi,
                snr: record.snr,
                noise: record.noise,
                grade,
            },
            last_update,
        };

        let field_names: Vec<String> = record.fields.keys().cloned().collect();
        let discovered = {
            let mut devices = self.devices.write();
            devices.insert(record.key.clone(), device).is_none()
        };

        if discovered {
            info!(
                device = record.key.as_str(),
                model = record.model.as_str(),
                fields = field_names.join(",").as_str(),
                %grade,
                "discovered new device"
            );
            let _ = self.events.send(StateEvent::Discovered {
                key: record.key.clone(),
                model: record.model.clone(),
                instance_id: record.instance_id.clone(),
                available_fields: schema::fields_for(&record.model)
                    .iter()
                    .map(|f| f.to_string())
                    .collect(),
            });
        } else {
            debug!(device = record.key.as_str(), "updated device state");
        }

        let _ = self.events.send(StateEvent::Updated {
            key: record.key,
            fields: field_names,
            grade,
        });
        discovered
    }

    /// Forward a sustained-degradation warning to subscribers.
    ///
    /// Advisory only: the device record keeps updating normally.
    pub fn report_degraded(&self, warning: &DegradedSignal) {
        let _ = self.events.send(StateEvent::Degraded {
            key: warning.device_key.clone(),
            consecutive: warning.consecutive,
        });
    }

    /// Consistent snapshot of all device records.
    pub fn snapshot(&self) -> HashMap<String, DeviceRecord> {
        self.devices.read().clone()
    }

    /// Last known record for one device key.
    pub fn get(&self, key: &str) -> Option<DeviceRecord> {
        self.devices.read().get(key).cloned()
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether no device has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}
