//! Signal-quality evaluation and per-device degradation tracking.
//!
//! Every received transmission carries RSSI, SNR, and noise-floor readings.
//! [`evaluate`] maps those onto a [`SignalGrade`] by testing four ordered
//! threshold tiers; [`SignalTracker`] keeps a bounded per-device history and
//! raises a warning when a device has been poor or unusable for five
//! consecutive readings.

use std::collections::HashMap;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Readings kept per device for trend detection.
const HISTORY_LEN: usize = 10;

/// Consecutive poor/unusable readings that trigger the degradation warning.
const DEGRADED_WINDOW: usize = 5;

// =============================================================================
// Grading
// =============================================================================

/// Signal quality classification for one received transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalGrade {
    Excellent,
    Good,
    Fair,
    Poor,
    Unusable,
}

impl SignalGrade {
    /// Whether this grade counts toward the degradation window.
    pub fn is_degraded(self) -> bool {
        matches!(self, SignalGrade::Poor | SignalGrade::Unusable)
    }
}

impl std::fmt::Display for SignalGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SignalGrade::Excellent => "excellent",
            SignalGrade::Good => "good",
            SignalGrade::Fair => "fair",
            SignalGrade::Poor => "poor",
            SignalGrade::Unusable => "unusable",
        };
        write!(f, "{}", label)
    }
}

/// One threshold tier: RSSI floor (dBm), SNR floor (dB), noise ceiling (dBm).
struct Tier {
    grade: SignalGrade,
    rssi_floor: f64,
    snr_floor: f64,
    noise_ceiling: f64,
}

/// Ordered tiers; the first match wins, no match is unusable.
static TIERS: &[Tier] = &[
    Tier {
        grade: SignalGrade::Excellent,
        rssi_floor: -10.0,
        snr_floor: 30.0,
        noise_ceiling: -40.0,
    },
    Tier {
        grade: SignalGrade::Good,
        rssi_floor: -20.0,
        snr_floor: 20.0,
        noise_ceiling: -35.0,
    },
    Tier {
        grade: SignalGrade::Fair,
        rssi_floor: -30.0,
        snr_floor: 10.0,
        noise_ceiling: -30.0,
    },
    Tier {
        grade: SignalGrade::Poor,
        rssi_floor: -40.0,
        snr_floor: 5.0,
        noise_ceiling: -25.0,
    },
];

/// Grade one transmission from its RSSI (dBm), SNR (dB), and noise (dBm).
pub fn evaluate(rssi: f64, snr: f64, noise: f64) -> SignalGrade {
    for tier in TIERS {
        if rssi >= tier.rssi_floor && snr >= tier.snr_floor && noise <= tier.noise_ceiling {
            return tier.grade;
        }
    }
    SignalGrade::Unusable
}

// =============================================================================
// Degradation Tracking
// =============================================================================

/// Raised when a device crosses the sustained-degradation threshold.
///
/// This is a passive warning, not a state change: the device record keeps
/// updating normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedSignal {
    /// Device key whose signal has been degraded.
    pub device_key: String,
    /// Number of consecutive degraded readings observed.
    pub consecutive: usize,
}

#[derive(Debug, Default)]
struct History {
    grades: VecDeque<SignalGrade>,
    /// Set once the warning has fired; cleared by any non-degraded reading.
    warned: bool,
}

/// Bounded per-device signal-quality history.
///
/// Owned exclusively by the ingestion path; [`track`](Self::track) appends a
/// grade and reports whether the sustained-degradation warning fired. The
/// warning fires once per degradation episode and re-arms only after an
/// intervening non-degraded reading.
#[derive(Debug, Default)]
pub struct SignalTracker {
    histories: HashMap<String, History>,
}

impl SignalTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `grade` for `device_key`.
    ///
    /// Keeps at most [`HISTORY_LEN`] readings per device, evicting the
    /// oldest. Returns the degradation warning if the most recent
    /// [`DEGRADED_WINDOW`] readings are all poor or unusable and no warning
    /// has fired since the last good reading.
    pub fn track(&mut self, device_key: &str, grade: SignalGrade) -> Option<DegradedSignal> {
        let history = self.histories.entry(device_key.to_string()).or_default();

        history.grades.push_back(grade);
        if history.grades.len() > HISTORY_LEN {
            history.grades.pop_front();
        }

        if !grade.is_degraded() {
            history.warned = false;
            return None;
        }

        let window_full = history.grades.len() >= DEGRADED_WINDOW
            && history
                .grades
                .iter()
                .rev()
                .take(DEGRADED_WINDOW)
                .all(|g| g.is_degraded());

        if window_full && !history.warned {
            history.warned = true;
            warn!(
                device = device_key,
                readings = DEGRADED_WINDOW,
                "device has had poor signal quality for {} consecutive readings",
                DEGRADED_WINDOW
            );
            return Some(DegradedSignal {
                device_key: device_key.to_string(),
                consecutive: DEGRADED_WINDOW,
            });
        }
        None
    }

    /// Most recent grades for `device_key`, oldest first.
    pub fn history(&self, device_key: &str) -> Vec<SignalGrade> {
        self.histories
            .get(device_key)
            .map(|h| h.grades.iter().copied().collect())
            .unwrap_or_default()
    }
}
