//! Static model schema registry.
//!
//! Maps each supported device model to its recognized sensor fields, the
//! numeric range and step quantum for each field, and the rtl_433 decoder
//! number used when building `-R` protocol filters.
//!
//! The tables are static data: loaded once at compile time, never mutated at
//! runtime. Protocol-specific range overrides take precedence over the
//! common range table.

// =============================================================================
// Value Ranges
// =============================================================================

/// Allowed numeric range and step quantum for one sensor field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    /// Minimum accepted value, inclusive.
    pub min: f64,
    /// Maximum accepted value, inclusive.
    pub max: f64,
    /// Step quantum the value must be a multiple of.
    pub step: f64,
}

impl ValueRange {
    const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    /// Check whether `value` lies within `[min, max]` and on the step grid.
    ///
    /// Step membership uses a relative tolerance so that values like `22.5`
    /// against step `0.1` are not rejected for float representation error.
    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() || value < self.min || value > self.max {
            return false;
        }
        let ratio = value / self.step;
        (ratio - ratio.round()).abs() < 1e-6
    }

    /// Number of decimal places implied by the step quantum.
    ///
    /// Used to round accepted values to the field's precision after range
    /// validation.
    pub fn decimals(&self) -> u32 {
        if self.step >= 1.0 {
            0
        } else if self.step >= 0.1 {
            1
        } else {
            2
        }
    }
}

// =============================================================================
// Model Tables
// =============================================================================

/// One supported device model: recognized fields plus decoder number.
struct ModelSchema {
    model: &'static str,
    /// rtl_433 decoder number for `-R` filters.
    decoder: u32,
    /// Sensor fields this model is known to transmit.
    fields: &'static [&'static str],
    /// Protocol-specific range overrides; fall back to [`COMMON_RANGES`].
    overrides: &'static [(&'static str, ValueRange)],
}

/// Range table backing fields without a protocol-specific override.
static COMMON_RANGES: &[(&str, ValueRange)] = &[
    ("temperature_C", ValueRange::new(-40.0, 80.0, 0.1)),
    ("temperature_F", ValueRange::new(-40.0, 176.0, 0.1)),
    ("humidity", ValueRange::new(0.0, 100.0, 1.0)),
    ("wind_avg_km_h", ValueRange::new(0.0, 200.0, 0.1)),
    ("wind_dir_deg", ValueRange::new(0.0, 360.0, 1.0)),
    ("rain_in", ValueRange::new(0.0, 100.0, 0.01)),
];

static ACURITE_5N1_OVERRIDES: &[(&str, ValueRange)] = &[
    ("temperature_F", ValueRange::new(-40.0, 158.0, 0.1)),
    ("humidity", ValueRange::new(0.0, 100.0, 1.0)),
    ("wind_avg_km_h", ValueRange::new(0.0, 160.0, 0.1)),
    ("wind_dir_deg", ValueRange::new(0.0, 360.0, 1.0)),
    ("rain_in", ValueRange::new(0.0, 100.0, 0.01)),
];

static LACROSSE_TX141W_OVERRIDES: &[(&str, ValueRange)] = &[
    ("temperature_C", ValueRange::new(-40.0, 60.0, 0.1)),
    ("humidity", ValueRange::new(0.0, 100.0, 1.0)),
    ("wind_avg_km_h", ValueRange::new(0.0, 160.0, 0.1)),
    ("wind_dir_deg", ValueRange::new(0.0, 360.0, 1.0)),
];

static MODELS: &[ModelSchema] = &[
    ModelSchema {
        model: "Acurite-5n1",
        decoder: 40,
        fields: &[
            "temperature_C",
            "temperature_F",
            "humidity",
            "wind_avg_km_h",
            "wind_dir_deg",
            "rain_in",
            "rain_mm",
            "battery_ok",
            "message_type",
        ],
        overrides: ACURITE_5N1_OVERRIDES,
    },
    ModelSchema {
        model: "Acurite-Tower",
        decoder: 40,
        fields: &["temperature_C", "humidity", "battery_ok"],
        overrides: &[],
    },
    ModelSchema {
        model: "LaCrosse-TX141W",
        decoder: 73,
        fields: &[
            "temperature_C",
            "humidity",
            "wind_avg_km_h",
            "wind_dir_deg",
            "battery_ok",
        ],
        overrides: LACROSSE_TX141W_OVERRIDES,
    },
    ModelSchema {
        model: "Oregon-v1",
        decoder: 10,
        fields: &["temperature_C", "battery_ok"],
        overrides: &[],
    },
    ModelSchema {
        model: "Ambient-Weather",
        decoder: 20,
        fields: &["temperature_C", "humidity", "battery_ok"],
        overrides: &[],
    },
    ModelSchema {
        model: "Fine-Offset",
        decoder: 32,
        fields: &[
            "temperature_C",
            "humidity",
            "wind_avg_km_h",
            "wind_dir_deg",
            "rain_mm",
            "battery_ok",
        ],
        overrides: &[],
    },
    ModelSchema {
        model: "Nexus-TH",
        decoder: 19,
        fields: &["temperature_C", "humidity", "battery_ok"],
        overrides: &[],
    },
    ModelSchema {
        model: "Prologue-TH",
        decoder: 3,
        fields: &["temperature_C", "humidity", "battery_ok"],
        overrides: &[],
    },
    ModelSchema {
        model: "Rubicson-Temperature",
        decoder: 2,
        fields: &["temperature_C", "battery_ok"],
        overrides: &[],
    },
    ModelSchema {
        model: "WT450",
        decoder: 34,
        fields: &["temperature_C", "humidity", "battery_ok"],
        overrides: &[],
    },
];

/// Decoder numbers enabled when no protocol filter is configured.
///
/// Covers the common consumer weather/temperature sensor decoders.
pub static DEFAULT_DECODERS: &[u32] = &[
    1, 2, 3, 4, 8, 10, 11, 12, 18, 19, 20, 32, 34, 40, 41, 42, 47, 52, 54, 55, 73, 74, 75, 76,
];

// =============================================================================
// Registry Queries
// =============================================================================

fn lookup(model: &str) -> Option<&'static ModelSchema> {
    MODELS.iter().find(|m| m.model == model)
}

/// Whether `model` is a supported device model.
pub fn is_known_model(model: &str) -> bool {
    lookup(model).is_some()
}

/// Recognized sensor fields for `model`; empty for unknown models.
pub fn fields_for(model: &str) -> &'static [&'static str] {
    lookup(model).map(|m| m.fields).unwrap_or(&[])
}

/// Range constraint for `field` of `model`, if the field is range-constrained.
///
/// Protocol-specific overrides win over the common range table. Fields with
/// no entry in either table (boolean flags, message-type tags) are
/// pass-through: accepted without range checking.
pub fn range_for(model: &str, field: &str) -> Option<ValueRange> {
    if let Some(schema) = lookup(model) {
        if let Some((_, range)) = schema.overrides.iter().find(|(f, _)| *f == field) {
            return Some(*range);
        }
    }
    COMMON_RANGES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, r)| *r)
}

/// rtl_433 decoder number for `model`, for building `-R` filters.
pub fn decoder_id(model: &str) -> Option<u32> {
    lookup(model).map(|m| m.decoder)
}
