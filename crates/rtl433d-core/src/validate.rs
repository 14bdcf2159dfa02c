//! Per-record validation of decoded rtl_433 events.
//!
//! Each decoded line is a JSON object of partially-trusted fields. The
//! validator accepts or rejects *individual fields* against the model schema
//! registry, so one out-of-range reading does not discard an otherwise valid
//! transmission. Record-level rejection happens only for structural problems
//! (not an object, missing identity, unsupported model, filtered model).
//!
//! Rounding order: values are validated raw against range and step, then
//! rounded to the field's precision for storage.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ProtocolFilter;
use crate::schema;

/// Keys that identify the transmission rather than carry sensor data.
const IDENTITY_KEYS: &[&str] = &["model", "id", "brand", "protocol"];

/// Keys routed into the signal snapshot / timestamp, not the field map.
const SIGNAL_KEYS: &[&str] = &["rssi", "snr", "noise", "time"];

/// Decimal places applied to accepted numerics without a range constraint.
const DEFAULT_PRECISION: u32 = 2;

// =============================================================================
// Results
// =============================================================================

/// A record that passed structural validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    /// Logical device key, `model_instanceId`.
    pub key: String,
    /// Device model name.
    pub model: String,
    /// Per-transmitter instance id, as reported.
    pub instance_id: String,
    /// Accepted sensor fields only.
    pub fields: BTreeMap<String, Value>,
    /// Raw RSSI in dBm, 0 if absent.
    pub rssi: f64,
    /// Raw SNR in dB, 0 if absent.
    pub snr: f64,
    /// Raw noise floor in dBm, 0 if absent.
    pub noise: f64,
    /// Decoder-reported timestamp, if present.
    pub time: Option<String>,
}

/// Why a whole record was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Input was not a JSON object.
    NotAnObject,
    /// Object lacks `model` and/or `id`.
    MissingIdentity,
    /// Model is not in the schema registry.
    UnsupportedModel(String),
    /// Model is known but excluded by the configured protocol filter.
    Filtered(String),
}

/// Outcome of validating one field.
///
/// Expected-invalid input is data, not an error condition, so each field
/// resolves to a tagged outcome rather than raising.
#[derive(Debug, Clone, PartialEq)]
enum FieldOutcome {
    /// Accepted, with the value to store.
    Accepted(Value),
    /// Numeric value outside the field's range or off its step grid.
    OutOfRange,
    /// Key is not a recognized field for this model.
    Unrecognized,
    /// Null values carry no reading.
    Null,
}

// =============================================================================
// Validator
// =============================================================================

/// Validates raw decoded records against the schema registry and filter.
///
/// Pure with respect to its inputs: the only side effects are log lines for
/// rejected fields and records.
#[derive(Debug, Clone, Default)]
pub struct EventValidator {
    filter: Option<ProtocolFilter>,
}

impl EventValidator {
    /// Create a validator with an optional protocol allow-list.
    pub fn new(filter: Option<ProtocolFilter>) -> Self {
        Self { filter }
    }

    /// Validate one decoded record.
    pub fn validate(&self, raw: &Value) -> Result<ValidatedRecord, Rejection> {
        let object = match raw.as_object() {
            Some(object) => object,
            None => {
                debug!("dropping non-object record: {}", raw);
                return Err(Rejection::NotAnObject);
            }
        };

        let model = match object.get("model").and_then(Value::as_str) {
            Some(model) => model.to_string(),
            None => {
                debug!("dropping record without model");
                return Err(Rejection::MissingIdentity);
            }
        };
        let instance_id = match object.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                debug!(%model, "dropping record without id");
                return Err(Rejection::MissingIdentity);
            }
        };
        let key = format!("{}_{}", model, instance_id);

        if !schema::is_known_model(&model) {
            warn!(device = key.as_str(), %model, "unsupported protocol");
            return Err(Rejection::UnsupportedModel(model));
        }

        if let Some(filter) = &self.filter {
            if !filter.allows(&model) {
                debug!(device = key.as_str(), %model, "filtered out by protocol allow-list");
                return Err(Rejection::Filtered(model));
            }
        }

        let mut fields = BTreeMap::new();
        for (name, value) in object {
            let name = name.as_str();
            if IDENTITY_KEYS.contains(&name) || SIGNAL_KEYS.contains(&name) {
                continue;
            }
            match validate_field(&model, name, value) {
                FieldOutcome::Accepted(stored) => {
                    fields.insert(name.to_string(), stored);
                }
                FieldOutcome::OutOfRange => {
                    warn!(device = key.as_str(), field = name, %value, "invalid {} value", name);
                }
                FieldOutcome::Unrecognized => {
                    debug!(device = key.as_str(), field = name, "unrecognized field for model");
                }
                FieldOutcome::Null => {}
            }
        }

        Ok(ValidatedRecord {
            rssi: number_or_zero(object.get("rssi")),
            snr: number_or_zero(object.get("snr")),
            noise: number_or_zero(object.get("noise")),
            time: object
                .get("time")
                .and_then(Value::as_str)
                .map(str::to_string),
            key,
            model,
            instance_id,
            fields,
        })
    }
}

fn number_or_zero(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn validate_field(model: &str, name: &str, value: &Value) -> FieldOutcome {
    if value.is_null() {
        return FieldOutcome::Null;
    }
    if !schema::fields_for(model).contains(&name) {
        return FieldOutcome::Unrecognized;
    }

    // Battery flags arrive as 0/1 integers from the decoder.
    if name == "battery_ok" {
        let ok = match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            _ => return FieldOutcome::OutOfRange,
        };
        return FieldOutcome::Accepted(Value::Bool(ok));
    }

    match value.as_f64() {
        Some(number) => match schema::range_for(model, name) {
            Some(range) => {
                if range.contains(number) {
                    FieldOutcome::Accepted(json_number(round_to(number, range.decimals())))
                } else {
                    FieldOutcome::OutOfRange
                }
            }
            // Recognized numeric without a range constraint: pass through,
            // rounded to the default precision.
            None => FieldOutcome::Accepted(json_number(round_to(number, DEFAULT_PRECISION))),
        },
        // Non-numeric pass-through fields (message-type tags and the like).
        None => FieldOutcome::Accepted(value.clone()),
    }
}

fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
