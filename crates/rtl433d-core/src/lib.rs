//! Core types and pure logic for the rtl433d bridge.
//!
//! This crate holds everything below the process boundary: configuration and
//! its fail-fast validation, the static model schema registry, incremental
//! line framing, per-field event validation, signal-quality grading and
//! degradation tracking, the shared device-state store, and the retry and
//! backoff policies. Nothing in here spawns a process or performs I/O beyond
//! logging; the `rtl433d-engine` crate wires these pieces to the external
//! rtl_433 process.
//!
//! # Data flow
//!
//! ```text
//! bytes -> frame::LineFramer -> serde_json -> validate::EventValidator
//!       -> signal::evaluate / SignalTracker -> store::DeviceStateStore
//!       -> StateEvent subscribers
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod retry;
pub mod schema;
pub mod signal;
pub mod store;
pub mod validate;

pub use config::{BridgeConfig, ProtocolFilter};
pub use error::{BridgeError, BridgeResult, ConfigError, FailureKind, ProcessError};
pub use frame::LineFramer;
pub use retry::{ConnectionBackoff, RetryPolicy};
pub use signal::{evaluate, DegradedSignal, SignalGrade, SignalTracker};
pub use store::{DeviceRecord, DeviceStateStore, SignalSnapshot, StateEvent};
pub use validate::{EventValidator, Rejection, ValidatedRecord};
