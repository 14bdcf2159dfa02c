//! Process supervision and orchestration for the rtl433d bridge.
//!
//! This crate owns the boundary to the external rtl_433 process:
//!
//! - [`command`]: construction of the capture invocation
//! - [`preflight`]: device reset and self-test before capture
//! - [`supervisor`]: the process lifecycle and its stdout/stderr readers
//! - [`coordinator`]: validation/grading/store orchestration, the
//!   backoff-governed reconnect loop, and the [`BridgeHandle`] surface the
//!   hosting application consumes
//!
//! The pure pieces (framing, validation, grading, the store) live in
//! `rtl433d-core`; nothing outside this crate spawns, signals, or reads the
//! capture process.

pub mod command;
pub mod coordinator;
pub mod preflight;
pub mod supervisor;

pub use command::CaptureCommand;
pub use coordinator::{BridgeHandle, Coordinator};
pub use preflight::Preflight;
pub use supervisor::{classify_stderr, ProcessSupervisor, SupervisorEvent};
