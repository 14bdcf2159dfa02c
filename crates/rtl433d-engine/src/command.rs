//! Construction of the rtl_433 process invocation.
//!
//! The capture command is built from the validated [`BridgeConfig`]: device
//! selector, center frequency, gain, JSON output with signal level, SI
//! units, ISO timestamps, protocol and statistics metadata, verbose
//! diagnostics, and one `-R` flag per enabled decoder. When a protocol
//! filter is configured, its model names are mapped to decoder numbers via
//! the schema registry; otherwise the default decoder list is enabled.

use std::process::Stdio;

use tokio::process::Command;

use rtl433d_core::config::{BridgeConfig, ProtocolFilter};
use rtl433d_core::schema;

/// Fully resolved invocation of the capture process.
///
/// The program defaults to `rtl_433`; tests substitute a shell fixture via
/// [`CaptureCommand::raw`].
#[derive(Debug, Clone)]
pub struct CaptureCommand {
    program: String,
    args: Vec<String>,
}

impl CaptureCommand {
    /// Build the rtl_433 invocation for `config`.
    ///
    /// `filter` must be the filter produced by `config.validate()`; it only
    /// affects the `-R` decoder selection here, record-level filtering stays
    /// in the validator.
    pub fn from_config(config: &BridgeConfig, filter: Option<&ProtocolFilter>) -> Self {
        let mut args = vec![
            "-d".to_string(),
            config.device_id.clone(),
            "-f".to_string(),
            config.frequency.clone(),
            "-g".to_string(),
            config.gain.to_string(),
            "-F".to_string(),
            "json".to_string(),
            "-M".to_string(),
            "level".to_string(),
            "-C".to_string(),
            "si".to_string(),
            "-M".to_string(),
            "time:iso".to_string(),
            "-M".to_string(),
            "protocol".to_string(),
            "-M".to_string(),
            "stats".to_string(),
            "-v".to_string(),
        ];

        let mut decoders: Vec<u32> = match filter {
            Some(filter) => filter.models().filter_map(schema::decoder_id).collect(),
            None => schema::DEFAULT_DECODERS.to_vec(),
        };
        decoders.sort_unstable();
        decoders.dedup();
        for decoder in decoders {
            args.push("-R".to_string());
            args.push(decoder.to_string());
        }

        Self {
            program: "rtl_433".to_string(),
            args,
        }
    }

    /// Arbitrary program and arguments, for driving the supervisor with
    /// fixtures instead of a real SDR.
    pub fn raw(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument list.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Assemble the `tokio` command: piped stdio, `LANG=C` for a consistent
    /// output format, and kill-on-drop as a last-resort cleanup.
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("LANG", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}
