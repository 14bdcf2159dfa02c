//! Device preflight: reset and self-test before continuous capture.
//!
//! Before rtl_433 is started the SDR dongle gets a short reset
//! (`rtl_eeprom -d N -t`, failure tolerated) followed by a self-test
//! (`rtl_test -d N -t`). Both are bounded by a five-second timeout. A
//! `usb_claim_interface error` in the test output fails the attempt; a
//! "PLL not locked" message does not, that is normal dongle behavior. The
//! whole sequence retries up to a fixed attempt cap with a fixed settle
//! delay, then fails fatally with [`ProcessError::PreflightFailed`].

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use rtl433d_core::error::ProcessError;

/// Per-invocation timeout for reset and self-test commands.
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between attempts, letting the USB device settle.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Attempts before the preflight fails fatally.
const MAX_ATTEMPTS: u32 = 3;

/// Preflight plan for one device.
#[derive(Debug, Clone)]
pub struct Preflight {
    device_id: String,
    reset_program: String,
    test_program: String,
    settle_delay: Duration,
    max_attempts: u32,
}

impl Preflight {
    /// Standard preflight using `rtl_eeprom` and `rtl_test`.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            reset_program: "rtl_eeprom".to_string(),
            test_program: "rtl_test".to_string(),
            settle_delay: SETTLE_DELAY,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Substitute the external programs and timing, for tests.
    pub fn with_programs(
        mut self,
        reset_program: impl Into<String>,
        test_program: impl Into<String>,
        settle_delay: Duration,
    ) -> Self {
        self.reset_program = reset_program.into();
        self.test_program = test_program.into();
        self.settle_delay = settle_delay;
        self
    }

    /// Run the reset + self-test sequence with retries.
    pub async fn run(&self) -> Result<(), ProcessError> {
        let mut last_reason = String::new();
        for attempt in 1..=self.max_attempts {
            match self.attempt().await {
                Ok(()) => {
                    info!(device = self.device_id.as_str(), "SDR device preflight passed");
                    return Ok(());
                }
                Err(reason) => {
                    warn!(
                        device = self.device_id.as_str(),
                        attempt,
                        max = self.max_attempts,
                        reason = reason.as_str(),
                        "device preflight attempt failed"
                    );
                    last_reason = reason;
                    tokio::time::sleep(self.settle_delay).await;
                }
            }
        }
        Err(ProcessError::PreflightFailed {
            attempts: self.max_attempts,
            reason: last_reason,
        })
    }

    /// One reset + test cycle. Returns a human-readable failure reason.
    async fn attempt(&self) -> Result<(), String> {
        // Reset is best-effort; some dongles have no EEPROM to talk to.
        if let Err(reason) = self.invoke(&self.reset_program).await {
            debug!(
                device = self.device_id.as_str(),
                reason = reason.as_str(),
                "device reset failed, continuing to self-test"
            );
        }

        let stderr = self.invoke(&self.test_program).await?;
        if stderr.contains("usb_claim_interface error") {
            return Err("usb_claim_interface error: device in use or permission problem".to_string());
        }
        // Exit status is deliberately ignored beyond spawn success: rtl_test
        // reports "PLL not locked" through a nonzero path on some tuners.
        Ok(())
    }

    /// Run `program -d <id> -t` with the preflight timeout; returns captured
    /// stderr on completion.
    async fn invoke(&self, program: &str) -> Result<String, String> {
        let child = Command::new(program)
            .arg("-d")
            .arg(&self.device_id)
            .arg("-t")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match timeout(PREFLIGHT_TIMEOUT, child).await {
            Ok(Ok(output)) => Ok(String::from_utf8_lossy(&output.stderr).into_owned()),
            Ok(Err(err)) => Err(format!("{}: {}", program, err)),
            Err(_) => Err(format!("{}: timed out after {:?}", program, PREFLIGHT_TIMEOUT)),
        }
    }
}
