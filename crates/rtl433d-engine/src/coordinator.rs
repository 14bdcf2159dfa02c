//! Orchestration of the capture pipeline.
//!
//! The [`Coordinator`] owns the [`ProcessSupervisor`] and drives the whole
//! data flow: decoded records are validated, graded, tracked, and written
//! into the shared [`DeviceStateStore`]; process failures feed the
//! exponential-backoff reconnect loop. The hosting application talks to a
//! [`BridgeHandle`]: a snapshot/refresh surface, store subscription, and an
//! idempotent shutdown that fully releases the external process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use rtl433d_core::config::{BridgeConfig, ProtocolFilter};
use rtl433d_core::error::{BridgeError, BridgeResult};
use rtl433d_core::retry::{ConnectionBackoff, RetryPolicy};
use rtl433d_core::signal::{evaluate, SignalTracker};
use rtl433d_core::store::{DeviceRecord, DeviceStateStore, StateEvent};
use rtl433d_core::validate::EventValidator;

use crate::command::CaptureCommand;
use crate::preflight::Preflight;
use crate::supervisor::{ProcessSupervisor, SupervisorEvent};

/// Depth of the supervisor event channel; bounded so a stalled coordinator
/// back-pressures the readers instead of growing without limit.
const EVENT_QUEUE: usize = 64;

// =============================================================================
// Shared State
// =============================================================================

/// State shared between the coordinator task and its handle.
struct Shared {
    store: Arc<DeviceStateStore>,
    /// Flips to true exactly once; every waiter (the coordinator's backoff
    /// sleeps and event waits, the handle's refresh retries) observes it
    /// through its own receiver.
    shutdown: watch::Sender<bool>,
    /// True while a capture process with a passed preflight is attached.
    connected: AtomicBool,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Drives ingestion and the reconnect policy on its own task.
pub struct Coordinator {
    supervisor: ProcessSupervisor,
    events: mpsc::Receiver<SupervisorEvent>,
    validator: EventValidator,
    tracker: SignalTracker,
    backoff: ConnectionBackoff,
    shutdown: watch::Receiver<bool>,
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Validate `config` and start the bridge.
    ///
    /// Configuration errors (including unknown models in the protocol
    /// filter) fail fast here; everything later is handled by retry and
    /// backoff without surfacing as a hard error.
    pub fn spawn(config: &BridgeConfig) -> BridgeResult<BridgeHandle> {
        let filter = config.validate()?;
        let command = CaptureCommand::from_config(config, filter.as_ref());
        let preflight = Preflight::new(config.device_id.clone());
        Ok(Self::spawn_parts(
            command,
            Some(preflight),
            filter,
            ConnectionBackoff::default(),
        ))
    }

    /// Start the bridge from explicit parts.
    ///
    /// This is the seam the integration tests use to substitute shell
    /// fixtures for rtl_433 and skip the device preflight.
    pub fn spawn_parts(
        command: CaptureCommand,
        preflight: Option<Preflight>,
        filter: Option<ProtocolFilter>,
        backoff: ConnectionBackoff,
    ) -> BridgeHandle {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            store: Arc::new(DeviceStateStore::new()),
            shutdown: shutdown_tx,
            connected: AtomicBool::new(false),
        });

        let coordinator = Coordinator {
            supervisor: ProcessSupervisor::new(command, preflight, tx),
            events: rx,
            validator: EventValidator::new(filter),
            tracker: SignalTracker::new(),
            backoff,
            shutdown: shutdown_rx,
            shared: shared.clone(),
        };
        let task = tokio::spawn(coordinator.run());

        BridgeHandle {
            shared,
            refresh_policy: RetryPolicy::default(),
            task: Mutex::new(Some(task)),
        }
    }

    /// Main loop: connect with backoff, then drain supervisor events until
    /// shutdown or failure.
    async fn run(mut self) {
        while !*self.shutdown.borrow() {
            if !self.shared.connected.load(Ordering::SeqCst) {
                match self.supervisor.start().await {
                    Ok(()) => {
                        self.backoff.reset();
                        self.shared.connected.store(true, Ordering::SeqCst);
                        info!("capture process connected");
                    }
                    Err(err) => {
                        let delay = self.backoff.next_delay();
                        warn!(
                            error = %err,
                            attempt = self.backoff.attempts(),
                            delay_s = delay.as_secs_f64(),
                            "connection attempt failed, backing off"
                        );
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = self.shutdown.wait_for(|stop| *stop) => {}
                        }
                        continue;
                    }
                }
            }

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                    // Loop condition handles the exit.
                }
                event = self.events.recv() => match event {
                    Some(SupervisorEvent::Record(value)) => self.ingest(&value),
                    Some(SupervisorEvent::Fatal(kind)) => {
                        error!(%kind, "capture process failed, scheduling restart");
                        self.supervisor.stop().await;
                        self.shared.connected.store(false, Ordering::SeqCst);
                        let delay = self.backoff.next_delay();
                        warn!(
                            attempt = self.backoff.attempts(),
                            delay_s = delay.as_secs_f64(),
                            "backing off before reconnect"
                        );
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = self.shutdown.wait_for(|stop| *stop) => {}
                        }
                    }
                    // The supervisor holds a sender for the lifetime of
                    // `self`, so the channel cannot close here.
                    None => break,
                },
            }
        }

        self.supervisor.stop().await;
        self.shared.connected.store(false, Ordering::SeqCst);
        info!("coordinator stopped");
    }

    /// Run one decoded record through validation, grading, and the store.
    ///
    /// Malformed records never escape this method: every rejection has
    /// already been logged at the appropriate level by the validator.
    fn ingest(&mut self, value: &serde_json::Value) {
        let Ok(record) = self.validator.validate(value) else {
            return;
        };
        let grade = evaluate(record.rssi, record.snr, record.noise);
        let degraded = self.tracker.track(&record.key, grade);
        self.shared.store.apply(record, grade);
        // Reported after the write so subscribers see current state when
        // the warning arrives.
        if let Some(warning) = degraded {
            self.shared.store.report_degraded(&warning);
        }
    }
}

// =============================================================================
// BridgeHandle
// =============================================================================

/// Hosting-application surface of a running bridge.
pub struct BridgeHandle {
    shared: Arc<Shared>,
    refresh_policy: RetryPolicy,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeHandle {
    /// The shared device-state store.
    pub fn store(&self) -> Arc<DeviceStateStore> {
        self.shared.store.clone()
    }

    /// Subscribe to discovery and update notifications.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StateEvent> {
        self.shared.store.subscribe()
    }

    /// Whether a capture process is currently connected.
    pub fn connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Current state snapshot, waiting briefly for a connection if needed.
    ///
    /// Transient unavailability is retried with a flat delay; after the
    /// budget is exhausted a [`BridgeError::NotReady`] is surfaced and the
    /// host decides the user-visible presentation. This retry loop is
    /// independent of the connection backoff.
    pub async fn refresh(&self) -> BridgeResult<std::collections::HashMap<String, DeviceRecord>> {
        let mut shutdown = self.shared.shutdown.subscribe();
        for attempt in 1..=self.refresh_policy.max_attempts {
            if *shutdown.borrow() {
                return Err(BridgeError::Shutdown);
            }
            if self.connected() {
                return Ok(self.shared.store.snapshot());
            }
            if attempt < self.refresh_policy.max_attempts {
                // The retry delay must yield immediately on shutdown rather
                // than sleeping out its budget.
                tokio::select! {
                    _ = sleep(self.refresh_policy.delay) => {}
                    _ = shutdown.wait_for(|stop| *stop) => {
                        return Err(BridgeError::Shutdown);
                    }
                }
            }
        }
        Err(BridgeError::NotReady {
            attempts: self.refresh_policy.max_attempts,
        })
    }

    /// Stop the bridge and release the capture process. Idempotent.
    pub async fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "coordinator task ended abnormally");
            }
        }
    }
}
