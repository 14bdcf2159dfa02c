//! End-to-end tests driving the full pipeline with shell fixtures in place
//! of rtl_433.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, timeout};

use rtl433d_core::config::ProtocolFilter;
use rtl433d_core::error::BridgeError;
use rtl433d_core::retry::ConnectionBackoff;
use rtl433d_core::signal::SignalGrade;
use rtl433d_core::store::StateEvent;
use rtl433d_engine::{CaptureCommand, Coordinator};

/// Backoff long enough that fixtures are not respawned mid-test.
fn slow_backoff() -> ConnectionBackoff {
    ConnectionBackoff::new(Duration::from_secs(30), Duration::from_secs(60))
}

fn fixture(script: &str) -> CaptureCommand {
    CaptureCommand::raw("sh", vec!["-c".to_string(), script.to_string()])
}

#[tokio::test]
async fn two_line_stream_replaces_state_and_discovers_once() {
    let script = concat!(
        r#"printf '%s\n' '{"model":"Acurite-Tower","id":1234,"temperature_C":22.5,"humidity":45,"battery_ok":1}'; "#,
        r#"printf '%s\n' '{"model":"Acurite-Tower","id":1234,"temperature_C":23.0,"humidity":44,"battery_ok":0}'; "#,
        "sleep 30",
    );
    let handle = Coordinator::spawn_parts(fixture(script), None, None, slow_backoff());
    let mut events = handle.subscribe();

    // First line: discovery then update.
    let discovered = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    match discovered {
        StateEvent::Discovered {
            key,
            model,
            instance_id,
            available_fields,
        } => {
            assert_eq!(key, "Acurite-Tower_1234");
            assert_eq!(model, "Acurite-Tower");
            assert_eq!(instance_id, "1234");
            assert!(available_fields.contains(&"humidity".to_string()));
        }
        other => panic!("expected Discovered, got {:?}", other),
    }

    // Drain the remaining events for both lines; no second discovery.
    let mut discoveries = 0;
    let mut updates = 0;
    while updates < 2 {
        match timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            StateEvent::Discovered { .. } => discoveries += 1,
            StateEvent::Updated { .. } => updates += 1,
            StateEvent::Degraded { .. } => {}
        }
    }
    assert_eq!(discoveries, 0, "exactly one discovery per device key");

    // Last write wins, full replace not merge.
    let snapshot = handle.store().snapshot();
    let device = &snapshot["Acurite-Tower_1234"];
    assert_eq!(device.fields["temperature_C"], json!(23.0));
    assert_eq!(device.fields["humidity"], json!(44.0));
    assert_eq!(device.fields["battery_ok"], json!(false));
    assert_eq!(device.model, "Acurite-Tower");

    assert!(handle.connected());
    handle.shutdown().await;
    handle.shutdown().await; // idempotent
    assert!(!handle.connected());
}

#[tokio::test]
async fn filtered_model_produces_no_record() {
    let script = concat!(
        r#"printf '%s\n' '{"model":"Acurite-5n1","id":77,"temperature_F":70.2,"humidity":50}'; "#,
        r#"printf '%s\n' '{"model":"Acurite-Tower","id":9,"temperature_C":20.0}'; "#,
        "sleep 30",
    );
    let filter = ProtocolFilter::new(["Acurite-Tower".to_string()]).unwrap();
    let handle = Coordinator::spawn_parts(fixture(script), None, Some(filter), slow_backoff());
    let mut events = handle.subscribe();

    // Only the Tower record makes it through.
    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        StateEvent::Discovered { key, .. } => assert_eq!(key, "Acurite-Tower_9"),
        other => panic!("expected Discovered for Acurite-Tower_9, got {:?}", other),
    }

    let snapshot = handle.store().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot.contains_key("Acurite-5n1_77"));

    handle.shutdown().await;
}

#[tokio::test]
async fn signal_quality_is_graded_and_stored() {
    let script = concat!(
        r#"printf '%s\n' '{"model":"Nexus-TH","id":5,"temperature_C":18.0,"rssi":-5,"snr":35,"noise":-45}'; "#,
        "sleep 30",
    );
    let handle = Coordinator::spawn_parts(fixture(script), None, None, slow_backoff());
    let mut events = handle.subscribe();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, StateEvent::Discovered { .. }));

    let device = handle.store().get("Nexus-TH_5").unwrap();
    assert_eq!(device.signal.grade, SignalGrade::Excellent);
    assert_eq!(device.signal.rssi, -5.0);

    handle.shutdown().await;
}

#[tokio::test]
async fn refresh_surfaces_snapshot_while_connected() {
    let script = concat!(
        r#"printf '%s\n' '{"model":"WT450","id":2,"temperature_C":21.0}'; "#,
        "sleep 30",
    );
    let handle = Coordinator::spawn_parts(fixture(script), None, None, slow_backoff());
    let mut events = handle.subscribe();
    let _ = timeout(Duration::from_secs(5), events.recv()).await.unwrap();

    let snapshot = handle.refresh().await.unwrap();
    assert!(snapshot.contains_key("WT450_2"));

    handle.shutdown().await;
}

#[tokio::test]
async fn replacement_process_survives_a_previous_exit() {
    // The counter file doubles as run marker: the first run exits right
    // after one record, later runs keep streaming. Each run appends a line,
    // so the line count is the number of spawns.
    let counter = std::env::temp_dir().join(format!("rtl433d-e2e-runs-{}", std::process::id()));
    let _ = std::fs::remove_file(&counter);
    let script = format!(
        concat!(
            r#"if [ -e {c} ]; then echo x >> {c}; "#,
            r#"printf '%s\n' '{{"model":"WT450","id":4,"temperature_C":20.0}}'; sleep 30; "#,
            r#"else echo x > {c}; "#,
            r#"printf '%s\n' '{{"model":"WT450","id":4,"temperature_C":19.5}}'; fi"#,
        ),
        c = counter.display()
    );
    let backoff = ConnectionBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
    let handle = Coordinator::spawn_parts(fixture(&script), None, None, backoff);
    let mut events = handle.subscribe();

    // First run: discovery plus update, then the process exits on its own.
    match timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
    {
        StateEvent::Discovered { key, .. } => assert_eq!(key, "WT450_4"),
        other => panic!("expected Discovered, got {:?}", other),
    }
    let _ = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();

    // The replacement run reports fresh data after the backoff.
    match timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
    {
        StateEvent::Updated { key, .. } => assert_eq!(key, "WT450_4"),
        other => panic!("expected Updated from replacement, got {:?}", other),
    }

    // The exit of the first run must cost exactly one restart: a stale
    // second exit report would tear down the healthy replacement and spawn
    // a third process.
    sleep(Duration::from_millis(500)).await;
    assert!(handle.connected());
    let runs = std::fs::read_to_string(&counter).unwrap().lines().count();
    assert_eq!(runs, 2, "one exit, one replacement, nothing more");

    let device = handle.store().get("WT450_4").unwrap();
    assert_eq!(device.fields["temperature_C"], json!(20.0));

    handle.shutdown().await;
    let _ = std::fs::remove_file(&counter);
}

#[tokio::test]
async fn shutdown_interrupts_refresh_retry_wait() {
    // A bridge that never connects: refresh sits in its flat-retry delay.
    let command = CaptureCommand::raw("definitely-not-a-real-binary-7f3a", vec![]);
    let handle = Arc::new(Coordinator::spawn_parts(
        command,
        None,
        None,
        slow_backoff(),
    ));

    let refresher = handle.clone();
    let refresh_task = tokio::spawn(async move { refresher.refresh().await });

    // Let refresh reach its first retry delay, then shut down; the delay
    // must yield immediately instead of sleeping out its 5 s budget.
    sleep(Duration::from_millis(100)).await;
    handle.shutdown().await;

    let result = timeout(Duration::from_secs(2), refresh_task)
        .await
        .expect("refresh did not yield on shutdown")
        .unwrap();
    assert!(matches!(result, Err(BridgeError::Shutdown)));
}

#[tokio::test]
async fn sustained_poor_signal_notifies_subscribers() {
    let script = concat!(
        "for i in 1 2 3 4 5; do ",
        r#"printf '%s\n' '{"model":"Prologue-TH","id":1,"temperature_C":20.0,"rssi":-48,"snr":2,"noise":-10}'; "#,
        "done; sleep 30",
    );
    let handle = Coordinator::spawn_parts(fixture(script), None, None, slow_backoff());
    let mut events = handle.subscribe();

    // Discovery and five updates precede the warning.
    let mut updates = 0;
    loop {
        match timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            StateEvent::Discovered { .. } => {}
            StateEvent::Updated { .. } => updates += 1,
            StateEvent::Degraded { key, consecutive } => {
                assert_eq!(key, "Prologue-TH_1");
                assert_eq!(consecutive, 5);
                break;
            }
        }
    }
    assert_eq!(updates, 5, "warning fires on the fifth degraded reading");

    handle.shutdown().await;
}

#[tokio::test]
async fn process_exit_disconnects_until_backoff_elapses() {
    // Fixture exits immediately after one record; with a 30 s initial
    // backoff the bridge stays disconnected for the rest of the test.
    let script = r#"printf '%s\n' '{"model":"WT450","id":4,"temperature_C":19.5}'"#;
    let handle = Coordinator::spawn_parts(fixture(script), None, None, slow_backoff());
    let mut events = handle.subscribe();
    let _ = timeout(Duration::from_secs(5), events.recv()).await.unwrap();

    // Wait for the EOF to be classified and the supervisor torn down.
    sleep(Duration::from_millis(500)).await;
    assert!(!handle.connected());

    // State survives the disconnect; only freshness suffers.
    assert!(handle.store().get("WT450_4").is_some());

    handle.shutdown().await;
}
