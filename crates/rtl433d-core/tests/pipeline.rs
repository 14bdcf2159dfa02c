//! Pipeline tests: framing, validation, grading, and the store working
//! together on a realistic byte stream, without any external process.

use serde_json::json;

use rtl433d_core::{
    evaluate, DeviceStateStore, EventValidator, LineFramer, SignalGrade, SignalTracker,
};

/// Push raw bytes through the whole in-memory pipeline.
fn ingest(store: &DeviceStateStore, tracker: &mut SignalTracker, bytes: &[u8]) -> usize {
    let validator = EventValidator::new(None);
    let mut framer = LineFramer::new();
    let mut accepted = 0;
    for line in framer.feed(bytes) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };
        let Ok(record) = validator.validate(&value) else {
            continue;
        };
        let grade = evaluate(record.rssi, record.snr, record.noise);
        tracker.track(&record.key, grade);
        store.apply(record, grade);
        accepted += 1;
    }
    accepted
}

#[test]
fn noisy_stream_yields_clean_state() {
    let stream = concat!(
        "{\"model\":\"Acurite-Tower\",\"id\":1234,\"temperature_C\":22.5,\"humidity\":45,\"battery_ok\":1,\"rssi\":-12,\"snr\":22,\"noise\":-36}\n",
        "garbage that is not json\n",
        "\n",
        "{\"model\":\"Unknown-Widget\",\"id\":1,\"temperature_C\":20.0}\n",
        "{\"model\":\"Acurite-Tower\",\"id\":1234,\"temperature_C\":999.0,\"humidity\":44,\"battery_ok\":0,\"rssi\":-12,\"snr\":22,\"noise\":-36}\n",
    );

    let store = DeviceStateStore::new();
    let mut tracker = SignalTracker::new();
    let accepted = ingest(&store, &mut tracker, stream.as_bytes());

    // Two Acurite records accepted; garbage and the unknown model dropped.
    assert_eq!(accepted, 2);
    assert_eq!(store.len(), 1);

    let device = store.get("Acurite-Tower_1234").unwrap();
    // Second transmission replaced the first; its out-of-range temperature
    // was rejected at field level, so only humidity and battery survive.
    assert!(!device.fields.contains_key("temperature_C"));
    assert_eq!(device.fields["humidity"], json!(44.0));
    assert_eq!(device.fields["battery_ok"], json!(false));
    assert_eq!(device.signal.grade, SignalGrade::Good);
}

#[test]
fn chunked_delivery_matches_single_shot() {
    let stream = concat!(
        "{\"model\":\"Nexus-TH\",\"id\":7,\"temperature_C\":18.4,\"humidity\":60,\"time\":\"2024-05-01T10:00:00\"}\n",
        "{\"model\":\"WT450\",\"id\":3,\"temperature_C\":21.0,\"humidity\":55,\"time\":\"2024-05-01T10:00:05\"}\n",
    )
    .as_bytes();

    let whole = DeviceStateStore::new();
    let mut tracker = SignalTracker::new();
    ingest(&whole, &mut tracker, stream);

    let chunked = DeviceStateStore::new();
    let validator = EventValidator::new(None);
    let mut framer = LineFramer::new();
    for chunk in stream.chunks(7) {
        for line in framer.feed(chunk) {
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            let record = validator.validate(&value).unwrap();
            let grade = evaluate(record.rssi, record.snr, record.noise);
            chunked.apply(record, grade);
        }
    }

    assert_eq!(whole.snapshot(), chunked.snapshot());
}

#[test]
fn sustained_poor_signal_warns_once_per_episode() {
    let mut tracker = SignalTracker::new();
    let mut warnings = 0;
    for _ in 0..8 {
        // rssi/snr/noise of a barely-detectable transmission.
        let grade = evaluate(-48.0, 2.0, -10.0);
        assert_eq!(grade, SignalGrade::Unusable);
        if tracker.track("Prologue-TH_1", grade).is_some() {
            warnings += 1;
        }
    }
    assert_eq!(warnings, 1);
}
