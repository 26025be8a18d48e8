//! End-to-end runs from SML bytes to published messages

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use smlbridge_cli::{bridge, Args, FileConfig, Settings};
use smlbridge_core::{
    Delivery, MeasurementRecord, ObisCode, OutboundMessage, PublishError, Publisher, RecordValue,
};
use smlbridge_sml::SmlFileBuilder;

const SERVER_ID: &[u8] = &[0x0a, 0x01, 0x49, 0x53, 0x4b, 0x00, 0x04, 0x7a, 0x5e, 0x99];

#[derive(Default)]
struct MockBroker {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl MockBroker {
    fn payloads(&self, suffix: &str) -> Vec<(String, String)> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic.ends_with(suffix))
            .map(|m| (m.topic.clone(), m.payload_str().into_owned()))
            .collect()
    }
}

#[async_trait]
impl Publisher for MockBroker {
    async fn publish(&self, message: OutboundMessage) -> Result<Delivery, PublishError> {
        self.messages.lock().push(message);
        Ok(Delivery::acknowledged())
    }
}

fn settings(values: &[&str], discovery: bool) -> Settings {
    let args = Args {
        file: Some(PathBuf::from("/dev/ttyUSB0")),
        broker: Some("tcp://localhost:1883".to_string()),
        values: values.iter().map(|v| v.to_string()).collect(),
        no_discovery: !discovery,
        ..Default::default()
    };
    Settings::merge(&args, FileConfig::default()).unwrap()
}

fn energy(raw: u64) -> MeasurementRecord {
    MeasurementRecord::new(ObisCode::from([1, 0, 1, 8, 0]), RecordValue::Uint(raw))
        .with_unit(30)
        .with_scaler(0)
}

fn meter_file(records: &[MeasurementRecord]) -> Vec<u8> {
    SmlFileBuilder::new(SERVER_ID)
        .open_response()
        .get_list_response(records)
        .close_response()
        .build()
}

#[tokio::test]
async fn test_corrected_energy_reading() {
    let broker = Arc::new(MockBroker::default());
    let settings = settings(&["1.0.1.8.0,Energy,energy,kWh,0.001"], false);

    let bytes = meter_file(&[energy(123_456)]);
    let summary = bridge(&settings, broker.clone(), bytes.as_slice()).await.unwrap();

    assert_eq!(summary.records, 1);
    assert_eq!(summary.acknowledged, 1);
    assert_eq!(
        broker.payloads("/state"),
        vec![(
            "homeassistant/sensor/ttyusb0/energy/state".to_string(),
            "123.456".to_string()
        )]
    );
}

#[tokio::test]
async fn test_default_factor_forwards_raw_value() {
    let broker = Arc::new(MockBroker::default());
    let settings = settings(&["1.0.1.8.0,Energy,energy,kWh"], false);

    let bytes = meter_file(&[energy(123_456)]);
    bridge(&settings, broker.clone(), bytes.as_slice()).await.unwrap();

    let states = broker.payloads("/state");
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].1, "123456");
}

#[tokio::test]
async fn test_discovery_precedes_state() {
    let broker = Arc::new(MockBroker::default());
    let settings = settings(&["1.0.1.8.0,Energy,energy,kWh,0.001"], true);

    let mut bytes = meter_file(&[energy(1_000)]);
    bytes.extend(meter_file(&[energy(2_000)]));
    bridge(&settings, broker.clone(), bytes.as_slice()).await.unwrap();

    let messages = broker.messages.lock().clone();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].topic, "homeassistant/sensor/ttyusb0/energy/config");
    assert!(messages[0].retain);
    assert_eq!(messages[1].payload_str(), "1");
    assert_eq!(messages[2].payload_str(), "2");
}

#[tokio::test]
async fn test_corrupt_input_is_an_error_after_earlier_values() {
    let broker = Arc::new(MockBroker::default());
    let settings = settings(&["1.0.1.8.0,Energy,energy,kWh"], false);

    let mut bytes = meter_file(&[energy(7)]);
    let mut corrupt = meter_file(&[energy(8)]);
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xff;
    bytes.extend(corrupt);

    let err = bridge(&settings, broker.clone(), bytes.as_slice())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("checksum mismatch"));
    let states = broker.payloads("/state");
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].1, "7");
}
