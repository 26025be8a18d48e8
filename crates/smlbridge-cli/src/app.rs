//! One bridge run: open the input, connect, decode, disconnect.

use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::Arc;

use anyhow::{Context, Result};
use smlbridge_core::{DecodeDriver, PublishGate, Publisher, RunSummary};
use smlbridge_mqtt::MqttPublisher;
use smlbridge_sml::SmlReader;

use crate::settings::Settings;

/// Run against the configured broker and input file.
///
/// The broker session is closed whether or not decoding succeeds.
pub async fn run(settings: &Settings) -> Result<RunSummary> {
    let file = File::open(&settings.input)
        .with_context(|| format!("Failed to open {}", settings.input.display()))?;

    let publisher = Arc::new(
        MqttPublisher::connect(&settings.mqtt)
            .await
            .context("Failed to connect to MQTT broker")?,
    );

    let result = bridge(settings, publisher.clone(), BufReader::new(file)).await;
    tracing::debug!("Closing session with {}", publisher.broker());
    publisher.disconnect().await;
    result
}

/// Decode `input` and forward matching values through `publisher`.
pub async fn bridge<R: Read>(
    settings: &Settings,
    publisher: Arc<dyn Publisher>,
    input: R,
) -> Result<RunSummary> {
    let gate = PublishGate::new(publisher, settings.gate.clone());
    let mut driver = DecodeDriver::new(&settings.spec, &settings.device_name, gate)?;

    if settings.discovery {
        let announced = driver.announce().await;
        if announced.failed > 0 {
            tracing::warn!("{} discovery configs could not be published", announced.failed);
        }
    }

    let mut reader = SmlReader::new(input);
    let summary = driver
        .run(&mut reader)
        .await
        .with_context(|| format!("Failed to decode {}", settings.input.display()))?;

    tracing::debug!("Read {} SML files", reader.frames_read());
    Ok(summary)
}
