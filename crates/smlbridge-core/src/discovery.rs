//! Home Assistant MQTT discovery.
//!
//! Every sensor value is announced once per run with a retained config
//! message so Home Assistant can create the entity before the first state
//! arrives:
//!
//! ```text
//! homeassistant/sensor/<device_id>/<value_id>/config   retained JSON config
//! homeassistant/sensor/<device_id>/<value_id>/state    corrected value
//! ```

use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::PublishError;
use crate::publish::{OutboundMessage, PublishGate, PublishOutcome};
use crate::registry::{SensorValue, ValueRegistry};

/// State topic of a value.
pub fn state_topic(prefix: &str, device_id: &str, value_id: &str) -> String {
    format!(
        "{}/{}/{}/{}/state",
        prefix,
        config::discovery::COMPONENT,
        device_id,
        value_id
    )
}

/// Discovery config topic of a value.
pub fn config_topic(prefix: &str, device_id: &str, value_id: &str) -> String {
    format!(
        "{}/{}/{}/{}/config",
        prefix,
        config::discovery::COMPONENT,
        device_id,
        value_id
    )
}

/// Device block of a discovery config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDevice {
    pub identifiers: Vec<String>,
    pub name: String,
}

/// Discovery config payload for one sensor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(rename = "unit_of_measurement", skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub state_class: String,
    pub device: DiscoveryDevice,
}

impl DiscoveryConfig {
    /// Build the config for a registered value.
    pub fn for_value(prefix: &str, device_id: &str, value: &SensorValue) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        // Energy meters only ever count up
        let state_class = if value.device_class == "energy" {
            "total_increasing"
        } else {
            "measurement"
        };

        Self {
            name: value.value_name.clone(),
            unique_id: format!("{}_{}", device_id, value.value_id),
            state_topic: state_topic(prefix, device_id, &value.value_id),
            device_class: non_empty(&value.device_class),
            unit: non_empty(&value.unit_of_measure),
            state_class: state_class.to_string(),
            device: DiscoveryDevice {
                identifiers: vec![device_id.to_string()],
                name: value.device_name.clone(),
            },
        }
    }

    /// Retained config message for this value.
    pub fn to_message(&self, topic: String, gate: &PublishGate) -> Result<OutboundMessage, PublishError> {
        let payload =
            serde_json::to_vec(self).map_err(|e| PublishError::Serialization(e.to_string()))?;
        Ok(OutboundMessage::new(topic, payload, gate.config().qos, true))
    }
}

/// Counts from announcing a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnounceSummary {
    pub announced: usize,
    pub acknowledged: usize,
    pub failed: usize,
}

/// Publish one discovery config per registered value.
pub async fn announce(gate: &PublishGate, registry: &ValueRegistry) -> AnnounceSummary {
    let prefix = gate.config().topic_prefix.clone();
    let device_id = registry.device_id();
    let mut summary = AnnounceSummary::default();

    for value in registry.values() {
        let config = DiscoveryConfig::for_value(&prefix, device_id, value);
        let topic = config_topic(&prefix, device_id, &value.value_id);
        let outcome = match config.to_message(topic, gate) {
            Ok(message) => gate.send(message).await,
            Err(e) => PublishOutcome::Failed(e),
        };

        summary.announced += 1;
        match outcome {
            PublishOutcome::Acknowledged => summary.acknowledged += 1,
            PublishOutcome::Unacknowledged(_) => {}
            PublishOutcome::Failed(_) => summary.failed += 1,
        }
    }

    tracing::info!(
        "Announced {} values for device {} ({} acknowledged)",
        summary.announced,
        registry.device_name(),
        summary.acknowledged
    );
    summary
}
