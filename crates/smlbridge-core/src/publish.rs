//! Publish gate.
//!
//! Decoding is synchronous with respect to publishing: every matched record
//! is published before the next record is decoded. The gate therefore caps
//! the time spent on one publish, covering both handing the message to the
//! messaging collaborator and waiting for its acknowledgement. When the cap
//! is hit the message counts as sent with unknown delivery; nothing is
//! retried or queued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config;
use crate::discovery;
use crate::error::{ConfigError, PublishError};
use crate::registry::{ValueHandle, ValueRegistry};
use crate::transform::CorrectedMeasurement;

/// MQTT QoS level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Qos {
    AtMostOnce = 0,
    #[default]
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for Qos {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(ConfigError::Invalid(format!("QoS must be 0, 1 or 2, got {other}"))),
        }
    }
}

/// Message handed to the messaging collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: Qos, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        }
    }

    /// Payload as UTF-8, lossy.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// How a bounded wait on a delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The broker acknowledged the message
    Acknowledged,
    /// The bound elapsed first
    TimedOut,
    /// The collaborator gave up on the message without acknowledging it
    Abandoned,
}

/// Completion side of a pending [`Delivery`].
#[derive(Debug)]
pub struct DeliveryNotifier(oneshot::Sender<()>);

impl DeliveryNotifier {
    pub fn acknowledge(self) {
        let _ = self.0.send(());
    }
}

/// Wait handle returned by a publish.
#[derive(Debug)]
pub struct Delivery {
    pending: Option<oneshot::Receiver<()>>,
}

impl Delivery {
    /// A delivery that is already acknowledged.
    pub fn acknowledged() -> Self {
        Self { pending: None }
    }

    /// A delivery completed later through the returned notifier.
    pub fn pending() -> (DeliveryNotifier, Self) {
        let (tx, rx) = oneshot::channel();
        (DeliveryNotifier(tx), Self { pending: Some(rx) })
    }

    /// Wait at most `bound` for acknowledgement.
    pub async fn wait(self, bound: Duration) -> DeliveryStatus {
        self.wait_until(Instant::now() + bound).await
    }

    /// Wait until `deadline` for acknowledgement.
    pub async fn wait_until(self, deadline: Instant) -> DeliveryStatus {
        let Some(rx) = self.pending else {
            return DeliveryStatus::Acknowledged;
        };
        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(())) => DeliveryStatus::Acknowledged,
            Ok(Err(_)) => DeliveryStatus::Abandoned,
            Err(_) => DeliveryStatus::TimedOut,
        }
    }
}

/// Messaging collaborator.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Hand a message over for delivery.
    ///
    /// Returns once the message is accepted; acknowledgement is observed
    /// through the returned [`Delivery`].
    async fn publish(&self, message: OutboundMessage) -> Result<Delivery, PublishError>;
}

/// Result of one gated publish.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Acknowledged,
    /// Sent, acknowledgement unknown
    Unacknowledged(DeliveryStatus),
    /// The collaborator refused the message
    Failed(PublishError),
}

impl PublishOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, PublishOutcome::Acknowledged)
    }
}

/// Publish gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Upper bound per publish
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub qos: Qos,
    pub retain: bool,
    /// Topic prefix shared with discovery messages
    pub topic_prefix: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout: config::publish::default_timeout(),
            qos: Qos::default(),
            retain: config::publish::DEFAULT_RETAIN,
            topic_prefix: config::discovery::DEFAULT_PREFIX.to_string(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Bounded-wait forwarding of corrected values.
#[derive(Clone)]
pub struct PublishGate {
    publisher: Arc<dyn Publisher>,
    config: GateConfig,
}

impl PublishGate {
    pub fn new(publisher: Arc<dyn Publisher>, config: GateConfig) -> Self {
        Self { publisher, config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Record a corrected value on its handle and publish it.
    pub async fn publish_value(
        &self,
        registry: &mut ValueRegistry,
        handle: ValueHandle,
        measurement: &CorrectedMeasurement,
    ) -> PublishOutcome {
        let device_id = registry.device_id().to_string();
        let Some(value) = registry.get_mut(handle) else {
            return PublishOutcome::Failed(PublishError::SendFailed(format!(
                "unknown value handle {}",
                handle.index()
            )));
        };
        value.set_last_value(measurement.value);

        let topic = discovery::state_topic(&self.config.topic_prefix, &device_id, &value.value_id);
        let message = OutboundMessage::new(
            topic,
            measurement.value.to_string(),
            self.config.qos,
            self.config.retain,
        );
        self.send(message).await
    }

    /// Publish a message under the gate's bound.
    pub async fn send(&self, message: OutboundMessage) -> PublishOutcome {
        let deadline = Instant::now() + self.config.timeout;
        let topic = message.topic.clone();

        let delivery = match tokio::time::timeout_at(deadline, self.publisher.publish(message)).await {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(e)) => {
                tracing::warn!("Publish to {} failed: {}", topic, e);
                return PublishOutcome::Failed(e);
            }
            Err(_) => {
                tracing::debug!("Publish to {} not accepted within {:?}", topic, self.config.timeout);
                return PublishOutcome::Unacknowledged(DeliveryStatus::TimedOut);
            }
        };

        match delivery.wait_until(deadline).await {
            DeliveryStatus::Acknowledged => PublishOutcome::Acknowledged,
            status => {
                tracing::debug!("Publish to {} unacknowledged: {:?}", topic, status);
                PublishOutcome::Unacknowledged(status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivery_acknowledged() {
        let (notifier, delivery) = Delivery::pending();
        notifier.acknowledge();
        assert_eq!(
            delivery.wait(Duration::from_millis(10)).await,
            DeliveryStatus::Acknowledged
        );
        assert_eq!(
            Delivery::acknowledged().wait(Duration::ZERO).await,
            DeliveryStatus::Acknowledged
        );
    }

    #[tokio::test]
    async fn test_delivery_times_out() {
        let (_notifier, delivery) = Delivery::pending();
        let start = Instant::now();
        assert_eq!(
            delivery.wait(Duration::from_millis(20)).await,
            DeliveryStatus::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_delivery_abandoned() {
        let (notifier, delivery) = Delivery::pending();
        drop(notifier);
        assert_eq!(
            delivery.wait(Duration::from_millis(20)).await,
            DeliveryStatus::Abandoned
        );
    }

    /// Accepts every message and never acknowledges it.
    struct SilentPublisher(parking_lot::Mutex<Vec<DeliveryNotifier>>);

    #[async_trait]
    impl Publisher for SilentPublisher {
        async fn publish(&self, _message: OutboundMessage) -> Result<Delivery, PublishError> {
            let (notifier, delivery) = Delivery::pending();
            self.0.lock().push(notifier);
            Ok(delivery)
        }
    }

    struct RefusingPublisher;

    #[async_trait]
    impl Publisher for RefusingPublisher {
        async fn publish(&self, _message: OutboundMessage) -> Result<Delivery, PublishError> {
            Err(PublishError::NotConnected)
        }
    }

    fn gate(publisher: Arc<dyn Publisher>) -> PublishGate {
        PublishGate::new(
            publisher,
            GateConfig {
                timeout: Duration::from_millis(15),
                ..GateConfig::default()
            },
        )
    }

    fn message() -> OutboundMessage {
        OutboundMessage::new("homeassistant/sensor/meter/energy/state", "1", Qos::AtLeastOnce, false)
    }

    #[tokio::test]
    async fn test_gate_outcomes() {
        let silent = Arc::new(SilentPublisher(parking_lot::Mutex::new(Vec::new())));
        let outcome = gate(silent.clone()).send(message()).await;
        assert!(!outcome.is_acknowledged());
        assert!(matches!(
            outcome,
            PublishOutcome::Unacknowledged(DeliveryStatus::TimedOut)
        ));

        let outcome = gate(Arc::new(RefusingPublisher)).send(message()).await;
        assert!(!outcome.is_acknowledged());
        assert!(matches!(outcome, PublishOutcome::Failed(PublishError::NotConnected)));
    }

    #[test]
    fn test_qos_from_u8() {
        assert_eq!(Qos::try_from(0).unwrap(), Qos::AtMostOnce);
        assert_eq!(Qos::try_from(2).unwrap(), Qos::ExactlyOnce);
        assert!(Qos::try_from(3).is_err());
    }
}
