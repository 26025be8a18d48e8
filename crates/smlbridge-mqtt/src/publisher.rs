//! MQTT publisher using rumqttc.
//!
//! The rumqttc event loop runs on its own task. Outgoing publishes are
//! matched to their [`Delivery`] handles in send order: the client's request
//! channel is FIFO, so the n-th `Outgoing::Publish` event belongs to the
//! n-th accepted publish. Packet ids then link PUBACK/PUBCOMP back to the
//! waiting handle.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use smlbridge_core::{
    ConnectionError, Delivery, DeliveryNotifier, OutboundMessage, PublishError, Publisher, Qos,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn to_rumqttc(qos: Qos) -> rumqttc::QoS {
    match qos {
        Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
        Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Pending deliveries, shared with the event loop task.
#[derive(Debug, Default)]
struct DeliveryTracker {
    /// Accepted by the client, not yet written to the socket
    queued: VecDeque<(rumqttc::QoS, DeliveryNotifier)>,
    /// Written, waiting for PUBACK/PUBCOMP
    in_flight: HashMap<u16, DeliveryNotifier>,
    /// Packet ids abandoned on connection loss; rumqttc replays them after
    /// reconnecting
    replayed: HashSet<u16>,
}

impl DeliveryTracker {
    fn on_sent(&mut self, pkid: u16) {
        // a replay was matched to its handle when first written
        if self.in_flight.contains_key(&pkid) || self.replayed.contains(&pkid) {
            return;
        }
        let Some((qos, notifier)) = self.queued.pop_front() else {
            return;
        };
        match qos {
            rumqttc::QoS::AtMostOnce => notifier.acknowledge(),
            _ => {
                self.in_flight.insert(pkid, notifier);
            }
        }
    }

    fn on_completed(&mut self, pkid: u16) {
        if self.replayed.remove(&pkid) {
            return;
        }
        if let Some(notifier) = self.in_flight.remove(&pkid) {
            notifier.acknowledge();
        }
    }

    /// Abandon written publishes after the connection dropped.
    ///
    /// Queued requests stay in the client's channel and are still written
    /// in order after reconnecting, so their handles are kept.
    fn on_connection_lost(&mut self) -> usize {
        let count = self.in_flight.len();
        self.replayed.extend(self.in_flight.drain().map(|(pkid, _)| pkid));
        count
    }

    /// Drop every pending handle; waiters see the delivery as abandoned.
    fn abandon_all(&mut self) -> usize {
        let count = self.queued.len() + self.in_flight.len();
        self.queued.clear();
        self.in_flight.clear();
        self.replayed.clear();
        count
    }
}

/// Publisher connected to one MQTT broker.
pub struct MqttPublisher {
    client: AsyncClient,
    tracker: Arc<Mutex<DeliveryTracker>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    broker: String,
}

impl MqttPublisher {
    /// Connect and wait for the broker to accept the session.
    pub async fn connect(config: &MqttConfig) -> Result<Self, ConnectionError> {
        let broker = config.broker_addr();

        let mut options = MqttOptions::new(config.client_id_or_default(), &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);
        if let (Some(u), Some(p)) = (&config.username, &config.password) {
            options.set_credentials(u, p);
        }

        let (client, eventloop) = AsyncClient::new(options, config.request_capacity);
        let tracker = Arc::new(Mutex::new(DeliveryTracker::default()));
        let (connected_tx, connected_rx) = oneshot::channel();

        let event_task = tokio::spawn(run_event_loop(
            eventloop,
            tracker.clone(),
            connected_tx,
            broker.clone(),
        ));

        let connected = tokio::time::timeout(config.connect_timeout(), connected_rx).await;
        let failure = match connected {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(reason))) => Some(ConnectionError::Refused {
                broker: broker.clone(),
                reason,
            }),
            Ok(Err(_)) => Some(ConnectionError::Failed {
                broker: broker.clone(),
                reason: "event loop stopped".to_string(),
            }),
            Err(_) => Some(ConnectionError::Timeout {
                broker: broker.clone(),
                timeout_ms: config.connect_timeout_ms,
            }),
        };
        if let Some(err) = failure {
            event_task.abort();
            return Err(err);
        }

        tracing::info!("Connected to MQTT broker {}", broker);
        Ok(Self {
            client,
            tracker,
            event_task: Mutex::new(Some(event_task)),
            broker,
        })
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    /// Send DISCONNECT and stop the event loop.
    ///
    /// Publishes accepted before this call are flushed first.
    pub async fn disconnect(&self) {
        let Some(mut event_task) = self.event_task.lock().take() else {
            return;
        };
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!("Disconnect request to {} failed: {}", self.broker, e);
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut event_task).await.is_err() {
            event_task.abort();
        }
        let abandoned = self.tracker.lock().abandon_all();
        if abandoned > 0 {
            tracing::debug!("{} deliveries unacknowledged at disconnect", abandoned);
        }
        tracing::info!("Disconnected from MQTT broker {}", self.broker);
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<Delivery, PublishError> {
        let qos = to_rumqttc(message.qos);
        let (notifier, delivery) = Delivery::pending();

        // hold the tracker while enqueueing so the event loop cannot see
        // this publish before its handle is queued
        let mut tracker = self.tracker.lock();
        self.client
            .try_publish(message.topic, qos, message.retain, message.payload)
            .map_err(|e| PublishError::SendFailed(e.to_string()))?;
        tracker.queued.push_back((qos, notifier));

        Ok(delivery)
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    tracker: Arc<Mutex<DeliveryTracker>>,
    connected_tx: oneshot::Sender<Result<(), String>>,
    broker: String,
) {
    let mut connected_tx = Some(connected_tx);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                let result = match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(format!("{code:?}")),
                };
                let refused = result.is_err();
                match connected_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => tracing::info!("Reconnected to MQTT broker {}", broker),
                }
                if refused {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => tracker.lock().on_completed(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => tracker.lock().on_completed(comp.pkid),
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => tracker.lock().on_sent(pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                if let Some(tx) = connected_tx.take() {
                    let _ = tx.send(Err(e.to_string()));
                    break;
                }
                let abandoned = tracker.lock().on_connection_lost();
                tracing::warn!(
                    "MQTT connection to {} lost ({} deliveries abandoned): {}",
                    broker,
                    abandoned,
                    e
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smlbridge_core::DeliveryStatus;

    #[tokio::test]
    async fn test_tracker_matches_publishes_in_order() {
        let mut tracker = DeliveryTracker::default();
        let (n1, d1) = Delivery::pending();
        let (n2, d2) = Delivery::pending();
        let (n3, d3) = Delivery::pending();
        tracker.queued.push_back((rumqttc::QoS::AtLeastOnce, n1));
        tracker.queued.push_back((rumqttc::QoS::AtMostOnce, n2));
        tracker.queued.push_back((rumqttc::QoS::AtLeastOnce, n3));

        tracker.on_sent(7);
        tracker.on_sent(0);
        tracker.on_sent(8);
        tracker.on_completed(8);

        let bound = Duration::from_millis(10);
        assert_eq!(d2.wait(bound).await, DeliveryStatus::Acknowledged);
        assert_eq!(d3.wait(bound).await, DeliveryStatus::Acknowledged);
        assert_eq!(d1.wait(bound).await, DeliveryStatus::TimedOut);
        assert_eq!(tracker.in_flight.len(), 1);
    }

    #[tokio::test]
    async fn test_tracker_abandon() {
        let mut tracker = DeliveryTracker::default();
        let (n1, d1) = Delivery::pending();
        tracker.queued.push_back((rumqttc::QoS::AtLeastOnce, n1));
        tracker.on_sent(1);

        assert_eq!(tracker.abandon_all(), 1);
        assert_eq!(d1.wait(Duration::from_millis(10)).await, DeliveryStatus::Abandoned);

        // stray events after a reset are ignored
        tracker.on_sent(2);
        tracker.on_completed(1);
        assert!(tracker.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_connection_loss_keeps_queued_order() {
        let bound = Duration::from_millis(10);
        let mut tracker = DeliveryTracker::default();
        let (na, da) = Delivery::pending();
        tracker.queued.push_back((rumqttc::QoS::AtLeastOnce, na));

        // A was still in the request channel when the connection dropped
        assert_eq!(tracker.on_connection_lost(), 0);
        let (nb, db) = Delivery::pending();
        tracker.queued.push_back((rumqttc::QoS::AtLeastOnce, nb));

        // A is written and acknowledged after reconnecting
        tracker.on_sent(1);
        tracker.on_completed(1);
        assert_eq!(da.wait(bound).await, DeliveryStatus::Acknowledged);
        assert_eq!(db.wait(bound).await, DeliveryStatus::TimedOut);
        assert_eq!(tracker.queued.len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_publish_not_matched_to_new_handle() {
        let bound = Duration::from_millis(10);
        let mut tracker = DeliveryTracker::default();
        let (na, da) = Delivery::pending();
        tracker.queued.push_back((rumqttc::QoS::AtLeastOnce, na));
        tracker.on_sent(1);

        assert_eq!(tracker.on_connection_lost(), 1);
        assert_eq!(da.wait(bound).await, DeliveryStatus::Abandoned);

        let (nb, db) = Delivery::pending();
        tracker.queued.push_back((rumqttc::QoS::AtLeastOnce, nb));

        // rumqttc resends A under its old packet id
        tracker.on_sent(1);
        tracker.on_completed(1);
        assert_eq!(tracker.queued.len(), 1);

        tracker.on_sent(2);
        tracker.on_completed(2);
        assert_eq!(db.wait(bound).await, DeliveryStatus::Acknowledged);
        assert!(tracker.replayed.is_empty());
        assert!(tracker.in_flight.is_empty());
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(to_rumqttc(Qos::AtMostOnce), rumqttc::QoS::AtMostOnce);
        assert_eq!(to_rumqttc(Qos::ExactlyOnce), rumqttc::QoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // nothing listens on port 1 on the loopback interface
        let config = MqttConfig::new("127.0.0.1").with_port(1);
        let err = MqttPublisher::connect(&config).await.err().unwrap();
        assert!(matches!(
            err,
            ConnectionError::Refused { .. } | ConnectionError::Timeout { .. }
        ));
    }
}
