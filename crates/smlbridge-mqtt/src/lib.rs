//! MQTT messaging adapter.
//!
//! Implements [`smlbridge_core::Publisher`] on top of rumqttc's
//! `AsyncClient`, reporting broker acknowledgements through
//! [`smlbridge_core::Delivery`] handles so the publish gate can bound its
//! wait.

pub mod config;
pub mod publisher;

pub use config::MqttConfig;
pub use publisher::MqttPublisher;
