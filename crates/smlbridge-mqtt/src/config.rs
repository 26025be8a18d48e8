//! MQTT connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smlbridge_core::config::broker;
use smlbridge_core::ConfigError;

/// MQTT broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host.
    pub host: String,

    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// How long to wait for the broker's CONNACK.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Capacity of the client's request channel.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

fn default_port() -> u16 {
    broker::DEFAULT_PORT
}

fn default_keep_alive() -> u64 {
    broker::DEFAULT_KEEP_ALIVE_SECS
}

fn default_connect_timeout() -> u64 {
    broker::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_request_capacity() -> usize {
    64
}

impl MqttConfig {
    /// Create a configuration for a broker host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            connect_timeout_ms: default_connect_timeout(),
            request_capacity: default_request_capacity(),
        }
    }

    /// Parse a broker URL.
    ///
    /// Accepts `tcp://`, `mqtt://` or no scheme, optional `user:password@`
    /// credentials, and an optional port (default 1883). IPv6 hosts must be
    /// bracketed.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid(format!("broker URL '{url}': {reason}"));

        let rest = match url.trim().split_once("://") {
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "tcp" | "mqtt" => rest,
                other => return Err(invalid(&format!("unsupported scheme '{other}'"))),
            },
            None => url.trim(),
        };
        let rest = rest.trim_end_matches('/');

        let (credentials, address) = match rest.rsplit_once('@') {
            Some((credentials, address)) => (Some(credentials), address),
            None => (None, rest),
        };

        let (host, port) = if let Some(bracketed) = address.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => Some(port),
                None if tail.is_empty() => None,
                None => return Err(invalid("unexpected characters after host")),
            };
            (host, port)
        } else {
            match address.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (address, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let mut config = Self::new(host);
        if let Some(port) = port {
            config.port = port.parse().map_err(|_| invalid("invalid port"))?;
        }
        if let Some(credentials) = credentials {
            let (user, pass) = credentials.split_once(':').unwrap_or((credentials, ""));
            config = config.with_auth(user, pass);
        }
        Ok(config)
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set authentication.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the client ID.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Client ID, generated when not configured.
    pub fn client_id_or_default(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", broker::CLIENT_ID_PREFIX, uuid::Uuid::new_v4().simple()))
    }

    /// Get the full broker address.
    pub fn broker_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
