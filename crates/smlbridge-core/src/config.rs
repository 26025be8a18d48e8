//! Shared configuration defaults.
//!
//! Defaults and environment variable names used across the workspace live
//! here so the CLI, the MQTT adapter and the tests agree on them.

use std::time::Duration;

/// Correction factor used when a declaration has only four fields.
pub const DEFAULT_CORRECTION_FACTOR: f64 = 1.0;

/// Publish defaults
pub mod publish {
    use super::Duration;

    /// Upper bound on how long a publish may wait for acknowledgement.
    pub const DEFAULT_TIMEOUT_MS: u64 = 50;
    /// At-least-once, so there is an acknowledgement to wait for.
    pub const DEFAULT_QOS: u8 = 1;
    pub const DEFAULT_RETAIN: bool = false;

    pub fn default_timeout() -> Duration {
        Duration::from_millis(DEFAULT_TIMEOUT_MS)
    }
}

/// Home Assistant discovery defaults
pub mod discovery {
    pub const DEFAULT_PREFIX: &str = "homeassistant";
    pub const COMPONENT: &str = "sensor";
}

/// Broker defaults
pub mod broker {
    pub const DEFAULT_PORT: u16 = 1883;
    pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
    pub const CLIENT_ID_PREFIX: &str = "smlbridge";
}

/// Environment variable names
pub mod env_vars {
    pub const BROKER: &str = "SMLBRIDGE_BROKER";
    pub const FILE: &str = "SMLBRIDGE_FILE";
    pub const LOG_JSON: &str = "SMLBRIDGE_LOG_JSON";
    pub const PUBLISH_TIMEOUT_MS: &str = "SMLBRIDGE_PUBLISH_TIMEOUT_MS";

    /// Whether JSON log output was requested.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }
}
