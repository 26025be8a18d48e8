//! Error types for the bridge pipeline.
//!
//! Configuration and connection errors stop a run before it starts, decode
//! errors end the decode pass, and transform/publish errors only ever affect
//! a single record.

use thiserror::Error;

/// Malformed sensor declaration or missing required configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid OBIS code: {0}")]
    InvalidObisCode(String),

    #[error("invalid correction factor: {0}")]
    InvalidCorrectionFactor(String),

    #[error("invalid sensor value format: {0}")]
    InvalidFormat(String),

    #[error("duplicate value name: {0}")]
    DuplicateValueName(String),

    #[error("missing required configuration: {0}")]
    Missing(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The decoder collaborator cannot parse further input.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated stream: {0}")]
    Truncated(String),

    #[error("checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    Checksum { expected: u16, actual: u16 },

    #[error("malformed data at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
}

impl DecodeError {
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }
}

/// A matched record's payload cannot be interpreted as a number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("non-numeric payload for {object}: {kind}")]
    NonNumeric { object: String, kind: &'static str },
}

/// The messaging collaborator refused a publish outright.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("publisher not connected")]
    NotConnected,

    #[error("publish failed: {0}")]
    SendFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Broker connection failure at setup.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection to {broker} timed out after {timeout_ms}ms")]
    Timeout { broker: String, timeout_ms: u64 },

    #[error("connection to {broker} refused: {reason}")]
    Refused { broker: String, reason: String },

    #[error("connection to {broker} failed: {reason}")]
    Failed { broker: String, reason: String },
}
