//! OBIS object identifiers.
//!
//! An OBIS code labels one measured quantity inside a meter record, e.g.
//! `1-0:1.8.0*255` for total imported active energy. On the wire it is a
//! plain byte sequence (six bytes for standard codes); on the command line
//! it is written as dot-separated decimals (`1.0.1.8.0`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// OBIS code as an ordered byte sequence.
///
/// Codes are compared byte for byte, so a five-byte code never matches a
/// six-byte one even if the first five bytes agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObisCode(Vec<u8>);

impl ObisCode {
    /// Create a code from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes of the code.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Human-readable object name.
    ///
    /// Six-byte codes use the reduced ID notation `A-B:C.D.E*F`; anything
    /// else falls back to the dotted decimal form.
    pub fn object_name(&self) -> String {
        match self.0.as_slice() {
            [a, b, c, d, e, f] => format!("{a}-{b}:{c}.{d}.{e}*{f}"),
            _ => self.dotted(),
        }
    }

    /// Dotted decimal form, the same syntax accepted by [`FromStr`].
    pub fn dotted(&self) -> String {
        self.0
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl From<&[u8]> for ObisCode {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for ObisCode {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes.to_vec())
    }
}

impl FromStr for ObisCode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = Vec::new();
        for part in s.trim().split('.') {
            // u8 parsing rejects signs, blanks and anything above 255
            let byte = part
                .parse::<u8>()
                .map_err(|_| ConfigError::InvalidObisCode(s.to_string()))?;
            bytes.push(byte);
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.object_name())
    }
}
