//! Decoded measurement records and the decoder boundary.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, TransformError};
use crate::obis::ObisCode;

/// Raw value carried by a measurement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Bytes(Vec<u8>),
}

impl RecordValue {
    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordValue::Bool(_) => "boolean",
            RecordValue::Int(_) => "integer",
            RecordValue::Uint(_) => "unsigned",
            RecordValue::Bytes(_) => "octet string",
        }
    }
}

/// One decoded unit of the meter stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// OBIS identifier of the record
    pub obis: ObisCode,
    /// Meter status word, if sent
    pub status: Option<u64>,
    /// DLMS unit code, if sent
    pub unit: Option<u8>,
    /// Decimal exponent applied to the raw value
    pub scaler: Option<i8>,
    /// Raw value
    pub value: RecordValue,
}

impl MeasurementRecord {
    pub fn new(obis: ObisCode, value: RecordValue) -> Self {
        Self {
            obis,
            status: None,
            unit: None,
            scaler: None,
            value,
        }
    }

    pub fn with_scaler(mut self, scaler: i8) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn with_unit(mut self, unit: u8) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_status(mut self, status: u64) -> Self {
        self.status = Some(status);
        self
    }

    /// Object name of the record, e.g. `1-0:1.8.0*255`.
    pub fn object_name(&self) -> String {
        self.obis.object_name()
    }

    /// Numeric reading: the raw value scaled by `10^scaler`.
    pub fn as_f64(&self) -> Result<f64, TransformError> {
        let raw = match &self.value {
            RecordValue::Int(v) => *v as f64,
            RecordValue::Uint(v) => *v as f64,
            other => {
                return Err(TransformError::NonNumeric {
                    object: self.object_name(),
                    kind: other.kind(),
                })
            }
        };
        Ok(match self.scaler {
            Some(scaler) if scaler != 0 => raw * 10f64.powi(i32::from(scaler)),
            _ => raw,
        })
    }
}

/// Decoder collaborator: yields records in stream order.
///
/// `Ok(None)` marks the end of the stream. Once an error is returned the
/// source is not polled again.
pub trait RecordSource {
    fn next_record(&mut self) -> Result<Option<MeasurementRecord>, DecodeError>;
}

impl RecordSource for std::vec::IntoIter<Result<MeasurementRecord, DecodeError>> {
    fn next_record(&mut self) -> Result<Option<MeasurementRecord>, DecodeError> {
        self.next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy(value: RecordValue) -> MeasurementRecord {
        MeasurementRecord::new(ObisCode::from([1, 0, 1, 8, 0, 255]), value)
    }

    #[test]
    fn test_numeric_values() {
        assert_eq!(energy(RecordValue::Uint(123456)).as_f64().unwrap(), 123456.0);
        assert_eq!(energy(RecordValue::Int(-42)).as_f64().unwrap(), -42.0);
    }

    #[test]
    fn test_scaler_applied() {
        let record = energy(RecordValue::Int(12345)).with_scaler(-1);
        assert!((record.as_f64().unwrap() - 1234.5).abs() < 1e-9);

        let record = energy(RecordValue::Uint(7)).with_scaler(2);
        assert_eq!(record.as_f64().unwrap(), 700.0);
    }

    #[test]
    fn test_non_numeric_rejected() {
        let err = energy(RecordValue::Bytes(b"EMH".to_vec())).as_f64().unwrap_err();
        assert_eq!(
            err,
            TransformError::NonNumeric {
                object: "1-0:1.8.0*255".to_string(),
                kind: "octet string",
            }
        );
        assert!(energy(RecordValue::Bool(true)).as_f64().is_err());
    }
}
