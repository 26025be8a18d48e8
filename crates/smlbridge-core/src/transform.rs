//! Value transform: raw reading times correction factor.

use serde::Serialize;

use crate::error::TransformError;
use crate::record::MeasurementRecord;

/// Corrected reading produced for one matched record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectedMeasurement {
    /// Object name of the source record (e.g. `1-0:1.8.0*255`)
    pub object_name: String,
    pub value: f64,
}

/// Apply the correction factor to a record's numeric reading.
pub fn correct(
    record: &MeasurementRecord,
    correction_factor: f64,
) -> Result<CorrectedMeasurement, TransformError> {
    let raw = record.as_f64()?;
    Ok(CorrectedMeasurement {
        object_name: record.object_name(),
        value: raw * correction_factor,
    })
}
