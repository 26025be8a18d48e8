//! Sensor value declarations.
//!
//! A declaration is written as
//! `obisCode,valueName,deviceClass,unitOfMeasure[,correctionFactor]`, e.g.
//! `1.0.1.8.0,Energy,energy,kWh,0.001`. Declarations are collected into a
//! [`SensorSpecification`] before the pipeline is built and are never
//! mutated afterwards.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_CORRECTION_FACTOR;
use crate::error::ConfigError;
use crate::obis::ObisCode;

/// One configured sensor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDeclaration {
    /// OBIS code selecting the meter records for this value
    pub obis_code: ObisCode,
    /// Value name, unique within a run
    pub value_name: String,
    /// Home Assistant style device class (e.g. "energy")
    pub device_class: String,
    /// Unit of measure (e.g. "kWh")
    pub unit_of_measure: String,
    /// Multiplier applied to every raw reading
    pub correction_factor: f64,
}

impl SensorDeclaration {
    /// Create a declaration with the default correction factor.
    pub fn new(
        obis_code: ObisCode,
        value_name: impl Into<String>,
        device_class: impl Into<String>,
        unit_of_measure: impl Into<String>,
    ) -> Self {
        Self {
            obis_code,
            value_name: value_name.into(),
            device_class: device_class.into(),
            unit_of_measure: unit_of_measure.into(),
            correction_factor: DEFAULT_CORRECTION_FACTOR,
        }
    }

    /// Set the correction factor.
    pub fn with_correction_factor(mut self, factor: f64) -> Self {
        self.correction_factor = factor;
        self
    }
}

/// Parses `ObisCode,ValueName,DeviceClass,UnitOfMeasure[,CorrectionFactor]`.
///
/// Whitespace around each field is ignored, so `"1.0.1.8.0, Energy, energy,
/// kWh, 0.001"` is accepted; whitespace inside a field is kept.
impl FromStr for SensorDeclaration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();

        let correction_factor = match fields.len() {
            4 => DEFAULT_CORRECTION_FACTOR,
            5 => fields[4]
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .ok_or_else(|| ConfigError::InvalidCorrectionFactor(s.to_string()))?,
            _ => return Err(ConfigError::InvalidFormat(s.to_string())),
        };

        let obis_code: ObisCode = fields[0].parse()?;
        if fields[1].is_empty() {
            return Err(ConfigError::InvalidFormat(s.to_string()));
        }

        Ok(Self {
            obis_code,
            value_name: fields[1].to_string(),
            device_class: fields[2].to_string(),
            unit_of_measure: fields[3].to_string(),
            correction_factor,
        })
    }
}

/// Ordered collection of sensor declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSpecification {
    declarations: Vec<SensorDeclaration>,
}

impl SensorSpecification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one declaration string and append it.
    ///
    /// On error the specification is left unchanged.
    pub fn add_str(&mut self, declaration: &str) -> Result<&SensorDeclaration, ConfigError> {
        let parsed = declaration.parse::<SensorDeclaration>()?;
        self.add(parsed)
    }

    /// Append an already parsed declaration, rejecting duplicate value names.
    pub fn add(&mut self, declaration: SensorDeclaration) -> Result<&SensorDeclaration, ConfigError> {
        if self
            .declarations
            .iter()
            .any(|d| d.value_name == declaration.value_name)
        {
            return Err(ConfigError::DuplicateValueName(declaration.value_name));
        }
        self.declarations.push(declaration);
        Ok(&self.declarations[self.declarations.len() - 1])
    }

    /// Build a specification from a list of declaration strings.
    pub fn from_strs<I, S>(declarations: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = Self::new();
        for declaration in declarations {
            spec.add_str(declaration.as_ref())?;
        }
        Ok(spec)
    }

    pub fn declarations(&self) -> &[SensorDeclaration] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorDeclaration> {
        self.declarations.iter()
    }
}
