//! Value registry and dispatch table.
//!
//! The registry owns one [`SensorValue`] per declaration, scoped to a single
//! logical device. The dispatch table maps OBIS codes to [`DispatchEntry`]
//! values that point back into the registry by [`ValueHandle`]; the table
//! never owns the values it refers to.
//!
//! ```text
//! SensorSpecification ──build──┬─→ ValueRegistry   (device, value) → SensorValue
//!                              └─→ DispatchTable   obis → [entry, entry, ...]
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::declaration::{SensorDeclaration, SensorSpecification};
use crate::error::ConfigError;
use crate::obis::ObisCode;

/// Index of a sensor value inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ValueHandle(usize);

impl ValueHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Turn a display name into a topic-safe identifier.
///
/// ASCII letters and digits are kept (lower-cased); everything else becomes
/// `_`.
pub fn object_id(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Live sensor value bound to one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorValue {
    /// Device this value belongs to
    pub device_name: String,
    /// Value name from the declaration
    pub value_name: String,
    /// Topic-safe form of the value name
    pub value_id: String,
    pub device_class: String,
    pub unit_of_measure: String,
    /// Last value handed to the publish gate
    last_value: Option<f64>,
}

impl SensorValue {
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    pub(crate) fn set_last_value(&mut self, value: f64) {
        self.last_value = Some(value);
    }
}

/// Owner of all sensor values for one run.
#[derive(Debug, Clone)]
pub struct ValueRegistry {
    device_name: String,
    device_id: String,
    values: Vec<SensorValue>,
    by_name: HashMap<String, ValueHandle>,
}

impl ValueRegistry {
    /// Create an empty registry for a device.
    pub fn new(device_name: impl Into<String>) -> Result<Self, ConfigError> {
        let device_name = device_name.into();
        if device_name.trim().is_empty() {
            return Err(ConfigError::Missing("device name".to_string()));
        }
        Ok(Self {
            device_id: object_id(&device_name),
            device_name,
            values: Vec::new(),
            by_name: HashMap::new(),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Register a value for a declaration.
    ///
    /// Each value name may be registered once per device.
    pub fn register(&mut self, declaration: &SensorDeclaration) -> Result<ValueHandle, ConfigError> {
        if self.by_name.contains_key(&declaration.value_name) {
            return Err(ConfigError::DuplicateValueName(
                declaration.value_name.clone(),
            ));
        }

        let handle = ValueHandle(self.values.len());
        self.values.push(SensorValue {
            device_name: self.device_name.clone(),
            value_name: declaration.value_name.clone(),
            value_id: object_id(&declaration.value_name),
            device_class: declaration.device_class.clone(),
            unit_of_measure: declaration.unit_of_measure.clone(),
            last_value: None,
        });
        self.by_name.insert(declaration.value_name.clone(), handle);
        Ok(handle)
    }

    /// Look up a handle by value name.
    pub fn lookup(&self, value_name: &str) -> Option<ValueHandle> {
        self.by_name.get(value_name).copied()
    }

    pub fn get(&self, handle: ValueHandle) -> Option<&SensorValue> {
        self.values.get(handle.0)
    }

    pub(crate) fn get_mut(&mut self, handle: ValueHandle) -> Option<&mut SensorValue> {
        self.values.get_mut(handle.0)
    }

    /// Values in registration order.
    pub fn values(&self) -> &[SensorValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One OBIS code → sensor value association.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchEntry {
    pub obis_code: ObisCode,
    pub handle: ValueHandle,
    pub correction_factor: f64,
}

/// Dispatch entries in registration order, indexed by OBIS code.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    entries: Vec<DispatchEntry>,
    index: HashMap<ObisCode, Vec<usize>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: DispatchEntry) {
        self.index
            .entry(entry.obis_code.clone())
            .or_default()
            .push(self.entries.len());
        self.entries.push(entry);
    }

    /// Entries whose code equals `obis`, in registration order.
    pub fn matching<'a>(&'a self, obis: &ObisCode) -> impl Iterator<Item = &'a DispatchEntry> + 'a {
        self.index
            .get(obis)
            .map(|ids| ids.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[DispatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the registry and dispatch table for one device.
pub fn build(
    spec: &SensorSpecification,
    device_name: &str,
) -> Result<(ValueRegistry, DispatchTable), ConfigError> {
    let mut registry = ValueRegistry::new(device_name)?;
    let mut table = DispatchTable::new();

    for declaration in spec.iter() {
        let handle = registry.register(declaration)?;
        table.push(DispatchEntry {
            obis_code: declaration.obis_code.clone(),
            handle,
            correction_factor: declaration.correction_factor,
        });
        tracing::debug!(
            "Registered {} -> {}/{} (factor {})",
            declaration.obis_code.object_name(),
            registry.device_name(),
            declaration.value_name,
            declaration.correction_factor
        );
    }

    Ok((registry, table))
}
