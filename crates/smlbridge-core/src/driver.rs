//! Decode driver.
//!
//! Pulls records from a [`RecordSource`] one at a time and runs every
//! matching dispatch entry before asking for the next record. A decode
//! error ends the pass; values published before it stay published.

use serde::Serialize;

use crate::declaration::SensorSpecification;
use crate::discovery::{self, AnnounceSummary};
use crate::error::{ConfigError, DecodeError};
use crate::publish::{PublishGate, PublishOutcome};
use crate::record::{MeasurementRecord, RecordSource};
use crate::registry::{self, DispatchEntry, DispatchTable, ValueRegistry};
use crate::transform;

/// Counters for one decode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Records read from the source
    pub records: u64,
    /// Records matching at least one entry
    pub matched: u64,
    /// Entries that reached the publish gate
    pub published: u64,
    pub acknowledged: u64,
    /// Publishes whose acknowledgement did not arrive within the bound
    pub unacknowledged: u64,
    pub failed_publishes: u64,
    pub transform_failures: u64,
}

/// Pipeline for one device and one input stream.
pub struct DecodeDriver {
    registry: ValueRegistry,
    table: DispatchTable,
    gate: PublishGate,
    summary: RunSummary,
}

impl DecodeDriver {
    /// Build registry and dispatch table from the specification.
    pub fn new(
        spec: &SensorSpecification,
        device_name: &str,
        gate: PublishGate,
    ) -> Result<Self, ConfigError> {
        if spec.is_empty() {
            return Err(ConfigError::Missing("sensor values".to_string()));
        }
        let (registry, table) = registry::build(spec, device_name)?;
        Ok(Self {
            registry,
            table,
            gate,
            summary: RunSummary::default(),
        })
    }

    pub fn registry(&self) -> &ValueRegistry {
        &self.registry
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Counters so far, also valid after a failed run.
    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Publish discovery configs for every registered value.
    pub async fn announce(&self) -> AnnounceSummary {
        discovery::announce(&self.gate, &self.registry).await
    }

    /// Decode the source to its end, dispatching matching records.
    pub async fn run<S>(&mut self, source: &mut S) -> Result<RunSummary, DecodeError>
    where
        S: RecordSource + ?Sized,
    {
        loop {
            let record = match source.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(
                        "Decoding {} stopped after {} records: {}",
                        self.registry.device_name(),
                        self.summary.records,
                        e
                    );
                    return Err(e);
                }
            };
            self.summary.records += 1;
            self.dispatch(&record).await;
        }

        tracing::info!(
            "Finished {}: {} records, {} matched, {} published ({} acknowledged)",
            self.registry.device_name(),
            self.summary.records,
            self.summary.matched,
            self.summary.published,
            self.summary.acknowledged
        );
        Ok(self.summary)
    }

    /// Run every entry matching the record, in registration order.
    async fn dispatch(&mut self, record: &MeasurementRecord) {
        let Self {
            registry,
            table,
            gate,
            summary,
        } = self;

        let mut matched = false;
        for entry in table.matching(&record.obis) {
            matched = true;
            handle_entry(entry, record, registry, gate, summary).await;
        }
        if matched {
            summary.matched += 1;
        }
    }
}

/// Generic callback shared by all dispatch entries.
async fn handle_entry(
    entry: &DispatchEntry,
    record: &MeasurementRecord,
    registry: &mut ValueRegistry,
    gate: &PublishGate,
    summary: &mut RunSummary,
) {
    let measurement = match transform::correct(record, entry.correction_factor) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Skipping record: {}", e);
            summary.transform_failures += 1;
            return;
        }
    };

    if let Some(value) = registry.get(entry.handle) {
        tracing::info!(
            "{} {} = {} {}",
            measurement.object_name,
            value.value_name,
            measurement.value,
            value.unit_of_measure
        );
    }

    summary.published += 1;
    match gate.publish_value(registry, entry.handle, &measurement).await {
        PublishOutcome::Acknowledged => summary.acknowledged += 1,
        PublishOutcome::Unacknowledged(status) => {
            tracing::debug!("{} acknowledgement unknown: {:?}", measurement.object_name, status);
            summary.unacknowledged += 1
        }
        PublishOutcome::Failed(_) => summary.failed_publishes += 1,
    }
}
