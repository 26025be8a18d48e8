//! OBIS-to-sensor dispatch and publish pipeline.
//!
//! This crate holds the protocol-independent half of the bridge. The meter
//! decoder and the broker client plug in through two traits:
//! [`RecordSource`] (implemented by `smlbridge-sml`) and [`Publisher`]
//! (implemented by `smlbridge-mqtt`).
//!
//! ## Architecture
//!
//! ```text
//! "1.0.1.8.0,Energy,energy,kWh,0.001"
//!        │ parse
//!        ▼
//! SensorSpecification ──build──→ ValueRegistry + DispatchTable
//!                                        │
//! RecordSource ──next_record──→ DecodeDriver ──match──→ transform::correct
//!                                                              │
//!                                        PublishGate (bounded wait) ──→ Publisher
//! ```
//!
//! Everything after setup runs on one logical thread of control: records
//! are dispatched in stream order and each publish is awaited, up to the
//! gate's bound, before the next record is decoded.

pub mod config;
pub mod declaration;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod obis;
pub mod publish;
pub mod record;
pub mod registry;
pub mod transform;

pub use declaration::{SensorDeclaration, SensorSpecification};
pub use discovery::{AnnounceSummary, DiscoveryConfig};
pub use driver::{DecodeDriver, RunSummary};
pub use error::{ConfigError, ConnectionError, DecodeError, PublishError, TransformError};
pub use obis::ObisCode;
pub use publish::{
    Delivery, DeliveryNotifier, DeliveryStatus, GateConfig, OutboundMessage, PublishGate,
    PublishOutcome, Publisher, Qos,
};
pub use record::{MeasurementRecord, RecordSource, RecordValue};
pub use registry::{DispatchEntry, DispatchTable, SensorValue, ValueHandle, ValueRegistry};
pub use transform::CorrectedMeasurement;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
