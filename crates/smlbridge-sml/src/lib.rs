//! SML (Smart Message Language) decoder.
//!
//! Decodes transport-framed SML streams, as written by electricity meters
//! on their optical interface, into [`smlbridge_core::MeasurementRecord`]
//! values.
//!
//! ```text
//! bytes ──FrameReader──→ payload ──tlv::Parser──→ Element tree ──message──→ records
//! ```
//!
//! [`SmlReader`] implements [`smlbridge_core::RecordSource`], so it plugs
//! straight into the decode driver.

pub mod builder;
pub mod crc;
pub mod message;
pub mod reader;
pub mod tlv;
pub mod transport;

pub use builder::SmlFileBuilder;
pub use reader::SmlReader;
