//! Command line front end for the SML to MQTT bridge.
//!
//! Turns flags, environment variables and an optional TOML file into
//! [`Settings`], then runs one decode pass of an SML file against an MQTT
//! broker.

pub mod app;
pub mod args;
pub mod logging;
pub mod settings;

pub use app::{bridge, run};
pub use args::Args;
pub use settings::{FileConfig, Settings};
