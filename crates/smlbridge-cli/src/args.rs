//! Command line arguments.

use std::path::PathBuf;

use clap::Parser;
use smlbridge_core::config::env_vars;

/// Reads a file with SML encoded meter values and publishes selected values
/// to an MQTT broker as Home Assistant sensors.
#[derive(Parser, Debug, Default)]
#[command(name = "sml2mqtt")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// File with SML encoded sensor values (e.g. /dev/ttyUSB0)
    #[arg(short, long, env = env_vars::FILE)]
    pub file: Option<PathBuf>,

    /// MQTT broker URL, e.g. tcp://localhost:1883
    #[arg(short, long, env = env_vars::BROKER)]
    pub broker: Option<String>,

    /// Sensor value to publish:
    /// ObisCode,ValueName,DeviceClass,UnitOfMeasure[,CorrectionFactor]
    /// (repeatable, e.g. 1.0.1.8.0,Energy,energy,kWh,0.001)
    #[arg(long = "value", value_name = "DECLARATION")]
    pub values: Vec<String>,

    /// TOML configuration file; flags take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// How long to wait for each publish to be acknowledged
    #[arg(long, env = env_vars::PUBLISH_TIMEOUT_MS)]
    pub publish_timeout_ms: Option<u64>,

    /// QoS for state messages (0, 1 or 2)
    #[arg(long)]
    pub qos: Option<u8>,

    /// Publish state messages with the retain flag
    #[arg(long)]
    pub retain: bool,

    /// Topic prefix for state and discovery messages
    #[arg(long)]
    pub discovery_prefix: Option<String>,

    /// Do not publish Home Assistant discovery configs
    #[arg(long)]
    pub no_discovery: bool,

    /// MQTT client ID (generated when omitted)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
