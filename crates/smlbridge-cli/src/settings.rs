//! Effective run settings.
//!
//! A TOML file supplies the baseline, command line flags and environment
//! variables override it. Sensor declarations from both sources are
//! combined, file entries first.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smlbridge_core::config::{discovery, publish};
use smlbridge_core::{ConfigError, GateConfig, Qos, SensorSpecification};
use smlbridge_mqtt::MqttConfig;

use crate::args::Args;

/// Contents of the optional `--config` file.
///
/// ```toml
/// file = "/dev/ttyUSB0"
/// broker = "tcp://localhost:1883"
/// values = ["1.0.1.8.0,Energy,energy,kWh,0.001"]
///
/// [publish]
/// timeout_ms = 50
///
/// [mqtt]
/// client_id = "meter-bridge"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub file: Option<PathBuf>,
    pub broker: Option<String>,
    pub values: Vec<String>,
    pub publish: PublishSection,
    pub discovery: DiscoverySection,
    pub mqtt: MqttSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    pub timeout_ms: Option<u64>,
    pub qos: Option<u8>,
    pub retain: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub enabled: bool,
    pub prefix: Option<String>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSection {
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

impl FileConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SML input file
    pub input: PathBuf,
    /// Home Assistant device name, the input's base name
    pub device_name: String,
    pub mqtt: MqttConfig,
    pub spec: SensorSpecification,
    pub gate: GateConfig,
    pub discovery: bool,
}

impl Settings {
    /// Resolve settings from arguments, reading `--config` when given.
    pub fn resolve(args: &Args) -> Result<Self, ConfigError> {
        let file_config = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file_config)
    }

    /// Combine a parsed config file with the arguments.
    pub fn merge(args: &Args, file_config: FileConfig) -> Result<Self, ConfigError> {
        let FileConfig {
            file,
            broker,
            values,
            publish: publish_section,
            discovery: discovery_section,
            mqtt: mqtt_section,
        } = file_config;

        let input = args
            .file
            .clone()
            .or(file)
            .ok_or_else(|| ConfigError::Missing("file".to_string()))?;
        let broker = args
            .broker
            .clone()
            .or(broker)
            .ok_or_else(|| ConfigError::Missing("broker".to_string()))?;

        let declarations: Vec<&String> = values.iter().chain(args.values.iter()).collect();
        if declarations.is_empty() {
            return Err(ConfigError::Missing("value".to_string()));
        }
        let spec = SensorSpecification::from_strs(declarations)?;

        let device_name = device_name(&input)?;

        let mut mqtt = MqttConfig::from_url(&broker)?;
        if let (Some(user), Some(pass)) = (mqtt_section.username, mqtt_section.password) {
            mqtt = mqtt.with_auth(user, pass);
        }
        if let Some(secs) = mqtt_section.keep_alive_secs {
            mqtt.keep_alive_secs = secs;
        }
        if let Some(ms) = mqtt_section.connect_timeout_ms {
            mqtt.connect_timeout_ms = ms;
        }
        if let Some(client_id) = args.client_id.clone().or(mqtt_section.client_id) {
            mqtt = mqtt.with_client_id(client_id);
        }

        let qos = match args.qos.or(publish_section.qos) {
            Some(level) => Qos::try_from(level)?,
            None => Qos::try_from(publish::DEFAULT_QOS)?,
        };
        let timeout_ms = args
            .publish_timeout_ms
            .or(publish_section.timeout_ms)
            .unwrap_or(publish::DEFAULT_TIMEOUT_MS);
        let gate = GateConfig {
            timeout: Duration::from_millis(timeout_ms),
            qos,
            retain: args.retain || publish_section.retain.unwrap_or(publish::DEFAULT_RETAIN),
            topic_prefix: args
                .discovery_prefix
                .clone()
                .or(discovery_section.prefix)
                .unwrap_or_else(|| discovery::DEFAULT_PREFIX.to_string()),
        };
        if gate.topic_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("discovery prefix is empty".to_string()));
        }

        Ok(Self {
            input,
            device_name,
            mqtt,
            spec,
            gate,
            discovery: discovery_section.enabled && !args.no_discovery,
        })
    }
}

fn device_name(input: &Path) -> Result<String, ConfigError> {
    input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| {
            ConfigError::Invalid(format!("{} has no file name", input.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(file: &str, broker: &str, values: &[&str]) -> Args {
        Args {
            file: Some(PathBuf::from(file)),
            broker: Some(broker.to_string()),
            values: values.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_flags_only() {
        let args = args(
            "/dev/ttyUSB0",
            "tcp://localhost:1883",
            &["1.0.1.8.0,Energy,energy,kWh,0.001"],
        );
        let settings = Settings::merge(&args, FileConfig::default()).unwrap();

        assert_eq!(settings.device_name, "ttyUSB0");
        assert_eq!(settings.mqtt.host, "localhost");
        assert_eq!(settings.spec.len(), 1);
        assert_eq!(settings.gate.timeout, Duration::from_millis(50));
        assert_eq!(settings.gate.qos, Qos::AtLeastOnce);
        assert!(!settings.gate.retain);
        assert_eq!(settings.gate.topic_prefix, "homeassistant");
        assert!(settings.discovery);
    }

    #[test]
    fn test_missing_required() {
        let mut a = args("meter.bin", "localhost", &[]);
        assert_eq!(
            Settings::merge(&a, FileConfig::default()).unwrap_err(),
            ConfigError::Missing("value".to_string())
        );

        a.values.push("1.0.1.8.0,Energy,energy,kWh".to_string());
        a.broker = None;
        assert_eq!(
            Settings::merge(&a, FileConfig::default()).unwrap_err(),
            ConfigError::Missing("broker".to_string())
        );

        a.file = None;
        assert_eq!(
            Settings::merge(&a, FileConfig::default()).unwrap_err(),
            ConfigError::Missing("file".to_string())
        );
    }

    #[test]
    fn test_malformed_declaration_rejected() {
        let a = args("meter.bin", "localhost", &["1.0.x.8.0,Energy,energy,kWh"]);
        assert!(matches!(
            Settings::merge(&a, FileConfig::default()),
            Err(ConfigError::InvalidObisCode(_))
        ));
    }

    #[test]
    fn test_flags_override_file() {
        let file_config = FileConfig::from_toml(
            r#"
            file = "/var/lib/meter/from-file.bin"
            broker = "tcp://file-broker:1883"
            values = ["1.0.1.8.0,Energy,energy,kWh,0.001"]

            [publish]
            timeout_ms = 200
            qos = 0

            [discovery]
            enabled = false
            prefix = "ha"

            [mqtt]
            client_id = "from-file"
            username = "meter"
            password = "secret"
            "#,
        )
        .unwrap();

        let mut a = args("/tmp/flag.bin", "tcp://flag-broker", &["1.0.16.7.0,Power,power,W"]);
        a.publish_timeout_ms = Some(75);
        a.client_id = Some("from-flag".to_string());

        let settings = Settings::merge(&a, file_config).unwrap();
        assert_eq!(settings.device_name, "flag.bin");
        assert_eq!(settings.mqtt.host, "flag-broker");
        assert_eq!(settings.mqtt.client_id.as_deref(), Some("from-flag"));
        assert_eq!(settings.mqtt.username.as_deref(), Some("meter"));
        assert_eq!(settings.gate.timeout, Duration::from_millis(75));
        assert_eq!(settings.gate.qos, Qos::AtMostOnce);
        assert_eq!(settings.gate.topic_prefix, "ha");
        assert!(!settings.discovery);

        let names: Vec<_> = settings.spec.iter().map(|d| d.value_name.as_str()).collect();
        assert_eq!(names, vec!["Energy", "Power"]);
    }

    #[test]
    fn test_invalid_qos() {
        let mut a = args("meter.bin", "localhost", &["1.0.1.8.0,Energy,energy,kWh"]);
        a.qos = Some(3);
        assert!(matches!(
            Settings::merge(&a, FileConfig::default()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_config_value_types() {
        assert!(FileConfig::from_toml("broker = 5").is_err());
        assert!(FileConfig::from_toml("[publish]\ntimeout_ms = 10").is_ok());
    }
}
