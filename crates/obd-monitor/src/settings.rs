//! Monitor settings
//!
//! Loaded from an optional TOML file, then overridden by `OBD_`-prefixed
//! environment variables (`OBD_SERIAL__DEVICE=/dev/rfcomm0`).

use config::{Config, Environment, File};
use obd_interpreter::{InterpreterConfig, PollerConfig};
use obd_protocol::{ObdProtocol, SerialConfig};
use serde::{Deserialize, Serialize};

/// Which adapter link to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Serial,
    #[default]
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// trace, debug, info, warn or error
    pub log_level: String,
    pub channel: ChannelKind,
    pub serial: SerialConfig,
    pub interpreter: InterpreterConfig,
    pub protocol: ObdProtocol,
    pub poll: PollerConfig,
    /// Stop after this many seconds instead of waiting for Ctrl-C
    pub run_seconds: Option<u64>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            channel: ChannelKind::Simulated,
            serial: SerialConfig::default(),
            interpreter: InterpreterConfig::default(),
            protocol: ObdProtocol::Auto,
            poll: PollerConfig::default(),
            run_seconds: None,
        }
    }
}

impl MonitorSettings {
    /// Load from `path` (if given) and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix("OBD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_interpreter::ViolationPolicy;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let settings = MonitorSettings::load(None).unwrap();
        assert_eq!(settings.channel, ChannelKind::Simulated);
        assert_eq!(settings.serial.baud_rate, 38400);
        assert_eq!(settings.level(), tracing::Level::INFO);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("obd-monitor-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"
channel = "serial"
protocol = "iso15765_4_can11bit500"
run_seconds = 10

[serial]
device = "/dev/rfcomm0"

[interpreter]
violation_policy = "abort"
ledger_capacity = 8
"#
        )
        .unwrap();

        let settings = MonitorSettings::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.channel, ChannelKind::Serial);
        assert_eq!(settings.serial.device, "/dev/rfcomm0");
        assert_eq!(settings.serial.baud_rate, 38400);
        assert_eq!(settings.interpreter.violation_policy, ViolationPolicy::Abort);
        assert_eq!(settings.interpreter.ledger_capacity, Some(8));
        assert_eq!(settings.protocol, ObdProtocol::Iso15765_4Can11bit500);
        assert_eq!(settings.run_seconds, Some(10));
        assert_eq!(settings.level(), tracing::Level::DEBUG);
    }
}
