// src/settings.rs
//
// UART settings as stored on disk (TOML).
//
//   port = "/dev/ttyUSB0"
//   baud_rate = 115200
//   data_bits = 8
//   parity = "none"
//   stop_bits = 1
//
// Every field except `port` may be omitted and falls back to 57600 8N1.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::io::error::IoError;
#[cfg(unix)]
use crate::io::error::StreamError;
use crate::io::serial::config::{encode, Parity, SerialConfig};
#[cfg(unix)]
use crate::io::serial::uart::UartSerial;
#[cfg(unix)]
use crate::io::stream::Stream;
use crate::io::stream::DEFAULT_BAUD_RATE;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UartSettings {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}

impl UartSettings {
    /// Settings for `port` at the default 57600 8N1
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: Parity::default(),
            stop_bits: default_stop_bits(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, IoError> {
        let settings: UartSettings = toml::from_str(content)
            .map_err(|e| IoError::configuration(format!("Failed to parse settings: {}", e)))?;
        settings.line_config()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String, IoError> {
        toml::to_string_pretty(self)
            .map_err(|e| IoError::configuration(format!("Failed to serialize settings: {}", e)))
    }

    /// The line configuration constant these settings describe
    pub fn line_config(&self) -> Result<SerialConfig, IoError> {
        encode(self.data_bits, self.parity, self.stop_bits)
    }

    /// Create the UART and begin it with these settings
    #[cfg(unix)]
    pub fn open(&self) -> Result<UartSerial, StreamError> {
        let config = self
            .line_config()
            .map_err(|e| StreamError::new("begin", e))?;
        let mut uart = UartSerial::new(self.port.as_str());
        uart.begin_with(self.baud_rate, config)?;
        Ok(uart)
    }
}

/// Load UART settings from a TOML file
pub fn load_settings(path: &Path) -> Result<UartSettings, IoError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IoError::configuration(format!("Failed to read settings {}: {}", path.display(), e))
    })?;
    UartSettings::from_toml_str(&content)
}

/// Write UART settings to a TOML file
pub fn save_settings(path: &Path, settings: &UartSettings) -> Result<(), IoError> {
    let content = settings.to_toml_string()?;
    std::fs::write(path, content).map_err(|e| {
        IoError::configuration(format!("Failed to write settings {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::error::ErrorCategory;
    use crate::io::serial::config::{SERIAL_7O2, SERIAL_8N1};

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings = UartSettings::from_toml_str(r#"port = "/dev/ttyUSB0""#).unwrap();
        assert_eq!(settings, UartSettings::new("/dev/ttyUSB0"));
        assert_eq!(settings.baud_rate, 57_600);
        assert_eq!(settings.line_config().unwrap(), SERIAL_8N1);
    }

    #[test]
    fn test_full_settings() {
        let settings = UartSettings::from_toml_str(
            r#"
            port = "/dev/ttyAMA0"
            baud_rate = 115200
            data_bits = 7
            parity = "odd"
            stop_bits = 2
            "#,
        )
        .unwrap();
        assert_eq!(settings.port, "/dev/ttyAMA0");
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.parity, Parity::Odd);
        assert_eq!(settings.line_config().unwrap(), SERIAL_7O2);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        // Missing port
        let err = UartSettings::from_toml_str("baud_rate = 9600").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = UartSettings::from_toml_str(
            r#"
            port = "/dev/ttyS0"
            data_bits = 9
            "#,
        )
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);

        assert!(UartSettings::from_toml_str(r#"port = "x"
parity = "mark""#)
        .is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("serial-wiring-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("uart.toml");

        let mut settings = UartSettings::new("/dev/ttyACM0");
        settings.baud_rate = 9_600;
        settings.parity = Parity::Even;
        save_settings(&path, &settings).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(r#"parity = "even""#));
        assert_eq!(load_settings(&path).unwrap(), settings);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_settings(Path::new("/nonexistent/serial-wiring.toml")).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[cfg(unix)]
    #[test]
    fn test_open_reports_begin_failure() {
        let settings = UartSettings::new("/dev/serial-wiring-does-not-exist");
        let err = settings.open().unwrap_err();
        assert_eq!(err.operation, "begin");
        assert_eq!(err.category(), ErrorCategory::Acquisition);
    }
}
