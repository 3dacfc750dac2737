// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlipwayError};

/// Which output device the daemon drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterKind {
    /// Log printed output instead of driving hardware.
    Console,
    /// ESC/POS thermal printer on a serial line.
    Serial,
}

/// Output device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub kind: PrinterKind,
    /// Serial device path (only used for `Serial`).
    pub device: String,
    pub baud_rate: u32,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            kind: PrinterKind::Console,
            device: "/dev/ttyAMA0".into(),
            baud_rate: 19200,
        }
    }
}

/// Socket RPC listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".into(),
            port: 9999,
        }
    }
}

/// Queue RPC (AMQP) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpConfig {
    pub enabled: bool,
    pub uri: String,
    /// Routing key (queue name on the default exchange) that receives requests.
    pub routing_key: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            uri: "amqp://localhost:5672/%2f".into(),
            routing_key: "slipway_jobs".into(),
        }
    }
}

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub printer: PrinterConfig,
    pub socket: SocketConfig,
    pub amqp: AmqpConfig,
    /// How long finished jobs stay queryable, in seconds.
    pub retention_secs: u64,
    /// Interval between reaper sweeps, in seconds.
    pub reap_interval_secs: u64,
    /// Column width used when a text job asks for wrapping.
    pub wrap_width: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            printer: PrinterConfig::default(),
            socket: SocketConfig::default(),
            amqp: AmqpConfig::default(),
            retention_secs: 30 * 60,
            reap_interval_secs: 60,
            wrap_width: 32,
        }
    }
}

impl AppConfig {
    /// Load settings from a JSON file.
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error so that typos are not silently ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the settings as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.wrap_width == 0 {
            return Err(SlipwayError::Config("wrap_width must be at least 1".into()));
        }
        if self.reap_interval_secs == 0 {
            return Err(SlipwayError::Config(
                "reap_interval_secs must be at least 1".into(),
            ));
        }
        if self.amqp.enabled && self.amqp.routing_key.is_empty() {
            return Err(SlipwayError::Config("amqp.routing_key is empty".into()));
        }
        Ok(())
    }
}
