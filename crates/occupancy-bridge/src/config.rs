// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML configuration for the bridge.
//!
//! Every field has a default, so an empty file is valid; the serial port
//! name (and, outside dry runs, the project id) must still come from either
//! the file or the command line before [`BridgeConfig::validate`] passes.

use crate::connection::{DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL, DEFAULT_RECONNECT_DELAY};
use crate::sink::{
    DocumentPaths, FirestoreConfig, DEFAULT_APP_ID, DEFAULT_DATABASE, DEFAULT_FIRESTORE_URL,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the OAuth access token by default.
pub const DEFAULT_TOKEN_ENV: &str = "FIRESTORE_ACCESS_TOKEN";

/// Environment variable the Firebase tooling uses to point at the emulator.
pub const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial device settings.
    pub serial: SerialConfig,
    /// Document store settings.
    pub firestore: StoreConfig,
}

/// Serial device settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g. `/dev/rfcomm0`, `COM8`).
    pub port: Option<String>,
    /// Baud rate.
    pub baud_rate: u32,
    /// Fixed delay between a failure and the next connection attempt.
    pub reconnect_delay_secs: u64,
    /// Read poll interval; bounds shutdown latency during a blocked read.
    pub poll_interval_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY.as_secs(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// Firestore settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Google Cloud project id.
    pub project_id: Option<String>,
    /// Firestore database id.
    pub database: String,
    /// Application id used to build document paths.
    pub app_id: String,
    /// REST base URL.
    pub base_url: String,
    /// Emulator `host:port`. Overrides `base_url` and disables the token.
    pub emulator_host: Option<String>,
    /// Name of the environment variable holding the access token.
    pub token_env: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            database: DEFAULT_DATABASE.to_string(),
            app_id: DEFAULT_APP_ID.to_string(),
            base_url: DEFAULT_FIRESTORE_URL.to_string(),
            emulator_host: None,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl BridgeConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: BridgeConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check the settings needed to start the serial side.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.serial.port.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(ConfigError::Invalid("no serial port configured".into()))
            }
            Some(_) => {}
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }
        if self.serial.reconnect_delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_delay_secs must be positive".into(),
            ));
        }
        if self.serial.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".into(),
            ));
        }
        if self.firestore.app_id.trim().is_empty() {
            return Err(ConfigError::Invalid("app_id must not be empty".into()));
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.serial.reconnect_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.serial.poll_interval_ms)
    }

    pub fn paths(&self) -> DocumentPaths {
        DocumentPaths::for_app(&self.firestore.app_id)
    }

    /// Whether requests go to a local emulator.
    pub fn uses_emulator(&self) -> bool {
        self.firestore.emulator_host.is_some()
    }

    /// Build the Firestore connection settings.
    ///
    /// `access_token` is required unless an emulator is configured.
    pub fn store_config(
        &self,
        access_token: Option<String>,
    ) -> Result<FirestoreConfig, ConfigError> {
        let project_id = self
            .firestore
            .project_id
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::Invalid("no Firestore project id configured".into()))?;

        let mut config = match &self.firestore.emulator_host {
            Some(host) => FirestoreConfig::emulator(host, project_id),
            None => {
                let token = access_token.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "missing Firestore credentials: set {} to an OAuth access token",
                        self.firestore.token_env
                    ))
                })?;
                let mut config = FirestoreConfig::new(project_id, Some(token));
                config.base_url = self.firestore.base_url.clone();
                config
            }
        };
        config.database = self.firestore.database.clone();
        config.timeout = Duration::from_secs(self.firestore.timeout_secs);
        Ok(config)
    }
}
