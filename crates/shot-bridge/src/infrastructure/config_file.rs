//! Optional TOML tuning file.
//!
//! Host and port come from the command line.  Everything else (timeouts,
//! limits, the device identifier) can be tuned by pointing the
//! `SHOT_BRIDGE_CONFIG` environment variable at a TOML file:
//!
//! ```toml
//! device_id = "Range Bay 3"
//! heartbeat_interval_ms = 5000
//! send_timeout_ms = 1500
//! max_subscribers = 32
//! ```
//!
//! Every key is optional; missing keys keep the [`BridgeConfig`] default.
//! Unknown keys are rejected so a typo does not silently do nothing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::domain::config::BridgeConfig;

/// Environment variable naming the tuning file.
pub const CONFIG_ENV_VAR: &str = "SHOT_BRIDGE_CONFIG";

/// Error type for tuning file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Keys accepted in the tuning file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TuningFile {
    pub device_id: Option<String>,
    pub heartbeat_interval_ms: Option<u64>,
    pub reconnect_interval_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub send_timeout_ms: Option<u64>,
    pub max_subscribers: Option<usize>,
    pub max_message_size: Option<usize>,
    pub dispatch_capacity: Option<usize>,
    pub shutdown_grace_ms: Option<u64>,
}

impl TuningFile {
    /// Parses tuning keys from TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Overlays every present key onto `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero durations or zero limits;
    /// `config` is left unchanged in that case.
    pub fn apply(&self, config: &mut BridgeConfig) -> Result<(), ConfigError> {
        let mut next = config.clone();

        if let Some(id) = &self.device_id {
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "device_id",
                    reason: "must not be empty".to_string(),
                });
            }
            next.device_id = id.clone();
        }

        set_duration(
            &mut next.heartbeat_interval,
            self.heartbeat_interval_ms,
            "heartbeat_interval_ms",
        )?;
        set_duration(
            &mut next.reconnect_interval,
            self.reconnect_interval_ms,
            "reconnect_interval_ms",
        )?;
        set_duration(&mut next.connect_timeout, self.connect_timeout_ms, "connect_timeout_ms")?;
        set_duration(&mut next.send_timeout, self.send_timeout_ms, "send_timeout_ms")?;
        set_duration(&mut next.shutdown_grace, self.shutdown_grace_ms, "shutdown_grace_ms")?;
        set_limit(&mut next.max_subscribers, self.max_subscribers, "max_subscribers")?;
        set_limit(&mut next.max_message_size, self.max_message_size, "max_message_size")?;
        set_limit(&mut next.dispatch_capacity, self.dispatch_capacity, "dispatch_capacity")?;

        *config = next;
        Ok(())
    }
}

fn set_duration(
    slot: &mut Duration,
    millis: Option<u64>,
    key: &'static str,
) -> Result<(), ConfigError> {
    match millis {
        Some(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Some(ms) => {
            *slot = Duration::from_millis(ms);
            Ok(())
        }
        None => Ok(()),
    }
}

fn set_limit(slot: &mut usize, value: Option<usize>, key: &'static str) -> Result<(), ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Some(v) => {
            *slot = v;
            Ok(())
        }
        None => Ok(()),
    }
}

/// Applies the tuning file named by [`CONFIG_ENV_VAR`], if set.
///
/// Returns the path that was loaded, or `None` when the variable is unset.
pub fn apply_from_env(config: &mut BridgeConfig) -> Result<Option<PathBuf>, ConfigError> {
    let Some(path) = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from) else {
        return Ok(None);
    };
    TuningFile::load(&path)?.apply(config)?;
    info!("loaded tuning file {}", path.display());
    Ok(Some(path))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
