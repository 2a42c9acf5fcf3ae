use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::ConfigError;
use crate::models::{ControllerSettings, LayoutSettings, RenderSettings};

pub const CONFIG_ENV: &str = "MURMUR_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub bus: BusConfig,
    pub controller: ControllerConfig,
    pub layout: LayoutConfig,
    pub render: RenderConfig,
    pub store: StoreConfig,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BusConfig {
    pub queue_size: usize,
    pub busy_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_size: 50,
            busy_timeout_ms: 1000,
        }
    }
}

impl BusConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    pub local_address: String,
    pub node_definitions: Vec<crate::models::NodeDefinition>,
    pub retry_backoff_ms: u64,
    pub port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            local_address: defaults::DEFAULT_LOCAL_ADDRESS.to_string(),
            node_definitions: defaults::default_node_definitions(),
            retry_backoff_ms: 1000,
            port: artnet::ARTNET_PORT,
        }
    }
}

impl ControllerConfig {
    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            local_address: self.local_address.clone(),
            node_definitions: self.node_definitions.clone(),
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub segment_definition: crate::models::LedSegment,
    pub segment_count: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            segment_definition: defaults::default_segment_definition(),
            segment_count: defaults::DEFAULT_SEGMENT_COUNT,
        }
    }
}

impl LayoutConfig {
    pub fn settings(&self) -> LayoutSettings {
        LayoutSettings {
            segment_definition: self.segment_definition.clone(),
            segment_count: self.segment_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderConfig {
    pub pattern: String,
    pub frequency_ms: u64,
    pub pixel_size: u32,
    /// Pause after a generator crash before it tries again.
    pub retry_delay_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pattern: "rainbow".to_string(),
            frequency_ms: 33,
            pixel_size: 7,
            retry_delay_ms: crate::graphics::RETRY_DELAY.as_millis() as u64,
        }
    }
}

impl RenderConfig {
    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            pattern: self.pattern.clone(),
            frequency_ms: self.frequency_ms,
            pixel_size: self.pixel_size,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// SQLite file for persisted overrides; in-memory when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// First CLI argument, then `MURMUR_CONFIG`, then compiled defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::args_os()
            .nth(1)
            .map(PathBuf::from)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }
}
