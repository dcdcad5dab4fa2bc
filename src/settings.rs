use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub export: ExportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    #[serde(default = "default_page_size", rename = "page-size")]
    pub page_size: u32,
    #[serde(default = "default_page_delay_ms", rename = "page-delay-ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_thread_delay_ms", rename = "thread-delay-ms")]
    pub thread_delay_ms: u64,
    #[serde(default = "default_retry_padding_ms", rename = "retry-padding-ms")]
    pub retry_padding_ms: u64,
    #[serde(default = "default_list_delay_ms", rename = "list-delay-ms")]
    pub list_delay_ms: u64,
    #[serde(default = "default_output_dir", rename = "output-dir")]
    pub output_dir: String,
}

fn default_page_size() -> u32 {
    200
}

fn default_page_delay_ms() -> u64 {
    1300
}

fn default_thread_delay_ms() -> u64 {
    500
}

fn default_retry_padding_ms() -> u64 {
    1000
}

fn default_list_delay_ms() -> u64 {
    3050
}

fn default_output_dir() -> String {
    ".".to_string()
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
            thread_delay_ms: default_thread_delay_ms(),
            retry_padding_ms: default_retry_padding_ms(),
            list_delay_ms: default_list_delay_ms(),
            output_dir: default_output_dir(),
        }
    }
}

/// Request pacing for the history walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub page_size: u32,
    /// Pause after every successfully fetched page.
    pub page_delay: Duration,
    /// Pause before each thread-replies walk.
    pub thread_delay: Duration,
    /// Added on top of the server's Retry-After.
    pub retry_padding: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        ExportSettings::default().pacing()
    }
}

impl ExportSettings {
    pub fn pacing(&self) -> Pacing {
        Pacing {
            page_size: self.page_size,
            page_delay: Duration::from_millis(self.page_delay_ms),
            thread_delay: Duration::from_millis(self.thread_delay_ms),
            retry_padding: Duration::from_millis(self.retry_padding_ms),
        }
    }

    pub fn list_delay(&self) -> Duration {
        Duration::from_millis(self.list_delay_ms)
    }
}

impl Settings {
    /// Load settings from `path`; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| AppError::TomlParse(e.to_string()))
    }
}
