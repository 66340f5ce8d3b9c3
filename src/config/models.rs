use std::time;

use serde::{Deserialize, Serialize};

use super::constants::{
    BRANCH_NAME_PREFIX, DEFAULT_ENDPOINT, LOG_FILE_PATH, REFRESH_GUARD_MS, TEMP_ID_PREFIX,
};
use super::defaults::*;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Configuration {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct GeneralConfig {
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub default_config_id: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogConfig {
    #[serde(default = "log_level")]
    pub level: Option<String>,

    #[serde(default)]
    pub filters: Option<Vec<LogFilter>>,

    #[serde(default)]
    pub file: Option<LogFile>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFilter {
    #[serde(default)]
    pub module: Option<String>,

    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFile {
    #[serde(default = "log_file_path")]
    pub path: String,

    #[serde(default)]
    pub append: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u16>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StreamConfig {
    #[serde(default = "temp_id_prefix")]
    pub temp_id_prefix: String,

    #[serde(default = "branch_name_prefix")]
    pub branch_name_prefix: String,

    #[serde(default = "refresh_guard_ms")]
    pub refresh_guard_ms: u64,
}

fn log_file_path() -> String {
    LOG_FILE_PATH.to_string()
}

impl ServerConfig {
    pub fn timeout(&self) -> Option<time::Duration> {
        self.timeout_secs
            .map(|secs| time::Duration::from_secs(secs as u64))
    }
}

impl StreamConfig {
    pub fn refresh_guard(&self) -> time::Duration {
        time::Duration::from_millis(self.refresh_guard_ms)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Some("info".to_string()),
            filters: None,
            file: None,
        }
    }
}

impl Default for LogFile {
    fn default() -> Self {
        Self {
            path: LOG_FILE_PATH.to_string(),
            append: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_token: None,
            timeout_secs: None,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            temp_id_prefix: TEMP_ID_PREFIX.to_string(),
            branch_name_prefix: BRANCH_NAME_PREFIX.to_string(),
            refresh_guard_ms: REFRESH_GUARD_MS,
        }
    }
}
