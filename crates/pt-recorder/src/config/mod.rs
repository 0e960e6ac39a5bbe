use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::errors::{AppError, AppResult};

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    pub metrics: Option<MetricsConfig>,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API token sent with every request
    #[serde(default)]
    pub token: String,
    /// How often the reservation list is re-fetched
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Cadence of the terminal-state sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
}

/// Capture process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture command, full path or name resolved via $PATH
    #[serde(default = "default_capture_command")]
    pub command: String,
    /// Argument template; {sid}, {cid}, {input_idx} and {output} are substituted
    #[serde(default = "default_capture_args")]
    pub args: Vec<String>,
    #[serde(default = "default_capture_output_dir")]
    pub output_dir: PathBuf,
    /// Per-recording evaluation interval
    #[serde(default = "default_check_interval")]
    pub check_interval: String,
}

/// Metrics reporting configuration; omit the section to disable reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_metrics_database")]
    pub database: String,
    #[serde(default)]
    pub is_secure: bool,
    /// Value of the `source` column; defaults to $HOSTNAME
    pub source: Option<String>,
    #[serde(default = "default_report_interval")]
    pub report_interval: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_poll_interval() -> String {
    DEFAULT_POLL_INTERVAL.to_string()
}

fn default_connect_timeout() -> String {
    DEFAULT_CONNECT_TIMEOUT.to_string()
}

fn default_sweep_interval() -> String {
    DEFAULT_SWEEP_INTERVAL.to_string()
}

fn default_capture_command() -> String {
    DEFAULT_CAPTURE_COMMAND.to_string()
}

fn default_capture_args() -> Vec<String> {
    ["--b25", "--strip", "{sid}", "-", "{output}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_capture_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CAPTURE_OUTPUT_DIR)
}

fn default_check_interval() -> String {
    DEFAULT_CHECK_INTERVAL.to_string()
}

fn default_metrics_host() -> String {
    DEFAULT_METRICS_HOST.to_string()
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

fn default_metrics_database() -> String {
    DEFAULT_METRICS_DATABASE.to_string()
}

fn default_report_interval() -> String {
    DEFAULT_REPORT_INTERVAL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            recorder: RecorderConfig::default(),
            capture: CaptureConfig::default(),
            metrics: None,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: String::new(),
            poll_interval: default_poll_interval(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: default_capture_command(),
            args: default_capture_args(),
            output_dir: default_capture_output_dir(),
            check_interval: default_check_interval(),
        }
    }
}

impl BackendConfig {
    pub fn poll_interval(&self) -> AppResult<Duration> {
        parse_duration("backend.poll_interval", &self.poll_interval)
    }

    pub fn connect_timeout(&self) -> AppResult<Duration> {
        parse_duration("backend.connect_timeout", &self.connect_timeout)
    }
}

impl RecorderConfig {
    pub fn sweep_interval(&self) -> AppResult<Duration> {
        parse_duration("recorder.sweep_interval", &self.sweep_interval)
    }
}

impl CaptureConfig {
    pub fn check_interval(&self) -> AppResult<Duration> {
        parse_duration("capture.check_interval", &self.check_interval)
    }
}

impl MetricsConfig {
    pub fn report_interval(&self) -> AppResult<Duration> {
        parse_duration("metrics.report_interval", &self.report_interval)
    }
}

fn parse_duration(field: &str, value: &str) -> AppResult<Duration> {
    humantime::parse_duration(value).map_err(|e| AppError::Configuration {
        message: format!("invalid duration '{value}' for {field}: {e}"),
    })
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }
}
