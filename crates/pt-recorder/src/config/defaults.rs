//! Default configuration values

pub const DEFAULT_ENDPOINT: &str = "http://apps-dev.example.net/";
pub const DEFAULT_POLL_INTERVAL: &str = "1m";
pub const DEFAULT_CONNECT_TIMEOUT: &str = "10s";

pub const DEFAULT_SWEEP_INTERVAL: &str = "30s";

pub const DEFAULT_CAPTURE_COMMAND: &str = "recpt1";
pub const DEFAULT_CAPTURE_OUTPUT_DIR: &str = "./recordings";
pub const DEFAULT_CHECK_INTERVAL: &str = "10s";

pub const DEFAULT_METRICS_HOST: &str = "localhost";
pub const DEFAULT_METRICS_PORT: u16 = 8086;
pub const DEFAULT_METRICS_DATABASE: &str = "pt-recorder";
pub const DEFAULT_REPORT_INTERVAL: &str = "1m";
