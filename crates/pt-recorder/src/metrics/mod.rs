//! Counter posting to an InfluxDB-style metrics backend

use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::MetricsConfig;
use crate::errors::{AppError, AppResult, BackendError};
use crate::recording::RecorderStatsHandle;

/// One named series in the write payload; every point carries a `source`
/// column identifying the posting host.
#[derive(Debug, Serialize, PartialEq)]
pub struct Series {
    pub name: String,
    pub columns: Vec<String>,
    pub points: Vec<Vec<Value>>,
}

/// Client posting counter series to the metrics database.
pub struct CounterClient {
    client: Client,
    write_url: Url,
    source: String,
}

impl CounterClient {
    pub fn new(config: &MetricsConfig) -> AppResult<Self> {
        let scheme = if config.is_secure { "https" } else { "http" };
        let mut write_url = Url::parse(&format!(
            "{scheme}://{}:{}/db/{}/series",
            config.host, config.port, config.database
        ))
        .map_err(|e| AppError::Configuration {
            message: format!("invalid metrics endpoint: {e}"),
        })?;
        write_url
            .query_pairs_mut()
            .append_pair("u", &config.username)
            .append_pair("p", &config.password);

        let source = config
            .source
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string());

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(BackendError::Http)?;

        Ok(Self {
            client,
            write_url,
            source,
        })
    }

    /// Post a single-value series.
    pub async fn post(&self, name: &str, value: Value) -> AppResult<()> {
        self.write(&[self.series(name, value)]).await
    }

    /// Post one series with one column per table entry.
    pub async fn post_many(&self, name: &str, table: &[(&str, Value)]) -> AppResult<()> {
        self.write(&[self.series_many(name, table)]).await
    }

    fn series(&self, name: &str, value: Value) -> Series {
        Series {
            name: name.to_string(),
            columns: vec!["source".to_string(), "value".to_string()],
            points: vec![vec![Value::String(self.source.clone()), value]],
        }
    }

    fn series_many(&self, name: &str, table: &[(&str, Value)]) -> Series {
        let mut columns = vec!["source".to_string()];
        let mut point = vec![Value::String(self.source.clone())];
        for (column, value) in table {
            columns.push((*column).to_string());
            point.push(value.clone());
        }
        Series {
            name: name.to_string(),
            columns,
            points: vec![point],
        }
    }

    async fn write(&self, series: &[Series]) -> AppResult<()> {
        // the URL query carries credentials; log the path only
        debug!(
            "[metrics] POST {} series to {}",
            series.len(),
            self.write_url.path()
        );
        let response = self
            .client
            .post(self.write_url.clone())
            .json(series)
            .send()
            .await
            .map_err(BackendError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::UnexpectedStatus {
                expected: 200,
                actual: status.as_u16(),
                url: self.write_url.path().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Periodic reporter over the recorder's aggregate stats.
pub struct StatsReporter {
    counter: CounterClient,
    stats: RecorderStatsHandle,
    report_interval: Duration,
}

impl StatsReporter {
    pub fn new(
        counter: CounterClient,
        stats: RecorderStatsHandle,
        report_interval: Duration,
    ) -> Self {
        Self {
            counter,
            stats,
            report_interval,
        }
    }

    /// Run the report loop until cancellation. Post failures are logged
    /// and skipped; the next interval retries.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting stats reporter (interval: {})",
            humantime::format_duration(self.report_interval)
        );
        let mut ticker = interval(self.report_interval);
        // nothing worth posting before the first sweep has run
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.report().await,
                _ = cancel.cancelled() => {
                    info!("Stats reporter received cancellation signal");
                    break;
                }
            }
        }

        info!("Stats reporter stopped");
    }

    async fn report(&self) {
        let stats = self.stats.snapshot().await;
        let table = [
            ("waiting", json!(stats.waiting)),
            ("recording", json!(stats.recording)),
            ("succeeded", json!(stats.succeeded)),
            ("canceled", json!(stats.canceled)),
            ("failed", json!(stats.failed)),
        ];
        if let Err(e) = self.counter.post_many("recorder.stats", &table).await {
            warn!("Could not post recorder stats: {}", e);
        }

        if let Some(upcoming) = stats.upcoming {
            if let Err(e) = self
                .counter
                .post("recorder.upcoming", json!(upcoming.timestamp()))
                .await
            {
                warn!("Could not post upcoming start: {}", e);
            }
        }
    }
}
