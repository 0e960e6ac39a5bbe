//! Snapshot feed for the recorder
//!
//! Periodically fetches the full reservation list from the backend and
//! pushes it into the recorder's channel as one snapshot. The feed never
//! diffs: reconciliation against the previous state is the recorder's
//! job.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::errors::AppResult;
use crate::models::TvRecord;
use crate::recording::{Record, RecordSnapshot};
use crate::services::backend::BackendClient;
use crate::services::capture::CaptureRecord;

pub struct RecordPoller {
    client: BackendClient,
    capture: CaptureConfig,
    check_interval: Duration,
    sender: mpsc::Sender<RecordSnapshot>,
    poll_interval: Duration,
}

impl RecordPoller {
    pub fn new(
        client: BackendClient,
        capture: CaptureConfig,
        sender: mpsc::Sender<RecordSnapshot>,
        poll_interval: Duration,
    ) -> AppResult<Self> {
        let check_interval = capture.check_interval()?;
        Ok(Self {
            client,
            capture,
            check_interval,
            sender,
            poll_interval,
        })
    }

    /// Run the poll loop until cancellation. The first poll happens
    /// immediately so recordings survive a process restart without
    /// waiting a full interval.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting record poller (interval: {})",
            humantime::format_duration(self.poll_interval)
        );
        let mut ticker = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.client.fetch_records().await {
                        Ok(records) => {
                            let snapshot = self.build_snapshot(records);
                            debug!("Fetched {} reservation(s)", snapshot.len());
                            if self.sender.send(snapshot).await.is_err() {
                                warn!("Recorder is gone, stopping poller");
                                break;
                            }
                        }
                        // the previous snapshot stays in force
                        Err(e) => warn!("Could not fetch reservations: {}", e),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Record poller received cancellation signal");
                    break;
                }
            }
        }

        info!("Record poller stopped");
    }

    /// Wrap fetched reservations in the capture capability, skipping
    /// entries that fail validation.
    fn build_snapshot(&self, records: Vec<TvRecord>) -> RecordSnapshot {
        records
            .into_iter()
            .filter_map(|record| match record.validate() {
                Ok(()) => Some(
                    CaptureRecord::new(record, &self.capture, self.check_interval)
                        as Arc<dyn Record>,
                ),
                Err(e) => {
                    warn!("{}: invalid reservation, skipped: {}", record.id, e);
                    None
                }
            })
            .collect()
    }
}
