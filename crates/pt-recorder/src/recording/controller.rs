//! Per-recording controller loop

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::types::{Record, RecordState};

/// Autonomous loop driving one recording through its lifecycle.
///
/// The controller evaluates its recording against the wall clock on its
/// own interval timer and owns the only mutable copy of the recording's
/// state. Cancellation is cooperative: [`cancel`](Self::cancel) only
/// signals, and the loop stops the capture itself before exiting.
pub struct RecordController {
    record: Arc<dyn Record>,
    state: Arc<RwLock<RecordState>>,
    cancel: CancellationToken,
}

impl RecordController {
    pub fn new(record: Arc<dyn Record>) -> Self {
        Self {
            record,
            state: Arc::new(RwLock::new(RecordState::Waiting)),
            cancel: CancellationToken::new(),
        }
    }

    /// Launch the control loop; returns without blocking.
    pub fn start(&self) {
        let record = Arc::clone(&self.record);
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        tokio::spawn(Self::run(record, state, cancel));
    }

    /// Request cooperative termination. Never blocks; a duplicate cancel
    /// before the loop observes the first is dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn state(&self) -> RecordState {
        *self.state.read().await
    }

    pub fn record(&self) -> &Arc<dyn Record> {
        &self.record
    }

    async fn run(
        record: Arc<dyn Record>,
        state: Arc<RwLock<RecordState>>,
        cancel: CancellationToken,
    ) {
        // Evaluate once at startup so a window that is already open
        // starts without waiting a full check interval.
        Self::evaluate(&record, &state).await;

        let mut ticker = interval(record.check_interval());
        // interval() completes its first tick immediately; the startup
        // evaluation above already covered it.
        ticker.tick().await;

        while state.read().await.is_active() {
            // A tick and a cancellation are alternative wake-ups; when
            // both are ready, either branch may win.
            tokio::select! {
                _ = ticker.tick() => {
                    Self::evaluate(&record, &state).await;
                }
                _ = cancel.cancelled() => {
                    if let Err(e) = record.stop().await {
                        warn!("{}: stop on cancellation failed: {}", record.key(), e);
                    }
                    *state.write().await = RecordState::Canceled;
                    info!("{}: recording canceled", record.key());
                }
            }
        }
    }

    async fn evaluate(record: &Arc<dyn Record>, state: &Arc<RwLock<RecordState>>) {
        let now = Utc::now();
        let current = *state.read().await;
        match current {
            RecordState::Waiting => {
                if now >= record.start_at() && now < record.end_at() {
                    match record.start().await {
                        Ok(()) => {
                            *state.write().await = RecordState::Recording;
                            info!("{}: recording started", record.key());
                        }
                        Err(e) => {
                            // retried on the next tick
                            error!("{}: could not start recording: {}", record.key(), e);
                        }
                    }
                } else if now >= record.end_at() {
                    // window elapsed before the capture ever started
                    warn!("{}: window already over, canceled", record.key());
                    *state.write().await = RecordState::Canceled;
                }
            }
            RecordState::Recording => {
                if now >= record.start_at() && now < record.end_at() {
                    if !record.is_running().await {
                        match record.start().await {
                            Ok(()) => info!("{}: recording restarted", record.key()),
                            Err(e) => {
                                error!("{}: could not restart recording: {}", record.key(), e);
                            }
                        }
                    }
                } else if now >= record.end_at() {
                    if record.is_running().await {
                        if let Err(e) = record.stop().await {
                            warn!("{}: stop at window end failed: {}", record.key(), e);
                        }
                        *state.write().await = RecordState::Succeeded;
                        info!("{}: recording stopped", record.key());
                    } else {
                        warn!(
                            "{}: recording is not running, marked as failure",
                            record.key()
                        );
                        *state.write().await = RecordState::Failed;
                    }
                }
            }
            // terminal states are final
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::test_support::{MockRecord, wait_for};
    use chrono::Duration;

    #[tokio::test]
    async fn test_elapsed_window_is_canceled_without_starting() {
        let now = Utc::now();
        let record = MockRecord::new("r1", now - Duration::minutes(60), now - Duration::minutes(30));
        let ctrl = RecordController::new(record.clone());
        ctrl.start();

        wait_for(
            || async { ctrl.state().await == RecordState::Canceled },
            "elapsed window to cancel",
        )
        .await;
        assert_eq!(record.start_calls(), 0);
        assert_eq!(record.stop_calls(), 0);
    }

    #[tokio::test]
    async fn test_open_window_starts_recording() {
        let now = Utc::now();
        let record = MockRecord::new("r1", now - Duration::seconds(1), now + Duration::minutes(30));
        let ctrl = RecordController::new(record.clone());
        ctrl.start();

        wait_for(
            || async { ctrl.state().await == RecordState::Recording },
            "recording to start",
        )
        .await;
        assert_eq!(record.start_calls(), 1);
        ctrl.cancel();
    }

    #[tokio::test]
    async fn test_dead_capture_is_restarted_inside_window() {
        let now = Utc::now();
        let record = MockRecord::new("r1", now - Duration::seconds(1), now + Duration::minutes(30));
        let ctrl = RecordController::new(record.clone());
        ctrl.start();

        wait_for(
            || async { ctrl.state().await == RecordState::Recording },
            "recording to start",
        )
        .await;

        record.set_running(false);
        wait_for(
            || async { record.start_calls() >= 2 },
            "capture to be restarted",
        )
        .await;
        assert_eq!(ctrl.state().await, RecordState::Recording);
        ctrl.cancel();
    }

    #[tokio::test]
    async fn test_running_capture_succeeds_at_window_end() {
        let now = Utc::now();
        let record = MockRecord::new("r1", now - Duration::seconds(1), now + Duration::milliseconds(200));
        let ctrl = RecordController::new(record.clone());
        ctrl.start();

        wait_for(
            || async { ctrl.state().await == RecordState::Succeeded },
            "recording to succeed",
        )
        .await;
        assert_eq!(record.start_calls(), 1);
        assert_eq!(record.stop_calls(), 1);
        assert!(!record.is_running().await);
    }

    #[tokio::test]
    async fn test_dead_capture_fails_at_window_end() {
        let now = Utc::now();
        let record = MockRecord::new("r1", now - Duration::seconds(1), now + Duration::milliseconds(150));
        let ctrl = RecordController::new(record.clone());
        ctrl.start();

        wait_for(
            || async { ctrl.state().await == RecordState::Recording },
            "recording to start",
        )
        .await;

        // The capture dies and every restart attempt fails until the
        // window closes.
        record.set_fail_start(true);
        record.set_running(false);

        wait_for(
            || async { ctrl.state().await == RecordState::Failed },
            "recording to fail",
        )
        .await;
        assert_eq!(record.stop_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_from_waiting_stops_once() {
        let now = Utc::now();
        let record = MockRecord::new("r1", now + Duration::minutes(30), now + Duration::minutes(60));
        let ctrl = RecordController::new(record.clone());
        ctrl.start();

        assert_eq!(ctrl.state().await, RecordState::Waiting);
        ctrl.cancel();

        wait_for(
            || async { ctrl.state().await == RecordState::Canceled },
            "waiting recording to cancel",
        )
        .await;
        // a never-started recording still receives exactly one stop call
        assert_eq!(record.start_calls(), 0);
        assert_eq!(record.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_recording_stops_once() {
        let now = Utc::now();
        let record = MockRecord::new("r1", now - Duration::seconds(1), now + Duration::minutes(30));
        let ctrl = RecordController::new(record.clone());
        ctrl.start();

        wait_for(
            || async { ctrl.state().await == RecordState::Recording },
            "recording to start",
        )
        .await;

        ctrl.cancel();
        wait_for(
            || async { ctrl.state().await == RecordState::Canceled },
            "recording to cancel",
        )
        .await;
        assert_eq!(record.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_cancel_is_dropped() {
        let now = Utc::now();
        let record = MockRecord::new("r1", now + Duration::minutes(30), now + Duration::minutes(60));
        let ctrl = RecordController::new(record.clone());
        ctrl.start();

        ctrl.cancel();
        ctrl.cancel();

        wait_for(
            || async { ctrl.state().await == RecordState::Canceled },
            "recording to cancel",
        )
        .await;
        // give a would-be second cancellation a chance to surface
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(record.stop_calls(), 1);
    }
}
