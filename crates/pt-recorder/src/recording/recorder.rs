//! Snapshot reconciliation over the live controller set

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::controller::RecordController;
use super::types::{Record, RecordState, RecorderStats, RecorderStatsHandle};

/// A full point-in-time list of desired recordings, never a diff.
pub type RecordSnapshot = Vec<Arc<dyn Record>>;

/// Reconciles desired-state snapshots against live controllers.
///
/// The controller map is touched only by [`run`](Self::run); external
/// readers observe the recorder exclusively through the stats handle.
/// Because the feed only ever delivers full snapshots, reconciliation is
/// level-triggered: a duplicated snapshot is a no-op and a missed one
/// self-heals on the next delivery.
pub struct Recorder {
    receiver: mpsc::Receiver<RecordSnapshot>,
    controls: HashMap<String, RecordController>,
    succeeded: usize,
    canceled: usize,
    failed: usize,
    stats: RecorderStatsHandle,
}

impl Recorder {
    /// Create a recorder reading snapshots from `receiver`.
    pub fn new(receiver: mpsc::Receiver<RecordSnapshot>) -> Self {
        Self {
            receiver,
            controls: HashMap::new(),
            succeeded: 0,
            canceled: 0,
            failed: 0,
            stats: RecorderStatsHandle::default(),
        }
    }

    /// Shared stats handle for external reporters.
    pub fn stats(&self) -> RecorderStatsHandle {
        self.stats.clone()
    }

    /// Run the reconciliation loop until cancellation or until the
    /// snapshot feed closes. A sweep follows every wake-up.
    pub async fn run(mut self, sweep_interval: Duration, cancel: CancellationToken) {
        info!(
            "Starting recorder loop (sweep interval: {})",
            humantime::format_duration(sweep_interval)
        );
        let mut sweep = interval(sweep_interval);
        sweep.tick().await;

        loop {
            tokio::select! {
                maybe = self.receiver.recv() => match maybe {
                    Some(snapshot) => self.merge(snapshot),
                    None => {
                        debug!("Snapshot feed closed, stopping recorder");
                        break;
                    }
                },
                _ = sweep.tick() => {}
                _ = cancel.cancelled() => {
                    info!("Recorder received cancellation signal");
                    break;
                }
            }
            self.sweep().await;
        }

        info!("Recorder loop stopped");
    }

    /// Diff one desired-state snapshot against the live controllers.
    ///
    /// Identity is key-only: a live controller whose key is still desired
    /// is left untouched even if other fields of the snapshot entry
    /// differ. Controllers for disappeared keys are only signaled here;
    /// the next sweep removes them once they reach Canceled.
    fn merge(&mut self, snapshot: RecordSnapshot) {
        let now = Utc::now();
        let mut incoming: HashMap<String, Arc<dyn Record>> = HashMap::new();
        for record in snapshot {
            if record.end_at() > now {
                incoming.insert(record.key(), record);
            } else {
                debug!("{}: window already over, dropped from snapshot", record.key());
            }
        }

        if !self.controls.is_empty() {
            trace!("Checking {} record(s) under control", self.controls.len());
            for (key, ctrl) in &self.controls {
                if incoming.remove(key).is_some() {
                    debug!("{}: already under control, skipping", key);
                } else {
                    debug!("{}: no longer desired, canceling", key);
                    ctrl.cancel();
                }
            }
        }

        if !incoming.is_empty() {
            info!("{} new record(s) get under control", incoming.len());
            for (key, record) in incoming {
                let ctrl = RecordController::new(record);
                ctrl.start();
                self.controls.insert(key, ctrl);
            }
        }
    }

    /// Reap terminal controllers, bump the cumulative counters and
    /// publish fresh gauges.
    async fn sweep(&mut self) {
        let mut waiting = 0;
        let mut recording = 0;
        let mut upcoming: Option<DateTime<Utc>> = None;
        let mut removals = Vec::new();

        for (key, ctrl) in &self.controls {
            let state = ctrl.state().await;
            match state {
                RecordState::Waiting => waiting += 1,
                RecordState::Recording => recording += 1,
                RecordState::Succeeded => {
                    self.succeeded += 1;
                    removals.push(key.clone());
                }
                RecordState::Canceled => {
                    self.canceled += 1;
                    removals.push(key.clone());
                }
                RecordState::Failed => {
                    self.failed += 1;
                    removals.push(key.clone());
                }
            }
            if state.is_active() {
                let start_at = ctrl.record().start_at();
                if upcoming.is_none_or(|earliest| start_at < earliest) {
                    upcoming = Some(start_at);
                }
            }
        }

        for key in &removals {
            self.controls.remove(key);
            debug!("{}: reached a terminal state, removed from control", key);
        }

        self.stats
            .publish(RecorderStats {
                waiting,
                recording,
                succeeded: self.succeeded,
                canceled: self.canceled,
                failed: self.failed,
                upcoming,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::test_support::{MockRecord, wait_for};
    use chrono::Duration as ChronoDuration;

    const SWEEP: Duration = Duration::from_millis(30);

    fn spawn_recorder() -> (
        mpsc::Sender<RecordSnapshot>,
        RecorderStatsHandle,
        CancellationToken,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let recorder = Recorder::new(rx);
        let stats = recorder.stats();
        let cancel = CancellationToken::new();
        tokio::spawn(recorder.run(SWEEP, cancel.clone()));
        (tx, stats, cancel)
    }

    #[tokio::test]
    async fn test_open_window_runs_to_success_and_is_reaped() {
        let (tx, stats, cancel) = spawn_recorder();
        let now = Utc::now();
        let record = MockRecord::new(
            "r1",
            now - ChronoDuration::milliseconds(10),
            now + ChronoDuration::milliseconds(300),
        );

        tx.send(vec![record.clone()]).await.unwrap();

        wait_for(
            || async {
                let s = stats.snapshot().await;
                s.succeeded == 1 && s.recording == 0 && s.waiting == 0
            },
            "recording to succeed and be reaped",
        )
        .await;
        assert_eq!(record.start_calls(), 1);
        assert_eq!(record.stop_calls(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_future_window_waits_then_empty_snapshot_cancels() {
        let (tx, stats, cancel) = spawn_recorder();
        let now = Utc::now();
        let record = MockRecord::new(
            "r1",
            now + ChronoDuration::minutes(30),
            now + ChronoDuration::minutes(60),
        );

        tx.send(vec![record.clone()]).await.unwrap();
        wait_for(
            || async { stats.snapshot().await.waiting == 1 },
            "record to be under control",
        )
        .await;

        tx.send(vec![]).await.unwrap();
        wait_for(
            || async {
                let s = stats.snapshot().await;
                s.canceled == 1 && s.waiting == 0
            },
            "record to be canceled and removed",
        )
        .await;
        assert_eq!(record.start_calls(), 0);
        assert_eq!(record.stop_calls(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_empty_snapshot_cancels_mid_recording() {
        let (tx, stats, cancel) = spawn_recorder();
        let now = Utc::now();
        let record = MockRecord::new(
            "r1",
            now - ChronoDuration::seconds(1),
            now + ChronoDuration::minutes(30),
        );

        tx.send(vec![record.clone()]).await.unwrap();
        wait_for(
            || async { stats.snapshot().await.recording == 1 },
            "recording to start",
        )
        .await;

        tx.send(vec![]).await.unwrap();
        wait_for(
            || async {
                let s = stats.snapshot().await;
                s.canceled == 1 && s.recording == 0
            },
            "recording to be canceled",
        )
        .await;
        assert_eq!(record.stop_calls(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_identical_snapshot_is_a_no_op() {
        let (tx, stats, cancel) = spawn_recorder();
        let now = Utc::now();
        let record = MockRecord::new(
            "r1",
            now + ChronoDuration::minutes(30),
            now + ChronoDuration::minutes(60),
        );

        tx.send(vec![record.clone()]).await.unwrap();
        wait_for(
            || async { stats.snapshot().await.waiting == 1 },
            "record to be under control",
        )
        .await;

        tx.send(vec![record.clone()]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let s = stats.snapshot().await;
        assert_eq!(s.waiting, 1);
        assert_eq!(s.canceled, 0);
        assert_eq!(record.start_calls(), 0);
        assert_eq!(record.stop_calls(), 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_stale_snapshot_entries_are_dropped() {
        let (tx, stats, cancel) = spawn_recorder();
        let now = Utc::now();
        let record = MockRecord::new(
            "r1",
            now - ChronoDuration::minutes(60),
            now - ChronoDuration::minutes(30),
        );

        tx.send(vec![record.clone()]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let s = stats.snapshot().await;
        assert_eq!(s.waiting, 0);
        assert_eq!(s.canceled, 0);
        assert_eq!(record.start_calls(), 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_reappearing_key_becomes_a_new_controller() {
        let (tx, stats, cancel) = spawn_recorder();
        let now = Utc::now();
        let first = MockRecord::new(
            "r1",
            now + ChronoDuration::minutes(30),
            now + ChronoDuration::minutes(60),
        );

        tx.send(vec![first.clone()]).await.unwrap();
        wait_for(
            || async { stats.snapshot().await.waiting == 1 },
            "first instance under control",
        )
        .await;

        tx.send(vec![]).await.unwrap();
        wait_for(
            || async {
                let s = stats.snapshot().await;
                s.canceled == 1 && s.waiting == 0
            },
            "first instance canceled",
        )
        .await;
        assert_eq!(first.stop_calls(), 1);

        // same key, brand-new instance
        let second = MockRecord::new(
            "r1",
            now + ChronoDuration::minutes(30),
            now + ChronoDuration::minutes(60),
        );
        tx.send(vec![second.clone()]).await.unwrap();
        wait_for(
            || async { stats.snapshot().await.waiting == 1 },
            "second instance under control",
        )
        .await;
        assert_eq!(second.start_calls(), 0);
        assert_eq!(second.stop_calls(), 0);

        tx.send(vec![]).await.unwrap();
        wait_for(
            || async { stats.snapshot().await.canceled == 2 },
            "second instance canceled",
        )
        .await;
        // the first instance saw no extra calls
        assert_eq!(first.stop_calls(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_upcoming_tracks_earliest_active_start() {
        let (tx, stats, cancel) = spawn_recorder();
        let now = Utc::now();
        let early = MockRecord::new(
            "early",
            now + ChronoDuration::minutes(10),
            now + ChronoDuration::minutes(40),
        );
        let late = MockRecord::new(
            "late",
            now + ChronoDuration::minutes(20),
            now + ChronoDuration::minutes(50),
        );

        assert!(stats.upcoming().await.is_none());

        tx.send(vec![late.clone(), early.clone()]).await.unwrap();
        wait_for(
            || async { stats.snapshot().await.waiting == 2 },
            "both records under control",
        )
        .await;
        assert_eq!(stats.upcoming().await, Some(early.start_at));

        tx.send(vec![]).await.unwrap();
        wait_for(
            || async { stats.snapshot().await.canceled == 2 },
            "both records canceled",
        )
        .await;
        assert!(stats.upcoming().await.is_none());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_closing_the_feed_stops_the_loop() {
        let (tx, rx) = mpsc::channel::<RecordSnapshot>(16);
        let recorder = Recorder::new(rx);
        let handle = tokio::spawn(recorder.run(SWEEP, CancellationToken::new()));

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("recorder should stop when the feed closes")
            .unwrap();
    }
}
