//! Recording scheduler type definitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::errors::AppResult;

/// A schedulable recording capability.
///
/// Anything exposing a key, a scheduled window and start/stop/is-running
/// operations can be driven by a [`RecordController`]; the process-backed
/// implementation lives in `services::capture`.
///
/// [`RecordController`]: super::RecordController
#[async_trait]
pub trait Record: Send + Sync {
    /// Unique identity; two reservations with the same key are the same
    /// recording as far as reconciliation is concerned.
    fn key(&self) -> String;

    fn start_at(&self) -> DateTime<Utc>;

    fn end_at(&self) -> DateTime<Utc>;

    /// How often the controller re-evaluates this recording.
    fn check_interval(&self) -> Duration;

    async fn start(&self) -> AppResult<()>;

    async fn stop(&self) -> AppResult<()>;

    async fn is_running(&self) -> bool;
}

/// Lifecycle state of one controlled recording.
///
/// `Waiting` and `Recording` are active; the other three are terminal and
/// final. A controller never leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RecordState {
    Waiting,
    Recording,
    Canceled,
    Succeeded,
    Failed,
}

impl RecordState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RecordState::Canceled | RecordState::Succeeded | RecordState::Failed
        )
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

/// Aggregate view over all controlled recordings.
///
/// `waiting` and `recording` are gauges recomputed on every sweep;
/// `succeeded`, `canceled` and `failed` are cumulative totals.
#[derive(Debug, Clone, Default)]
pub struct RecorderStats {
    pub waiting: usize,
    pub recording: usize,
    pub succeeded: usize,
    pub canceled: usize,
    pub failed: usize,
    /// Earliest start among active recordings, None when idle
    pub upcoming: Option<DateTime<Utc>>,
}

/// Cloneable read handle over the recorder's aggregate stats.
///
/// Readers get the snapshot published by the most recent sweep; the value
/// may trail the live controllers by up to one sweep interval.
#[derive(Clone, Default)]
pub struct RecorderStatsHandle {
    inner: Arc<RwLock<RecorderStats>>,
}

impl RecorderStatsHandle {
    pub async fn snapshot(&self) -> RecorderStats {
        self.inner.read().await.clone()
    }

    /// Earliest start among active recordings, per the last sweep.
    pub async fn upcoming(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.upcoming
    }

    pub(crate) async fn publish(&self, stats: RecorderStats) {
        *self.inner.write().await = stats;
    }
}
