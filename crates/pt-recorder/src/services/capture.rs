//! Process-backed capture capability
//!
//! Wraps one reservation and the configured capture command into the
//! `Record` capability the controller layer drives. The spawned process
//! is expected to keep capturing until it is killed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::CaptureConfig;
use crate::errors::{AppResult, CaptureError};
use crate::models::TvRecord;
use crate::recording::Record;

/// One reservation bound to the capture command.
pub struct CaptureRecord {
    record: TvRecord,
    command: String,
    args: Vec<String>,
    output_path: PathBuf,
    check_interval: Duration,
    child: Mutex<Option<Child>>,
}

impl CaptureRecord {
    pub fn new(record: TvRecord, config: &CaptureConfig, check_interval: Duration) -> Arc<Self> {
        let output_path = config.output_dir.join(format!("{}.ts", record.id));
        Arc::new(Self {
            record,
            command: config.command.clone(),
            args: config.args.clone(),
            output_path,
            check_interval,
            child: Mutex::new(None),
        })
    }

    pub fn output_path(&self) -> &PathBuf {
        &self.output_path
    }
}

/// Render the argument template for one reservation.
fn substitute_args(args: &[String], record: &TvRecord, output: &str) -> Vec<String> {
    args.iter()
        .map(|arg| {
            arg.replace("{sid}", &record.sid)
                .replace("{cid}", &record.cid)
                .replace("{input_idx}", &record.input_idx.to_string())
                .replace("{output}", output)
        })
        .collect()
}

#[async_trait]
impl Record for CaptureRecord {
    fn key(&self) -> String {
        self.record.key()
    }

    fn start_at(&self) -> DateTime<Utc> {
        self.record.start_at
    }

    fn end_at(&self) -> DateTime<Utc> {
        self.record.end_at
    }

    fn check_interval(&self) -> Duration {
        self.check_interval
    }

    async fn start(&self) -> AppResult<()> {
        let mut child = self.child.lock().await;
        if let Some(process) = child.as_mut() {
            match process.try_wait() {
                Ok(None) => return Ok(()), // still capturing
                _ => *child = None,
            }
        }

        let output = self.output_path.to_string_lossy().into_owned();
        let args = substitute_args(&self.args, &self.record, &output);
        debug!(
            "{}: spawning capture: {} {}",
            self.record.id,
            self.command,
            args.join(" ")
        );

        let process = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        *child = Some(process);
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        let mut child = self.child.lock().await;
        match child.take() {
            Some(mut process) => {
                process.kill().await.map_err(CaptureError::Stop)?;
                debug!("{}: capture process stopped", self.record.id);
                Ok(())
            }
            // nothing was ever spawned; a cancel from Waiting lands here
            None => Ok(()),
        }
    }

    async fn is_running(&self) -> bool {
        let mut child = self.child.lock().await;
        match child.as_mut() {
            Some(process) => match process.try_wait() {
                Ok(None) => true,
                _ => {
                    *child = None;
                    false
                }
            },
            None => false,
        }
    }
}
