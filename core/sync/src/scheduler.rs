//! Periodic scheduling of sync passes.
//!
//! The scheduler alternates between running a pass and sleeping for the
//! configured interval. The interval starts when a pass ends, so the real
//! period is the pass duration plus the interval.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use treemirror_common::{Error, Result};

use crate::audit::AuditLog;
use crate::config::SyncConfig;
use crate::reconciler::{Reconciler, SyncReport};

pub const PASS_STARTED: &str = "Synchronization between folders has started";
pub const PASS_FINISHED: &str = "Synchronization between folders has finished";
pub const SYNC_STOPPED: &str = "Synchronization between folders has stopped";

/// Drives the reconciler at a fixed interval until cancelled.
pub struct SyncScheduler {
    reconciler: Reconciler,
    interval: Duration,
    log: Arc<dyn AuditLog>,
}

impl SyncScheduler {
    /// Create a scheduler for the given configuration.
    pub fn new(config: SyncConfig, log: Arc<dyn AuditLog>) -> Self {
        let interval = config.interval;
        Self {
            reconciler: Reconciler::new(config, log.clone()),
            interval,
            log,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run passes until `cancel` fires.
    ///
    /// Cancellation is honored before each pass, between entries of a pass,
    /// and during the sleep. A stop record is logged on the way out.
    ///
    /// # Errors
    /// - Any error that aborts a pass; the loop ends with it
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            "Sync scheduler started: {} -> {} every {:?}",
            self.reconciler.source().display(),
            self.reconciler.replica().display(),
            self.interval
        );

        let mut passes = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_pass(&cancel).await {
                Ok(report) => {
                    passes += 1;
                    info!(
                        "Pass {} completed in {:?}: {} dirs created, {} files created, \
                         {} files updated, {} removed, {} failed",
                        passes,
                        report.duration,
                        report.directories_created,
                        report.files_created,
                        report.files_updated,
                        report.entries_removed,
                        report.entries_failed
                    );
                }
                Err(Error::Cancelled) => break,
                Err(e) => {
                    error!("Synchronization pass failed: {}", e);
                    return Err(e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Sync scheduler shutting down after {} passes", passes);
        self.log.record(SYNC_STOPPED)
    }

    /// Run a single pass framed by start and finish records.
    ///
    /// The walk uses blocking filesystem calls, so it runs on the blocking
    /// thread pool.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<SyncReport> {
        self.log.record(PASS_STARTED)?;

        let reconciler = self.reconciler.clone().with_cancellation(cancel.clone());
        let report = tokio::task::spawn_blocking(move || reconciler.run_pass())
            .await
            .map_err(|e| Error::Scheduler(format!("sync task failed: {}", e)))??;

        debug!("Pass report: {:?}", report);
        self.log.record(PASS_FINISHED)?;
        Ok(report)
    }
}
