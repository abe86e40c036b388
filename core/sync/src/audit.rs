//! Audit trail of every change made to the replica.
//!
//! Records are written synchronously: `record` returns only after the line
//! reached the log file and the console, so an action is never considered
//! done before it is logged.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::debug;

use treemirror_common::{Error, IoContext, Result};

/// Timestamp layout used in every record.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Sink for audit records.
///
/// Failures surface as errors and abort the current pass. Implementations
/// that prefer to degrade can swallow their own errors and return `Ok`.
pub trait AuditLog: Send + Sync {
    /// Append one record.
    fn record(&self, message: &str) -> Result<()>;
}

/// Render a record line (without trailing newline).
pub fn format_record(time: DateTime<Local>, message: &str) -> String {
    format!("TIME: {} -> ACTION: {}", time.format(TIMESTAMP_FORMAT), message)
}

/// Audit log backed by an append-only file, mirrored to stdout.
pub struct AuditLogger {
    path: PathBuf,
    file: Mutex<File>,
    console: bool,
}

impl AuditLogger {
    /// Open (or create) the log file in append mode.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    /// - Parent directory cannot be created
    /// - File cannot be opened for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).at_path(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .at_path(&path)?;

        debug!("Audit log opened at {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(file),
            console: true,
        })
    }

    /// Stop mirroring records to stdout.
    pub fn without_console(mut self) -> Self {
        self.console = false;
        self
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for AuditLogger {
    fn record(&self, message: &str) -> Result<()> {
        let line = format_record(Local::now(), message);

        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| Error::AuditLog("log file lock poisoned".to_string()))?;
            writeln!(file, "{}", line).at_path(&self.path)?;
            file.flush().at_path(&self.path)?;
        }

        if self.console {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", line)
                .and_then(|_| stdout.flush())
                .map_err(|e| Error::AuditLog(format!("console write failed: {}", e)))?;
        }

        Ok(())
    }
}

/// In-memory audit log, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    messages: Mutex<Vec<String>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded message, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Drop all recorded messages.
    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, message: &str) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| Error::AuditLog("memory log lock poisoned".to_string()))?
            .push(message.to_string());
        Ok(())
    }
}
