//! JSONL audit log of pipeline progress
//!
//! One line per event, appended. Write failures are logged and swallowed so
//! auditing can never fail a submission.

use super::{ProgressSink, ProgressUpdate, StepStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Entry in the audit log
#[derive(Debug, Serialize)]
struct AuditEntry<'a> {
    timestamp: DateTime<Utc>,
    session_id: &'a str,
    step: &'a str,
    status: StepStatus,
    detail: &'a str,
}

/// Writer for audit log entries
struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn write(&self, entry: &AuditEntry<'_>) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// Sink that appends every progress event to a file
pub struct AuditLogSink {
    writer: Mutex<AuditLogWriter>,
}

impl AuditLogSink {
    /// # Arguments
    /// * `log_path` - Path to the audit log file (JSONL format)
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Mutex::new(AuditLogWriter {
                path: log_path.into(),
            }),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.writer
            .lock()
            .map(|w| w.path.clone())
            .unwrap_or_else(|e| e.into_inner().path.clone())
    }
}

impl ProgressSink for AuditLogSink {
    fn report(&self, session_id: &str, update: ProgressUpdate) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            session_id,
            step: &update.step,
            status: update.status,
            detail: &update.detail,
        };
        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writer.write(&entry) {
            tracing::warn!(
                path = %writer.path.display(),
                error = %e,
                "Failed to write audit log entry"
            );
        }
    }
}

impl std::fmt::Debug for AuditLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogSink")
            .field("path", &self.path())
            .finish()
    }
}

/// Read back an audit log, skipping unparsable lines
pub fn read_entries(path: &Path) -> std::io::Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
