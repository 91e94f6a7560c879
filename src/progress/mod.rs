//! Progress reporting
//!
//! Pipeline milestones are reported as fire-and-forget `(session, update)`
//! events. Sinks must not block and must not fail the caller.

mod audit;

pub use audit::{read_entries as read_audit_log, AuditLogSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Events kept per session
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Sessions idle for longer than this are dropped by `prune_idle`
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

const SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Start,
    Progress,
    Success,
    Error,
}

/// What a caller reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub step: String,
    pub status: StepStatus,
    pub detail: String,
}

impl ProgressUpdate {
    pub fn new(step: impl Into<String>, status: StepStatus, detail: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status,
            detail: detail.into(),
        }
    }
}

/// A recorded update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: String,
    /// Resume token; a millisecond timestamp, bumped when two events share one
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub update: ProgressUpdate,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, session_id: &str, update: ProgressUpdate);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _session_id: &str, _update: ProgressUpdate) {}
}

/// Fans one event out to several sinks
pub struct FanoutSink(pub Vec<Arc<dyn ProgressSink>>);

impl ProgressSink for FanoutSink {
    fn report(&self, session_id: &str, update: ProgressUpdate) {
        for sink in &self.0 {
            sink.report(session_id, update.clone());
        }
    }
}

/// A sink bound to one session
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    session_id: String,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, session_id: impl Into<String>) -> Self {
        Self {
            sink,
            session_id: session_id.into(),
        }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(NullSink), "")
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn report(&self, step: &str, status: StepStatus, detail: impl Into<String>) {
        self.sink
            .report(&self.session_id, ProgressUpdate::new(step, status, detail));
    }

    pub fn progress(&self, step: &str, detail: impl Into<String>) {
        self.report(step, StepStatus::Progress, detail);
    }

    pub fn success(&self, step: &str, detail: impl Into<String>) {
        self.report(step, StepStatus::Success, detail);
    }

    pub fn error(&self, step: &str, detail: impl Into<String>) {
        self.report(step, StepStatus::Error, detail);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

struct Session {
    events: VecDeque<ProgressEvent>,
    last_event_ms: i64,
    last_activity: Instant,
    sender: broadcast::Sender<ProgressEvent>,
}

impl Session {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            events: VecDeque::new(),
            last_event_ms: 0,
            last_activity: Instant::now(),
            sender,
        }
    }
}

/// In-memory per-session history with live subscriptions
pub struct ProgressTracker {
    sessions: Mutex<HashMap<String, Session>>,
    history_limit: usize,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ProgressTracker {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit: history_limit.max(1),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        // History is append-only; a poisoned lock still holds usable data
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, session_id: &str, update: ProgressUpdate) -> ProgressEvent {
        let now = Utc::now();
        let mut sessions = self.sessions();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(Session::new);

        let event_ms = now.timestamp_millis().max(session.last_event_ms + 1);
        session.last_event_ms = event_ms;
        session.last_activity = Instant::now();

        let event = ProgressEvent {
            session_id: session_id.to_string(),
            event_id: event_ms.to_string(),
            timestamp: now,
            update,
        };
        session.events.push_back(event.clone());
        while session.events.len() > self.history_limit {
            session.events.pop_front();
        }
        // No receivers is fine
        let _ = session.sender.send(event.clone());
        event
    }

    pub fn get_all(&self, session_id: &str) -> Vec<ProgressEvent> {
        self.sessions()
            .get(session_id)
            .map(|s| s.events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Events after `last_event_id`; the whole history if the id is unknown
    pub fn get_since(&self, session_id: &str, last_event_id: Option<&str>) -> Vec<ProgressEvent> {
        let events = self.get_all(session_id);
        let Some(last) = last_event_id else {
            return events;
        };
        match events.iter().position(|e| e.event_id == last) {
            Some(idx) => events[idx + 1..].to_vec(),
            None => events,
        }
    }

    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut sessions = self.sessions();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(Session::new);
        session.last_activity = Instant::now();
        session.sender.subscribe()
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions().remove(session_id);
    }

    /// Drop sessions with no activity for `ttl`. Returns how many were dropped.
    pub fn prune_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, session| session.last_activity.elapsed() < ttl);
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Dropped idle progress sessions");
        }
        pruned
    }
}

impl ProgressSink for ProgressTracker {
    fn report(&self, session_id: &str, update: ProgressUpdate) {
        self.push(session_id, update);
    }
}
