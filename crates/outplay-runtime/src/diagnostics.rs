use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum number of events retained in the ring buffer.
const EVENT_LOG_CAPACITY: usize = 200;

/// A typed event from a playback session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    Launched {
        player: String,
        files: usize,
        pid: Option<u32>,
    },
    LaunchFailed {
        player: String,
        message: String,
    },
    PlaybackStarted {
        file_index: usize,
    },
    ResumeSeek {
        position: Duration,
    },
    Command {
        command: String,
        supported: bool,
    },
    ControlFailed {
        command: String,
        message: String,
    },
    Telemetry {
        delivered: u64,
        dropped: u64,
        idle: u64,
        suppressed: u64,
    },
    Finished {
        reason: String,
        position: Duration,
    },
}

/// A timestamped event entry.
pub type EventEntry = (DateTime<Utc>, DiagnosticEvent);

/// Bounded ring buffer of session events.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventEntry>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    /// Push a new event, evicting the oldest if at capacity.
    pub fn push(&mut self, event: DiagnosticEvent) {
        if self.entries.len() >= EVENT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((Utc::now(), event));
    }

    /// Return a snapshot of all entries (newest last).
    pub fn snapshot(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Thread-safe handle to the event log.
pub type SharedEventLog = Arc<Mutex<EventLog>>;

pub fn shared_event_log() -> SharedEventLog {
    Arc::new(Mutex::new(EventLog::new()))
}

/// Append to a shared log, tolerating a poisoned lock.
pub(crate) fn record(log: &SharedEventLog, event: DiagnosticEvent) {
    let mut log = log.lock().unwrap_or_else(|e| e.into_inner());
    log.push(event);
}
