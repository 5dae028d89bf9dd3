//! Event recorder for capturing timestamped sessions.
//!
//! `Recorder` sits on the publish path as an [`EventSink`] wrapper: every
//! event is appended to the session history with its offset from session
//! start, then forwarded to the inner sink. Completed sessions persist as
//! JSON [`Recording`] files for later replay and analysis.

use chrono::{DateTime, Utc};
use faultline_proto::{Event, EventSink};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A single captured event with its offset from session start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedEvent {
    /// Milliseconds elapsed from session start to this event.
    #[serde(rename = "timestamp_offset_ms")]
    pub offset_ms: u64,

    /// The event name.
    pub event_name: String,

    /// The event payload, preserved exactly as published.
    pub event_data: Value,

    /// The component that published the event.
    pub source: String,
}

impl RecordedEvent {
    /// Reconstructs the bus event this record was captured from.
    pub fn to_event(&self) -> Event {
        Event::new(&self.event_name)
            .with_payload(self.event_data.clone())
            .with_source(&self.source)
    }
}

/// A complete recorded session.
///
/// Offsets are non-negative, non-decreasing milliseconds from session
/// start. A recording is immutable once saved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recording {
    /// Name of the recording session.
    pub session_name: String,

    /// Wall-clock time the session started (ISO-8601).
    pub start_time: DateTime<Utc>,

    /// Offset of the last event, in milliseconds.
    pub duration_ms: u64,

    /// Number of recorded events.
    pub total_events: usize,

    /// Ordered event sequence.
    pub events: Vec<RecordedEvent>,
}

/// Summary of a recording on disk, as returned by [`Recording::list`].
#[derive(Debug, Clone, Serialize)]
pub struct RecordingInfo {
    pub path: PathBuf,
    pub session_name: String,
    pub total_events: usize,
    pub duration_ms: u64,
}

impl Recording {
    /// Loads a recording from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptRecording`] when the file is not valid
    /// JSON, does not match the recording shape, or carries decreasing
    /// offsets.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let recording: Recording =
            serde_json::from_str(&text).map_err(|e| Error::CorruptRecording {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        recording.validate().map_err(|reason| Error::CorruptRecording {
            path: path.to_path_buf(),
            reason,
        })?;
        debug!(
            session = %recording.session_name,
            events = recording.events.len(),
            "recording loaded"
        );
        Ok(recording)
    }

    /// Saves the recording atomically and returns the final path.
    ///
    /// The file is written next to its destination and renamed into
    /// place, so a failed save never leaves a corrupt partial file at
    /// the target path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("unserializable recording: {e}")))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        info!(
            session = %self.session_name,
            events = self.total_events,
            path = %path.display(),
            "recording saved"
        );
        Ok(path.to_path_buf())
    }

    /// Lists recordings in a directory with summary metadata.
    ///
    /// Files that fail to parse are skipped.
    pub fn list(dir: impl AsRef<Path>) -> Result<Vec<RecordingInfo>> {
        let mut infos = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Ok(recording) = Recording::load(&path) {
                infos.push(RecordingInfo {
                    path,
                    session_name: recording.session_name,
                    total_events: recording.total_events,
                    duration_ms: recording.duration_ms,
                });
            }
        }
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(infos)
    }

    /// Per-name event counts.
    pub fn event_summary(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for event in &self.events {
            *counts.entry(event.event_name.clone()).or_default() += 1;
        }
        counts
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let mut last = 0u64;
        for (i, event) in self.events.iter().enumerate() {
            if event.offset_ms < last {
                return Err(format!(
                    "offset decreases at event {i}: {} < {last}",
                    event.offset_ms
                ));
            }
            last = event.offset_ms;
        }
        Ok(())
    }
}

struct RecorderState {
    events: Vec<RecordedEvent>,
    recording: bool,
}

struct RecorderShared {
    session_name: String,
    start_time: DateTime<Utc>,
    started: Instant,
    state: Mutex<RecorderState>,
    notify: Notify,
}

impl RecorderShared {
    fn snapshot(&self) -> Recording {
        let events = self
            .state
            .lock()
            .map(|state| state.events.clone())
            .unwrap_or_default();
        Recording {
            session_name: self.session_name.clone(),
            start_time: self.start_time,
            duration_ms: events.last().map_or(0, |e| e.offset_ms),
            total_events: events.len(),
            events,
        }
    }
}

/// Records every event flowing through the publish path.
///
/// The recorder wraps the inner sink rather than replacing it: events are
/// appended to the session history and then forwarded unchanged. Use the
/// [`RecorderHandle`] returned by [`Recorder::start`] to inspect history,
/// wait for events, stop recording, and persist the session.
pub struct Recorder {
    inner: Arc<dyn EventSink>,
    shared: Arc<RecorderShared>,
}

impl Recorder {
    /// Starts a recording session wrapping the given sink.
    ///
    /// Returns the recorder (to be placed on the publish path) and a
    /// cloneable handle for inspection and control.
    pub fn start(session_name: impl Into<String>, inner: Arc<dyn EventSink>) -> (Self, RecorderHandle) {
        let shared = Arc::new(RecorderShared {
            session_name: session_name.into(),
            start_time: Utc::now(),
            started: Instant::now(),
            state: Mutex::new(RecorderState {
                events: Vec::new(),
                recording: true,
            }),
            notify: Notify::new(),
        });
        info!(session = %shared.session_name, "recording started");
        let handle = RecorderHandle {
            shared: Arc::clone(&shared),
        };
        (Self { inner, shared }, handle)
    }
}

impl EventSink for Recorder {
    fn publish(&self, event: Event) {
        let mut recorded = false;
        if let Ok(mut state) = self.shared.state.lock()
            && state.recording
        {
            let offset_ms = self.shared.started.elapsed().as_millis() as u64;
            // Monotonic clock keeps offsets non-decreasing; clamp anyway
            // so a saved recording always validates.
            let offset_ms = state.events.last().map_or(offset_ms, |last| offset_ms.max(last.offset_ms));
            state.events.push(RecordedEvent {
                offset_ms,
                event_name: event.name.clone(),
                event_data: event.payload.clone(),
                source: event.source.clone(),
            });
            recorded = true;
        }
        if recorded {
            self.shared.notify.notify_waiters();
        }
        self.inner.publish(event);
    }
}

/// Cloneable handle to a recording session.
#[derive(Clone)]
pub struct RecorderHandle {
    shared: Arc<RecorderShared>,
}

impl RecorderHandle {
    /// Returns the session name.
    pub fn session_name(&self) -> &str {
        &self.shared.session_name
    }

    /// Returns the elapsed time since recording started.
    pub fn elapsed(&self) -> Duration {
        self.shared.started.elapsed()
    }

    /// Returns the number of recorded events.
    pub fn len(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| state.events.len())
            .unwrap_or(0)
    }

    /// Checks whether any events were recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts recorded events with the given name.
    pub fn count(&self, event_name: &str) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| {
                state
                    .events
                    .iter()
                    .filter(|e| e.event_name == event_name)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Returns a copy of the history so far.
    pub fn history(&self) -> Vec<RecordedEvent> {
        self.shared
            .state
            .lock()
            .map(|state| state.events.clone())
            .unwrap_or_default()
    }

    /// Per-name event counts over the history so far.
    pub fn event_counts(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        if let Ok(state) = self.shared.state.lock() {
            for event in &state.events {
                *counts.entry(event.event_name.clone()).or_default() += 1;
            }
        }
        counts
    }

    /// Stops recording: later publishes are forwarded but no longer
    /// captured. Returns the number of recorded events.
    pub fn stop(&self) -> usize {
        let count = self
            .shared
            .state
            .lock()
            .map(|mut state| {
                state.recording = false;
                state.events.len()
            })
            .unwrap_or(0);
        info!(session = %self.shared.session_name, events = count, "recording stopped");
        count
    }

    /// Checks whether the session is still capturing events.
    pub fn is_recording(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.recording)
            .unwrap_or(false)
    }

    /// Snapshots the session as an immutable [`Recording`].
    ///
    /// Valid on a live session: the snapshot captures the history at the
    /// moment of the call. Recording continues unaffected.
    pub fn snapshot(&self) -> Recording {
        self.shared.snapshot()
    }

    /// Persists a snapshot of the session and returns the written path.
    ///
    /// Saving does not require `stop()` first; a save on a live session
    /// snapshots the current history. Repeated saves are allowed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        self.snapshot().save(path)
    }

    /// Waits until an event with the given name has been recorded.
    ///
    /// Returns the first matching event, or [`Error::Timing`] once the
    /// timeout elapses. Cancellation is clean: the internal waiter is
    /// released when this future is dropped or times out.
    pub async fn wait_for(&self, event_name: &str, timeout: Duration) -> Result<RecordedEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register the waiter before checking, so an event recorded
            // between the check and the await is not missed.
            let notified = self.shared.notify.notified();

            let found = self.shared.state.lock().ok().and_then(|state| {
                state
                    .events
                    .iter()
                    .find(|e| e.event_name == event_name)
                    .cloned()
            });
            if let Some(event) = found {
                return Ok(event);
            }

            let now = Instant::now();
            if now >= deadline
                || tokio::time::timeout(deadline - now, notified).await.is_err()
            {
                return Err(Error::Timing {
                    what: format!("event '{event_name}'"),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    }
}
