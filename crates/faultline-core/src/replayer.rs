//! Replays recorded sessions with timing preservation.
//!
//! `Replayer` loads a [`Recording`] and republishes its events in order,
//! waiting out each event's original offset scaled by a speed multiplier.
//! Schedule targets are absolute (offset / speed since replay start), so
//! filtering events out never shifts the timing of the ones that remain,
//! and a replay that falls behind publishes immediately and carries the
//! drift instead of overcorrecting.

use faultline_proto::{Event, EventSink};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::recorder::Recording;

/// Predicate deciding whether an event name is replayed.
pub type EventFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Callback fired after each publish with `(index, total)`.
///
/// `index` is 1-based over the full recording, `total` the recording's
/// event count, so progress is meaningful even under filtering.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Configuration for a replay run.
#[derive(Clone, Default)]
pub struct ReplayOptions {
    speed: Option<f64>,
    filter: Option<EventFilter>,
    progress: Option<ProgressCallback>,
}

impl ReplayOptions {
    /// Creates options replaying at original speed with no filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the speed multiplier (1.0 = original speed, 2.0 = 2x faster).
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Replays only events whose name the predicate accepts.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Fires the callback after each published event.
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(progress));
        self
    }
}

/// Outcome of a replay run.
#[derive(Debug, Clone)]
pub struct ReplaySummary {
    /// Events published.
    pub replayed: usize,
    /// Events skipped by the filter.
    pub skipped: usize,
    /// Wall-clock duration of the replay.
    pub elapsed: Duration,
}

/// Replays a recorded session into any [`EventSink`].
#[derive(Debug, Clone)]
pub struct Replayer {
    recording: Recording,
}

impl Replayer {
    /// Loads a replayer from a recording file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptRecording`] on malformed data.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            recording: Recording::load(path)?,
        })
    }

    /// Creates a replayer over an in-memory recording.
    pub fn from_recording(recording: Recording) -> Self {
        Self { recording }
    }

    /// Returns the underlying recording.
    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// Returns the number of events in the recording.
    pub fn event_count(&self) -> usize {
        self.recording.events.len()
    }

    /// Per-name event counts.
    pub fn event_summary(&self) -> HashMap<String, usize> {
        self.recording.event_summary()
    }

    /// Returns a new replayer over the events the predicate keeps.
    ///
    /// Non-destructive: this replayer is unchanged. The derived session
    /// is renamed with a `_filtered` suffix and its duration recomputed.
    pub fn filter_events<F>(&self, predicate: F) -> Replayer
    where
        F: Fn(&str) -> bool,
    {
        let events: Vec<_> = self
            .recording
            .events
            .iter()
            .filter(|e| predicate(&e.event_name))
            .cloned()
            .collect();
        Replayer {
            recording: Recording {
                session_name: format!("{}_filtered", self.recording.session_name),
                start_time: self.recording.start_time,
                duration_ms: events.last().map_or(0, |e| e.offset_ms),
                total_events: events.len(),
                events,
            },
        }
    }

    /// Replays the recording into the given sink.
    ///
    /// Each event is published once `offset / speed` has elapsed since
    /// replay start. The wait is never negative: events behind schedule
    /// publish immediately. Relative ordering is preserved regardless of
    /// filtering or speed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the speed multiplier is not
    /// strictly positive.
    pub async fn replay(&self, sink: &dyn EventSink, options: &ReplayOptions) -> Result<ReplaySummary> {
        let speed = options.speed.unwrap_or(1.0);
        if speed <= 0.0 || !speed.is_finite() {
            return Err(Error::Configuration(format!(
                "speed multiplier must be positive, got {speed}"
            )));
        }

        let total = self.recording.events.len();
        info!(
            session = %self.recording.session_name,
            events = total,
            speed,
            "replay started"
        );

        let start = Instant::now();
        let mut replayed = 0;
        let mut skipped = 0;

        for (index, record) in self.recording.events.iter().enumerate() {
            if let Some(filter) = &options.filter
                && !filter(&record.event_name)
            {
                skipped += 1;
                continue;
            }

            let target = start + Duration::from_secs_f64(record.offset_ms as f64 / 1000.0 / speed);
            if target > Instant::now() {
                tokio::time::sleep_until(target).await;
            }

            sink.publish(
                Event::new(&record.event_name)
                    .with_payload(record.event_data.clone())
                    .with_source(format!("Replayer[{}]", self.recording.session_name)),
            );
            replayed += 1;

            if let Some(progress) = &options.progress {
                progress(index + 1, total);
            }
        }

        let elapsed = start.elapsed();
        debug!(replayed, skipped, ?elapsed, "replay complete");
        Ok(ReplaySummary {
            replayed,
            skipped,
            elapsed,
        })
    }
}
