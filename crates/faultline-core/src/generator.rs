//! Deterministic data generation driven by scenario profiles.
//!
//! A [`DataGenerator`] owns a [`Profile`] and produces one
//! [`GeneratedData`] envelope per cycle. Generation is deterministic
//! given the call count and bounded history, so scenario runs are
//! reproducible.

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::f64::consts::TAU;

/// Default cap on the generator's value history.
const DEFAULT_HISTORY_LIMIT: usize = 1_000;

/// Domain-agnostic envelope for one generated data point.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeneratedData {
    /// Main data point (price, temperature, request rate, ...).
    pub primary_value: f64,

    /// Additional derived values (delta, percent change, ...).
    pub secondary_values: HashMap<String, f64>,

    /// Envelope metadata (cycle number, profile name, ...).
    pub metadata: HashMap<String, Value>,
}

impl GeneratedData {
    /// Renders the envelope as an event payload.
    pub fn to_payload(&self) -> Value {
        json!({
            "value": self.primary_value,
            "secondary": self.secondary_values,
            "metadata": self.metadata,
        })
    }
}

/// Behavior of a single phase in a multi-phase profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PhaseBehavior {
    /// Keep the current value.
    Hold,
    /// Multiply by `1 + rate` each cycle.
    GrowthRate(f64),
    /// Multiply by `1 - rate` each cycle.
    DeclineRate(f64),
    /// Jump straight to the given value.
    StepTo(f64),
    /// Approach the given value linearly over the rest of the phase.
    RampTo(f64),
}

/// A named sub-interval of a multi-phase profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phase {
    /// Phase name, e.g. `"crash"` or `"recovery"`.
    pub name: String,
    /// Phase length in cycles.
    pub duration: u64,
    /// Value policy while the phase is active.
    pub behavior: PhaseBehavior,
}

impl Phase {
    /// Creates a phase.
    pub fn new(name: impl Into<String>, duration: u64, behavior: PhaseBehavior) -> Self {
        Self {
            name: name.into(),
            duration,
            behavior,
        }
    }
}

/// Value policy for a data generator.
///
/// Shapes follow the classic simulation scenarios (steady trends,
/// sideways oscillation, mean reversion, phased events like a crash and
/// recovery) but are fully deterministic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Profile {
    /// The value never changes.
    Constant,
    /// Compounding growth: `value * (1 + rate)` per cycle.
    SteadyGrowth { rate: f64 },
    /// Compounding decline: `value * (1 - rate)` per cycle.
    SteadyDecline { rate: f64 },
    /// Sine oscillation of ±`amplitude` around the first generated value,
    /// one full wave every `period` cycles.
    Oscillating { amplitude: f64, period: u64 },
    /// Moves a `strength` fraction of the distance to `target` per cycle.
    MeanReverting { target: f64, strength: f64 },
    /// Ordered phases, each with its own behavior. Past the final phase
    /// the profile holds that phase's behavior.
    MultiPhase { phases: Vec<Phase> },
}

impl Profile {
    /// Short name used in envelope metadata and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Constant => "constant",
            Profile::SteadyGrowth { .. } => "steady_growth",
            Profile::SteadyDecline { .. } => "steady_decline",
            Profile::Oscillating { .. } => "oscillating",
            Profile::MeanReverting { .. } => "mean_reverting",
            Profile::MultiPhase { .. } => "multi_phase",
        }
    }

    /// Computes the next value from the current one.
    ///
    /// `call_count` is the 1-indexed number of this generation call;
    /// `history` holds previously generated primary values, oldest first.
    pub fn next_value(&self, current: f64, call_count: u64, history: &[f64]) -> f64 {
        match self {
            Profile::Constant => current,
            Profile::SteadyGrowth { rate } => current * (1.0 + rate),
            Profile::SteadyDecline { rate } => current * (1.0 - rate),
            Profile::Oscillating { amplitude, period } => {
                let base = history.first().copied().unwrap_or(current);
                let angle = call_count as f64 / (*period).max(1) as f64 * TAU;
                base * (1.0 + amplitude * angle.sin())
            }
            Profile::MeanReverting { target, strength } => current + strength * (target - current),
            Profile::MultiPhase { phases } => {
                let Some((phase, calls_into_phase)) = Self::active_phase(phases, call_count) else {
                    return current;
                };
                let remaining = phase.duration.saturating_sub(calls_into_phase);
                Self::phase_value(phase, current, remaining)
            }
        }
    }

    /// Finds the phase active at the given call count, plus how many
    /// calls into it we are (0-indexed). Past the final phase, the final
    /// phase stays active.
    fn active_phase(phases: &[Phase], call_count: u64) -> Option<(&Phase, u64)> {
        // call_count is 1-indexed; phase boundaries accumulate durations.
        let position = call_count.saturating_sub(1);
        let mut accumulated = 0u64;
        for phase in phases {
            if position < accumulated + phase.duration {
                return Some((phase, position - accumulated));
            }
            accumulated += phase.duration;
        }
        phases.last().map(|phase| (phase, phase.duration))
    }

    /// Progress through the active phase, in `[0, 1]`.
    pub fn phase_progress(&self, call_count: u64) -> Option<f64> {
        let Profile::MultiPhase { phases } = self else {
            return None;
        };
        let (phase, calls_into_phase) = Self::active_phase(phases, call_count)?;
        if phase.duration == 0 {
            return Some(1.0);
        }
        Some((calls_into_phase as f64 / phase.duration as f64).min(1.0))
    }

    fn phase_value(phase: &Phase, current: f64, remaining: u64) -> f64 {
        match &phase.behavior {
            PhaseBehavior::Hold => current,
            PhaseBehavior::GrowthRate(rate) => current * (1.0 + rate),
            PhaseBehavior::DeclineRate(rate) => current * (1.0 - rate),
            PhaseBehavior::StepTo(value) => *value,
            PhaseBehavior::RampTo(value) => {
                if remaining <= 1 {
                    *value
                } else {
                    current + (value - current) / remaining as f64
                }
            }
        }
    }
}

/// Statistics about generated data.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeneratorStats {
    pub call_count: u64,
    pub history_len: usize,
    pub min_value: f64,
    pub max_value: f64,
    pub last_value: f64,
}

/// Produces one data point per cycle according to a [`Profile`].
#[derive(Debug, Clone)]
pub struct DataGenerator {
    profile: Profile,
    initial_value: f64,
    current: f64,
    call_count: u64,
    history: VecDeque<GeneratedData>,
    history_limit: usize,
}

impl DataGenerator {
    /// Creates a generator starting from the given value.
    pub fn new(profile: Profile, initial_value: f64) -> Self {
        Self {
            profile,
            initial_value,
            current: initial_value,
            call_count: 0,
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Caps the retained history at `limit` entries.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Generates the next data point.
    pub fn generate_next(&mut self) -> GeneratedData {
        self.call_count += 1;

        let values: Vec<f64> = self.history.iter().map(|d| d.primary_value).collect();
        let previous = self.current;
        let next = self.profile.next_value(previous, self.call_count, &values);
        self.current = next;

        let mut secondary_values = HashMap::new();
        secondary_values.insert("delta".to_string(), next - previous);
        if previous != 0.0 {
            secondary_values.insert(
                "change_pct".to_string(),
                (next - previous) / previous * 100.0,
            );
        }

        let mut metadata = HashMap::new();
        metadata.insert("cycle".to_string(), json!(self.call_count));
        metadata.insert("profile".to_string(), json!(self.profile.name()));

        let data = GeneratedData {
            primary_value: next,
            secondary_values,
            metadata,
        };

        self.history.push_back(data.clone());
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }

        data
    }

    /// Resets the generator to its initial state, clearing call count and
    /// history.
    pub fn reset(&mut self) {
        self.current = self.initial_value;
        self.call_count = 0;
        self.history.clear();
    }

    /// Returns the number of generation calls so far.
    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    /// Returns the most recent value.
    pub fn current_value(&self) -> f64 {
        self.current
    }

    /// Returns the profile in use.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Returns the retained history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &GeneratedData> {
        self.history.iter()
    }

    /// Summarizes the generated values so far.
    pub fn statistics(&self) -> GeneratorStats {
        let values = self.history.iter().map(|d| d.primary_value);
        GeneratorStats {
            call_count: self.call_count,
            history_len: self.history.len(),
            min_value: values.clone().fold(f64::INFINITY, f64::min),
            max_value: values.fold(f64::NEG_INFINITY, f64::max),
            last_value: self.current,
        }
    }
}
