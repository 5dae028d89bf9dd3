//! Structured scenario reports.
//!
//! The engine threads one report through a run and returns it to the
//! caller; rendering is left to downstream consumers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::assertion::AssertionResult;
use crate::chaos::ChaosStats;

/// Terminal and intermediate states of a scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Not yet started.
    Idle,
    /// Steps are executing.
    Running,
    /// Every step succeeded and every assertion passed.
    Completed,
    /// An assertion or a non-fatal step failed.
    Failed,
    /// A user action failed; remaining steps were not executed.
    Errored,
    /// The run was stopped explicitly.
    Aborted,
}

impl ScenarioStatus {
    /// Whether the run has reached a final state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ScenarioStatus::Idle | ScenarioStatus::Running)
    }

    /// Stable string form used in serialized reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioStatus::Idle => "idle",
            ScenarioStatus::Running => "running",
            ScenarioStatus::Completed => "completed",
            ScenarioStatus::Failed => "failed",
            ScenarioStatus::Errored => "errored",
            ScenarioStatus::Aborted => "aborted",
        }
    }
}

/// Outcome of a single scenario step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Step position in the scenario (0-indexed).
    pub index: usize,
    /// Step kind, e.g. `"wait_cycles"`.
    pub kind: &'static str,
    /// Whether the step succeeded.
    pub success: bool,
    /// Wall-clock duration of the step.
    pub duration_ms: u64,
    /// Failure reason, when the step did not succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Assertion results produced by this step.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionResult>,
}

/// Full report of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario_name: String,
    /// Final status.
    pub status: ScenarioStatus,
    /// Wall-clock time the run started.
    pub start_time: DateTime<Utc>,
    /// Total run duration.
    pub duration_ms: u64,
    /// Cycles driven during the run.
    pub total_cycles: u64,
    /// Per-step outcomes, in execution order.
    pub steps: Vec<StepResult>,
    /// Assertions that passed, across all steps.
    pub assertions_passed: usize,
    /// Assertions that failed, across all steps.
    pub assertions_failed: usize,
    /// Events recorded during the run, by name.
    pub event_counts: HashMap<String, usize>,
    /// What the chaos injector did to the event stream.
    pub chaos: ChaosStats,
    /// The reason the run aborted, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScenarioReport {
    /// Whether the scenario completed with every assertion passing.
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Completed
    }

    /// All failing assertion results, across steps.
    pub fn failed_assertions(&self) -> Vec<&AssertionResult> {
        self.steps
            .iter()
            .flat_map(|step| step.assertions.iter())
            .filter(|result| !result.passed)
            .collect()
    }

    /// Renders the report as a JSON document.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
