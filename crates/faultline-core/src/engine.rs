//! Scenario orchestration.
//!
//! The engine executes a linear sequence of steps against a composed
//! publish chain (chaos injector → recorder → caller's bus), driving the
//! data generator one cycle at a time and aggregating step, assertion,
//! and chaos results into a [`ScenarioReport`].

use chrono::Utc;
use faultline_proto::{Event, EventSink};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::assertion::{Assertion, AssertionResult, check_assertions};
use crate::chaos::{ChaosInjector, ChaosRule};
use crate::generator::DataGenerator;
use crate::recorder::{Recorder, RecorderHandle};
use crate::report::{ScenarioReport, ScenarioStatus, StepResult};

/// User callback for [`ScenarioStep::ExecuteAction`].
///
/// An `Err` is treated as an execution error: the engine transitions to
/// `Errored` and skips all remaining steps.
pub type ActionFn = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// One step in a scenario. Steps execute strictly in order.
#[derive(Clone)]
pub enum ScenarioStep {
    /// Advance the generator and publish the data event `cycles` times.
    WaitCycles { cycles: u32 },
    /// Drive cycles until the named event is recorded or the timeout
    /// elapses.
    WaitEvent { event_name: String, timeout: Duration },
    /// Check assertions against the history so far.
    RunAssertions { assertions: Vec<Assertion> },
    /// Invoke a user callback.
    ExecuteAction { name: String, action: ActionFn },
    /// Advance the generator `count` times without publishing, to
    /// pre-seed its history.
    GenerateData { count: u32 },
}

impl ScenarioStep {
    /// Wait-cycles step.
    pub fn wait_cycles(cycles: u32) -> Self {
        ScenarioStep::WaitCycles { cycles }
    }

    /// Wait-event step.
    pub fn wait_event(event_name: impl Into<String>, timeout: Duration) -> Self {
        ScenarioStep::WaitEvent {
            event_name: event_name.into(),
            timeout,
        }
    }

    /// Assertion-checkpoint step.
    pub fn run_assertions(assertions: Vec<Assertion>) -> Self {
        ScenarioStep::RunAssertions { assertions }
    }

    /// User-action step.
    pub fn execute_action<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        ScenarioStep::ExecuteAction {
            name: name.into(),
            action: Arc::new(action),
        }
    }

    /// History pre-seeding step.
    pub fn generate_data(count: u32) -> Self {
        ScenarioStep::GenerateData { count }
    }

    /// Step kind label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ScenarioStep::WaitCycles { .. } => "wait_cycles",
            ScenarioStep::WaitEvent { .. } => "wait_event",
            ScenarioStep::RunAssertions { .. } => "run_assertions",
            ScenarioStep::ExecuteAction { .. } => "execute_action",
            ScenarioStep::GenerateData { .. } => "generate_data",
        }
    }
}

impl fmt::Debug for ScenarioStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioStep::WaitCycles { cycles } => {
                f.debug_struct("WaitCycles").field("cycles", cycles).finish()
            }
            ScenarioStep::WaitEvent {
                event_name,
                timeout,
            } => f
                .debug_struct("WaitEvent")
                .field("event_name", event_name)
                .field("timeout", timeout)
                .finish(),
            ScenarioStep::RunAssertions { assertions } => f
                .debug_struct("RunAssertions")
                .field("assertions", assertions)
                .finish(),
            ScenarioStep::ExecuteAction { name, .. } => f
                .debug_struct("ExecuteAction")
                .field("name", name)
                .finish_non_exhaustive(),
            ScenarioStep::GenerateData { count } => {
                f.debug_struct("GenerateData").field("count", count).finish()
            }
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name of the event published once per cycle.
    pub data_event_name: String,
    /// Source attached to published data events.
    pub source: String,
    /// Pause between driven cycles while waiting for an event.
    pub cycle_interval: Duration,
    /// Treat wait-event timeouts as fatal, failing the run immediately.
    pub fatal_timeouts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_event_name: "DataGenerated".to_string(),
            source: "ScenarioEngine".to_string(),
            cycle_interval: Duration::from_millis(10),
            fatal_timeouts: false,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-cycle event name.
    pub fn with_data_event_name(mut self, name: impl Into<String>) -> Self {
        self.data_event_name = name.into();
        self
    }

    /// Sets the source attached to published data events.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the pause between driven cycles in wait-event steps.
    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    /// Makes wait-event timeouts fail the run immediately.
    pub fn with_fatal_timeouts(mut self) -> Self {
        self.fatal_timeouts = true;
        self
    }
}

/// Cloneable handle for stopping a running scenario.
#[derive(Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    /// Requests the scenario stop. The run finishes its current step,
    /// cancels pending chaos timers, and reports `Aborted`.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Outcome of one executed step, before aggregation into the report.
struct StepOutcome {
    success: bool,
    error: Option<String>,
    assertions: Vec<AssertionResult>,
    /// Status to abort the run with, when the failure is fatal.
    abort: Option<ScenarioStatus>,
}

impl StepOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
            assertions: Vec::new(),
            abort: None,
        }
    }
}

/// Orchestrates scenario steps against a composed publish chain.
///
/// One engine owns one recorder/injector pair; run concurrent scenarios
/// with independent engines. The chain is wired at construction: events
/// published through [`ScenarioEngine::sink`] pass the chaos injector,
/// then the recorder, then the caller's bus.
pub struct ScenarioEngine {
    name: String,
    config: EngineConfig,
    generator: DataGenerator,
    injector: Arc<ChaosInjector>,
    recorder: RecorderHandle,
    status: ScenarioStatus,
    stop: StopHandle,
}

impl ScenarioEngine {
    /// Creates an engine for the named scenario, publishing into `bus`.
    pub fn new(name: impl Into<String>, bus: Arc<dyn EventSink>, generator: DataGenerator) -> Self {
        let name = name.into();
        let (recorder, recorder_handle) = Recorder::start(name.clone(), bus);
        let injector = Arc::new(ChaosInjector::new(Arc::new(recorder)));
        Self {
            name,
            config: EngineConfig::default(),
            generator,
            injector,
            recorder: recorder_handle,
            status: ScenarioStatus::Idle,
            stop: StopHandle::default(),
        }
    }

    /// Replaces the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a chaos rule. Rules apply to every event published
    /// through the engine's sink.
    pub fn add_chaos_rule(&self, rule: ChaosRule) {
        self.injector.add_rule(rule);
    }

    /// The head of the publish chain. Events published here are subject
    /// to chaos, recorded, and delivered to the bus.
    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.injector) as Arc<dyn EventSink>
    }

    /// Handle to the engine's recorder.
    pub fn recorder(&self) -> RecorderHandle {
        self.recorder.clone()
    }

    /// Handle for stopping a running scenario from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current state of the engine.
    pub fn status(&self) -> ScenarioStatus {
        self.status
    }

    /// Cycles driven so far.
    pub fn cycle(&self) -> u64 {
        self.injector.cycle()
    }

    /// Runs the scenario steps in order and returns the report.
    ///
    /// The generator is reset at the start of the run. Before returning,
    /// pending delayed deliveries are flushed on a normal finish and
    /// cancelled on an abort or error, so no scheduled work outlives
    /// the run.
    pub async fn run(&mut self, steps: Vec<ScenarioStep>) -> ScenarioReport {
        let start_time = Utc::now();
        let started = Instant::now();
        self.status = ScenarioStatus::Running;
        self.generator.reset();
        info!(scenario = %self.name, steps = steps.len(), "scenario started");

        let mut step_results: Vec<StepResult> = Vec::with_capacity(steps.len());
        let mut run_failed = false;
        let mut run_error: Option<String> = None;

        for (index, step) in steps.iter().enumerate() {
            if self.stop.is_stopped() {
                self.status = ScenarioStatus::Aborted;
                break;
            }

            debug!(step = index + 1, total = steps.len(), kind = step.kind(), "executing step");
            let step_started = Instant::now();
            let outcome = self.execute_step(step).await;

            if !outcome.success {
                warn!(
                    step = index + 1,
                    kind = step.kind(),
                    error = outcome.error.as_deref().unwrap_or("assertion failure"),
                    "step failed"
                );
                run_failed = true;
            }

            step_results.push(StepResult {
                index,
                kind: step.kind(),
                success: outcome.success,
                duration_ms: step_started.elapsed().as_millis() as u64,
                error: outcome.error.clone(),
                assertions: outcome.assertions,
            });

            if let Some(status) = outcome.abort {
                self.status = status;
                run_error = outcome.error;
                break;
            }
        }

        // A stop requested mid-step still aborts the run.
        if self.stop.is_stopped() && !self.status.is_terminal() {
            self.status = ScenarioStatus::Aborted;
        }

        // Aborted and errored runs cancel outstanding timers so no
        // scheduled work outlives them; normal runs flush deferred
        // deliveries so they land in the recording.
        if matches!(self.status, ScenarioStatus::Aborted | ScenarioStatus::Errored) {
            let cancelled = self.injector.cancel_pending();
            if cancelled > 0 {
                debug!(cancelled, "pending delayed deliveries cancelled");
            }
        } else {
            self.injector.flush_pending().await;
        }

        if !self.status.is_terminal() {
            self.status = if run_failed {
                ScenarioStatus::Failed
            } else {
                ScenarioStatus::Completed
            };
        }

        let assertions_passed = step_results
            .iter()
            .flat_map(|s| s.assertions.iter())
            .filter(|a| a.passed)
            .count();
        let assertions_failed = step_results
            .iter()
            .flat_map(|s| s.assertions.iter())
            .filter(|a| !a.passed)
            .count();

        let report = ScenarioReport {
            scenario_name: self.name.clone(),
            status: self.status,
            start_time,
            duration_ms: started.elapsed().as_millis() as u64,
            total_cycles: self.injector.cycle(),
            steps: step_results,
            assertions_passed,
            assertions_failed,
            event_counts: self.recorder.event_counts(),
            chaos: self.injector.report(),
            error: run_error,
        };
        info!(
            scenario = %self.name,
            status = self.status.as_str(),
            cycles = report.total_cycles,
            "scenario finished"
        );
        report
    }

    async fn execute_step(&mut self, step: &ScenarioStep) -> StepOutcome {
        match step {
            ScenarioStep::WaitCycles { cycles } => {
                for _ in 0..*cycles {
                    if self.stop.is_stopped() {
                        break;
                    }
                    self.drive_cycle();
                    // Give spawned chaos tasks a chance to run between cycles.
                    tokio::task::yield_now().await;
                }
                StepOutcome::ok()
            }
            ScenarioStep::WaitEvent {
                event_name,
                timeout,
            } => self.wait_event(event_name, *timeout).await,
            ScenarioStep::RunAssertions { assertions } => {
                let history = self.recorder.history();
                let results = check_assertions(&history, assertions);
                let success = results.iter().all(|r| r.passed);
                StepOutcome {
                    success,
                    error: None,
                    assertions: results,
                    abort: None,
                }
            }
            ScenarioStep::ExecuteAction { name, action } => match action() {
                Ok(()) => StepOutcome::ok(),
                Err(reason) => StepOutcome {
                    success: false,
                    error: Some(format!("action '{name}' failed: {reason}")),
                    assertions: Vec::new(),
                    abort: Some(ScenarioStatus::Errored),
                },
            },
            ScenarioStep::GenerateData { count } => {
                for _ in 0..*count {
                    self.generator.generate_next();
                }
                StepOutcome::ok()
            }
        }
    }

    async fn wait_event(&mut self, event_name: &str, timeout: Duration) -> StepOutcome {
        let deadline = Instant::now() + timeout;
        loop {
            if self.recorder.count(event_name) > 0 {
                return StepOutcome::ok();
            }
            if self.stop.is_stopped() {
                return StepOutcome {
                    success: false,
                    error: Some("stopped while waiting".to_string()),
                    assertions: Vec::new(),
                    abort: Some(ScenarioStatus::Aborted),
                };
            }
            if Instant::now() >= deadline {
                let error = format!(
                    "event '{event_name}' did not occur within {}ms",
                    timeout.as_millis()
                );
                return StepOutcome {
                    success: false,
                    error: Some(error),
                    assertions: Vec::new(),
                    abort: self.config.fatal_timeouts.then_some(ScenarioStatus::Failed),
                };
            }

            self.drive_cycle();
            let notify = self.stop.notify.clone();
            tokio::select! {
                () = tokio::time::sleep(self.config.cycle_interval) => {}
                () = notify.notified() => {}
            }
        }
    }

    /// Drives one cycle: advance the generator, publish the data event
    /// through the chaos chain.
    fn drive_cycle(&mut self) {
        self.injector.advance_cycle();
        let data = self.generator.generate_next();
        self.injector.publish(
            Event::new(&self.config.data_event_name)
                .with_payload(data.to_payload())
                .with_source(&self.config.source),
        );
    }
}
