//! # faultline-core
//!
//! Scenario-testing engine for event-driven systems.
//!
//! This crate provides:
//! - Timing-preserving event recording and replay
//! - Non-blocking chaos injection into a live publish path
//! - Declarative assertions over recorded event history
//! - Deterministic data generation driven by scenario profiles
//! - A scenario engine orchestrating steps into a structured report
//!
//! The publish path is composed by wrapping: the engine's chaos injector
//! wraps its recorder, which wraps the caller's bus. Everything speaks
//! the [`faultline_proto::EventSink`] seam, so any transport whose
//! publish call can be intercepted will do.

mod assertion;
mod chaos;
mod engine;
mod error;
mod generator;
mod recorder;
mod replayer;
mod report;

pub use assertion::{Assertion, AssertionResult, CustomCheck, check_assertions};
pub use chaos::{ChaosInjector, ChaosRule, ChaosStats, Trigger};
pub use engine::{ActionFn, EngineConfig, ScenarioEngine, ScenarioStep, StopHandle};
pub use error::{Error, Result};
pub use generator::{
    DataGenerator, GeneratedData, GeneratorStats, Phase, PhaseBehavior, Profile,
};
pub use recorder::{RecordedEvent, Recorder, RecorderHandle, Recording, RecordingInfo};
pub use replayer::{ReplayOptions, ReplaySummary, Replayer};
pub use report::{ScenarioReport, ScenarioStatus, StepResult};
