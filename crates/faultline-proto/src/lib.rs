//! # faultline-proto
//!
//! Shared types and the publish seam for the faultline scenario engine.
//!
//! This crate provides the foundational abstractions used across all
//! faultline crates, including:
//! - The [`Event`] type flowing through the publish path
//! - The [`EventSink`] trait every publish-path component implements
//! - [`NamePattern`] matching for subscriptions and chaos rules
//! - A reference in-memory [`EventBus`] with subscriber queues and observers

mod event;
mod event_bus;
mod pattern;
mod sink;

pub use event::Event;
pub use event_bus::{EventBus, Subscription};
pub use pattern::NamePattern;
pub use sink::EventSink;
