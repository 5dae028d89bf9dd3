//! Chaos injection for the publish path.
//!
//! `ChaosInjector` wraps an inner [`EventSink`] and applies a fixed set of
//! rules to every outgoing event: delaying, dropping, or modifying it, or
//! synthesizing an extra failure event. Delays are scheduled on the tokio
//! runtime so the publishing call never blocks or deadlocks; the publisher
//! always sees normal fire-and-forget success.

use faultline_proto::{Event, EventSink, NamePattern};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Predicate governing whether a rule fires for a matching event.
///
/// The rule's name pattern selects candidate events; the trigger then
/// decides per occurrence. Trigger state (the cycle counter, the last
/// event seen) mutates during a run, the rule set itself does not.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Fires on every matching event.
    Always,
    /// Fires only during the given cycle (1-indexed).
    AtCycle(u64),
    /// Fires only when the previous event had this exact name.
    AfterEvent(String),
    /// Fires with the given probability per matching event.
    Probability(f64),
}

impl Trigger {
    fn fires(&self, cycle: u64, last_event: Option<&str>) -> bool {
        match self {
            Trigger::Always => true,
            Trigger::AtCycle(n) => cycle == *n,
            Trigger::AfterEvent(name) => last_event == Some(name.as_str()),
            Trigger::Probability(p) => rand::random::<f64>() < *p,
        }
    }
}

/// A single chaos rule applied to the publish path.
#[derive(Debug, Clone)]
pub enum ChaosRule {
    /// Defers delivery of matching events by `delay`.
    Delay {
        pattern: NamePattern,
        delay: Duration,
        trigger: Trigger,
    },
    /// Suppresses delivery of matching events entirely.
    Drop {
        pattern: NamePattern,
        trigger: Trigger,
    },
    /// Overwrites the value at a dot-separated payload path before
    /// delivery. Unknown paths are a no-op, logged and counted.
    Modify {
        pattern: NamePattern,
        field_path: String,
        new_value: Value,
        trigger: Trigger,
    },
    /// Publishes a synthetic failure event when a matching trigger event
    /// is observed, independent of that event's own delivery.
    InjectFailure {
        trigger_pattern: NamePattern,
        event_name: String,
        payload: Value,
        trigger: Trigger,
    },
}

impl ChaosRule {
    /// Delay rule firing on every matching event.
    pub fn delay(pattern: impl Into<NamePattern>, delay: Duration) -> Self {
        ChaosRule::Delay {
            pattern: pattern.into(),
            delay,
            trigger: Trigger::Always,
        }
    }

    /// Drop rule firing on every matching event.
    pub fn drop(pattern: impl Into<NamePattern>) -> Self {
        ChaosRule::Drop {
            pattern: pattern.into(),
            trigger: Trigger::Always,
        }
    }

    /// Drop rule firing with the given probability.
    pub fn drop_with_probability(pattern: impl Into<NamePattern>, probability: f64) -> Self {
        ChaosRule::Drop {
            pattern: pattern.into(),
            trigger: Trigger::Probability(probability),
        }
    }

    /// Modify rule firing on every matching event.
    pub fn modify(
        pattern: impl Into<NamePattern>,
        field_path: impl Into<String>,
        new_value: Value,
    ) -> Self {
        ChaosRule::Modify {
            pattern: pattern.into(),
            field_path: field_path.into(),
            new_value,
            trigger: Trigger::Always,
        }
    }

    /// Failure-injection rule firing on every matching trigger event.
    pub fn inject_failure(
        trigger_pattern: impl Into<NamePattern>,
        event_name: impl Into<String>,
        payload: Value,
    ) -> Self {
        ChaosRule::InjectFailure {
            trigger_pattern: trigger_pattern.into(),
            event_name: event_name.into(),
            payload,
            trigger: Trigger::Always,
        }
    }

    /// Replaces the rule's trigger.
    pub fn with_trigger(mut self, new_trigger: Trigger) -> Self {
        match &mut self {
            ChaosRule::Delay { trigger, .. }
            | ChaosRule::Drop { trigger, .. }
            | ChaosRule::Modify { trigger, .. }
            | ChaosRule::InjectFailure { trigger, .. } => *trigger = new_trigger,
        }
        self
    }
}

/// Counters describing what the injector did to the event stream.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ChaosStats {
    /// Events that entered the injector.
    pub events_seen: u64,
    /// Events whose delivery was deferred.
    pub events_delayed: u64,
    /// Events suppressed entirely.
    pub events_dropped: u64,
    /// Events whose payload was rewritten.
    pub events_modified: u64,
    /// Modify rules that fired against a missing field path (no-ops).
    pub modify_misses: u64,
    /// Synthetic failure events published.
    pub failures_injected: u64,
    /// Cumulative injected delay, in milliseconds.
    pub total_delay_ms: u64,
}

struct InjectorState {
    cycle: u64,
    last_event: Option<String>,
    stats: ChaosStats,
}

/// Injects chaos into an [`EventSink`] by wrapper composition.
///
/// Rules are evaluated in registration order and multiple matches all
/// apply to the same event. Delayed deliveries run as spawned tokio
/// tasks, so publishing requires an ambient runtime but never blocks
/// on it.
pub struct ChaosInjector {
    inner: Arc<dyn EventSink>,
    rules: Mutex<Vec<ChaosRule>>,
    state: Mutex<InjectorState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChaosInjector {
    /// Creates an injector with no rules wrapping the given sink.
    pub fn new(inner: Arc<dyn EventSink>) -> Self {
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
            state: Mutex::new(InjectorState {
                cycle: 0,
                last_event: None,
                stats: ChaosStats::default(),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Registers a rule. Rules run in registration order.
    pub fn add_rule(&self, rule: ChaosRule) {
        debug!(?rule, "chaos rule added");
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(rule);
        }
    }

    /// Returns the number of registered rules.
    pub fn rule_count(&self) -> usize {
        self.rules.lock().map(|rules| rules.len()).unwrap_or(0)
    }

    /// Advances the cycle counter and returns the new cycle (1-indexed).
    ///
    /// The scenario engine calls this once per cycle; `AtCycle` triggers
    /// compare against it.
    pub fn advance_cycle(&self) -> u64 {
        self.state
            .lock()
            .map(|mut state| {
                state.cycle += 1;
                state.cycle
            })
            .unwrap_or(0)
    }

    /// Returns the current cycle.
    pub fn cycle(&self) -> u64 {
        self.state.lock().map(|state| state.cycle).unwrap_or(0)
    }

    /// Returns a copy of the injection statistics.
    pub fn report(&self) -> ChaosStats {
        self.state
            .lock()
            .map(|state| state.stats.clone())
            .unwrap_or_default()
    }

    /// Aborts all pending delayed deliveries and returns how many were
    /// cancelled. Used when a scenario stops, so no scheduled work
    /// outlives the run.
    pub fn cancel_pending(&self) -> usize {
        let Ok(mut tasks) = self.tasks.lock() else {
            return 0;
        };
        let mut cancelled = 0;
        for task in tasks.drain(..) {
            if !task.is_finished() {
                task.abort();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Waits for all pending delayed deliveries to land.
    ///
    /// Used when a scenario completes normally, so deferred events are
    /// delivered and recorded rather than silently discarded.
    pub async fn flush_pending(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .map(|mut tasks| tasks.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Drops handles for delayed deliveries that already ran.
    fn reap_finished(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|task| !task.is_finished());
        }
    }
}

impl EventSink for ChaosInjector {
    fn publish(&self, mut event: Event) {
        let mut dropped = false;
        let mut delay = Duration::ZERO;
        let mut injections: Vec<Event> = Vec::new();

        {
            let Ok(rules) = self.rules.lock() else {
                return;
            };
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.stats.events_seen += 1;
            let cycle = state.cycle;
            let last_event = state.last_event.clone();

            for rule in rules.iter() {
                match rule {
                    ChaosRule::Delay {
                        pattern,
                        delay: rule_delay,
                        trigger,
                    } if pattern.matches(&event.name)
                        && trigger.fires(cycle, last_event.as_deref()) =>
                    {
                        debug!(event = %event.name, ?rule_delay, "chaos delay");
                        delay += *rule_delay;
                        state.stats.events_delayed += 1;
                        state.stats.total_delay_ms += rule_delay.as_millis() as u64;
                    }
                    ChaosRule::Drop { pattern, trigger }
                        if pattern.matches(&event.name)
                            && trigger.fires(cycle, last_event.as_deref()) =>
                    {
                        debug!(event = %event.name, "chaos drop");
                        dropped = true;
                        state.stats.events_dropped += 1;
                    }
                    ChaosRule::Modify {
                        pattern,
                        field_path,
                        new_value,
                        trigger,
                    } if pattern.matches(&event.name)
                        && trigger.fires(cycle, last_event.as_deref()) =>
                    {
                        if set_field(&mut event.payload, field_path, new_value.clone()) {
                            debug!(event = %event.name, path = %field_path, "chaos modify");
                            state.stats.events_modified += 1;
                        } else {
                            // Unknown path policy: no-op, delivery proceeds unmodified.
                            warn!(event = %event.name, path = %field_path, "modify path not found");
                            state.stats.modify_misses += 1;
                        }
                    }
                    ChaosRule::InjectFailure {
                        trigger_pattern,
                        event_name,
                        payload,
                        trigger,
                    } if trigger_pattern.matches(&event.name)
                        && trigger.fires(cycle, last_event.as_deref()) =>
                    {
                        debug!(trigger_event = %event.name, injected = %event_name, "chaos failure injection");
                        injections.push(
                            Event::new(event_name)
                                .with_payload(payload.clone())
                                .with_source("ChaosInjector"),
                        );
                        state.stats.failures_injected += 1;
                    }
                    _ => {}
                }
            }

            state.last_event = Some(event.name.clone());
        }

        // Synthetic failures are independent of the triggering event's
        // own delivery: they publish even when that event is dropped.
        for injection in injections {
            self.inner.publish(injection);
        }

        if dropped {
            return;
        }

        if delay.is_zero() {
            self.inner.publish(event);
        } else {
            self.reap_finished();
            let inner = Arc::clone(&self.inner);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.publish(event);
            });
            if let Ok(mut tasks) = self.tasks.lock() {
                tasks.push(handle);
            }
        }
    }
}

/// Sets the value at a dot-separated path inside a JSON payload.
///
/// Every intermediate segment must already exist and be an object; the
/// final segment must name an existing field. Returns false when the
/// path cannot be resolved.
fn set_field(payload: &mut Value, path: &str, new_value: Value) -> bool {
    let mut current = payload;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let Some(object) = current.as_object_mut() else {
            return false;
        };
        let Some(slot) = object.get_mut(part) else {
            return false;
        };
        if parts.peek().is_none() {
            *slot = new_value;
            return true;
        }
        current = slot;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_proto::EventBus;
    use serde_json::json;

    fn injector() -> (ChaosInjector, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let chaos = ChaosInjector::new(bus.clone() as Arc<dyn EventSink>);
        (chaos, bus)
    }

    #[test]
    fn test_passthrough_without_rules() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");

        chaos.publish(Event::new("plain"));

        assert_eq!(sub.len(), 1);
        let stats = chaos.report();
        assert_eq!(stats.events_seen, 1);
        assert_eq!(stats.events_dropped, 0);
    }

    #[test]
    fn test_drop_suppresses_delivery() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::drop("PriceFetched"));

        chaos.publish(Event::new("PriceFetched"));
        chaos.publish(Event::new("OrderPlaced"));

        let names: Vec<String> = sub.drain().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["OrderPlaced"]);
        assert_eq!(chaos.report().events_dropped, 1);
    }

    #[test]
    fn test_drop_probability_one_drops_everything() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::drop_with_probability("X", 1.0));

        for _ in 0..50 {
            chaos.publish(Event::new("X"));
        }

        assert!(sub.is_empty());
        assert_eq!(chaos.report().events_dropped, 50);
    }

    #[test]
    fn test_drop_probability_zero_drops_nothing() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::drop_with_probability("X", 0.0));

        for _ in 0..50 {
            chaos.publish(Event::new("X"));
        }

        assert_eq!(sub.len(), 50);
        assert_eq!(chaos.report().events_dropped, 0);
    }

    #[test]
    fn test_modify_rewrites_field() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::modify("PriceFetched", "price.value", json!(0.0)));

        chaos.publish(
            Event::new("PriceFetched").with_payload(json!({"price": {"value": 100.0}})),
        );

        let events = sub.drain();
        assert_eq!(events[0].payload["price"]["value"], 0.0);
        assert_eq!(chaos.report().events_modified, 1);
    }

    #[test]
    fn test_modify_unknown_path_is_noop() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::modify("PriceFetched", "price.missing", json!(0)));

        let payload = json!({"price": {"value": 100.0}});
        chaos.publish(Event::new("PriceFetched").with_payload(payload.clone()));

        // Delivery proceeds with the payload unmodified.
        let events = sub.drain();
        assert_eq!(events[0].payload, payload);
        let stats = chaos.report();
        assert_eq!(stats.events_modified, 0);
        assert_eq!(stats.modify_misses, 1);
    }

    #[test]
    fn test_inject_failure_publishes_synthetic_event() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::inject_failure(
            "OrderPlaced",
            "OrderFailed",
            json!({"error": "injected"}),
        ));

        chaos.publish(Event::new("OrderPlaced"));

        let names: Vec<String> = sub.drain().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["OrderFailed", "OrderPlaced"]);
        assert_eq!(chaos.report().failures_injected, 1);
    }

    #[test]
    fn test_inject_failure_independent_of_dropped_trigger() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::inject_failure("Order*", "OrderFailed", json!(null)));
        chaos.add_rule(ChaosRule::drop("OrderPlaced"));

        chaos.publish(Event::new("OrderPlaced"));

        // The trigger event is dropped; the synthetic failure still lands.
        let names: Vec<String> = sub.drain().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["OrderFailed"]);
    }

    #[test]
    fn test_multiple_matching_rules_all_apply() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::modify("Tick", "n", json!(99)));
        chaos.add_rule(ChaosRule::drop("Tick"));

        chaos.publish(Event::new("Tick").with_payload(json!({"n": 1})));

        assert!(sub.is_empty());
        let stats = chaos.report();
        assert_eq!(stats.events_modified, 1);
        assert_eq!(stats.events_dropped, 1);
    }

    #[test]
    fn test_at_cycle_trigger() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::drop("Tick").with_trigger(Trigger::AtCycle(2)));

        for _ in 0..3 {
            chaos.advance_cycle();
            chaos.publish(Event::new("Tick"));
        }

        // Only the event published during cycle 2 is dropped.
        assert_eq!(sub.len(), 2);
        assert_eq!(chaos.report().events_dropped, 1);
        assert_eq!(chaos.cycle(), 3);
    }

    #[test]
    fn test_after_event_trigger() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(
            ChaosRule::drop("Commit").with_trigger(Trigger::AfterEvent("Prepare".to_string())),
        );

        chaos.publish(Event::new("Commit"));
        chaos.publish(Event::new("Prepare"));
        chaos.publish(Event::new("Commit"));

        let names: Vec<String> = sub.drain().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Commit", "Prepare"]);
    }

    #[tokio::test]
    async fn test_delay_defers_without_blocking() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::delay("Slow", Duration::from_millis(50)));

        let before = std::time::Instant::now();
        chaos.publish(Event::new("Slow"));
        chaos.publish(Event::new("Fast"));
        // The publishing calls return immediately.
        assert!(before.elapsed() < Duration::from_millis(20));

        // The undelayed event is already delivered, the delayed one not yet.
        let names: Vec<String> = sub.drain().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Fast"]);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let names: Vec<String> = sub.drain().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Slow"]);

        let stats = chaos.report();
        assert_eq!(stats.events_delayed, 1);
        assert_eq!(stats.total_delay_ms, 50);
    }

    #[tokio::test]
    async fn test_cancel_pending_aborts_delayed_delivery() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::delay("Slow", Duration::from_secs(60)));

        chaos.publish(Event::new("Slow"));
        let cancelled = chaos.cancel_pending();

        assert_eq!(cancelled, 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sub.is_empty());
    }

    #[tokio::test]
    async fn test_flush_pending_delivers_delayed_events() {
        let (chaos, bus) = injector();
        let sub = bus.subscribe("*");
        chaos.add_rule(ChaosRule::delay("Slow", Duration::from_millis(30)));

        chaos.publish(Event::new("Slow"));
        chaos.flush_pending().await;

        let names: Vec<String> = sub.drain().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Slow"]);
    }

    #[test]
    fn test_set_field_nested() {
        let mut payload = json!({"a": {"b": {"c": 1}}});
        assert!(set_field(&mut payload, "a.b.c", json!(2)));
        assert_eq!(payload["a"]["b"]["c"], 2);

        assert!(!set_field(&mut payload, "a.x.c", json!(3)));
        assert!(!set_field(&mut payload, "a.b.c.d", json!(3)));
    }
}
