//! In-memory event bus for pub/sub messaging.
//!
//! The bus routes events to subscribers based on name patterns. Optional
//! observers receive all published events before routing, which supports
//! recording and debugging without modifying the routing logic.

use crate::{Event, EventSink, NamePattern};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

/// Type alias for the observer callback function.
type Observer = Box<dyn Fn(&Event) + Send + 'static>;

type Queue = Mutex<VecDeque<Event>>;

struct SubscriberEntry {
    pattern: NamePattern,
    queue: Weak<Queue>,
}

/// A live subscription to the bus.
///
/// Matching events are queued here until drained. Dropping the
/// subscription releases it; the bus prunes dead entries on the next
/// publish.
pub struct Subscription {
    pattern: NamePattern,
    queue: Arc<Queue>,
}

impl Subscription {
    /// Returns the pattern this subscription matches.
    pub fn pattern(&self) -> &NamePattern {
        &self.pattern
    }

    /// Takes all queued events, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        self.queue
            .lock()
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Returns the number of queued events.
    pub fn len(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Checks whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct BusInner {
    subscribers: Vec<SubscriberEntry>,
    observers: Vec<Observer>,
}

/// Central pub/sub hub for routing events between components.
///
/// The bus is the innermost sink on the publish path; the scenario engine
/// composes its interceptors around it.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    /// Creates a new empty event bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to events matching the given pattern.
    pub fn subscribe(&self, pattern: impl Into<NamePattern>) -> Subscription {
        let pattern = pattern.into();
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.push(SubscriberEntry {
                pattern: pattern.clone(),
                queue: Arc::downgrade(&queue),
            });
        }
        Subscription { pattern, queue }
    }

    /// Adds an observer that receives all published events.
    ///
    /// Multiple observers can be added. Each observer is called before
    /// events are routed to subscribers.
    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn(&Event) + Send + 'static,
    {
        if let Ok(mut inner) = self.inner.lock() {
            inner.observers.push(Box::new(observer));
        }
    }

    /// Removes all observers.
    pub fn clear_observers(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.observers.clear();
        }
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .subscribers
                    .iter()
                    .filter(|entry| entry.queue.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }
}

impl EventSink for EventBus {
    /// Publishes an event to all matching subscribers.
    ///
    /// Observers see the event first, then it is cloned into every
    /// matching subscriber queue. Dropped subscriptions are pruned here.
    fn publish(&self, event: Event) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        // Notify observers before routing
        for observer in &inner.observers {
            observer(&event);
        }

        inner.subscribers.retain(|entry| {
            let Some(queue) = entry.queue.upgrade() else {
                return false;
            };
            if entry.pattern.matches(&event.name)
                && let Ok(mut queue) = queue.lock()
            {
                queue.push_back(event.clone());
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_to_subscriber() {
        let bus = EventBus::new();
        let sub = bus.subscribe("task.*");

        bus.publish(Event::new("task.start"));

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "task.start");
        assert!(sub.is_empty());
    }

    #[test]
    fn test_no_match() {
        let bus = EventBus::new();
        let sub = bus.subscribe("task.*");

        bus.publish(Event::new("review.done"));

        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let all = bus.subscribe("*");
        let tasks = bus.subscribe("task.*");

        bus.publish(Event::new("task.start"));
        bus.publish(Event::new("other.event"));

        assert_eq!(all.len(), 2);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_dropped_subscription_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe("*");
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        bus.publish(Event::new("tick"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_observer_receives_all_events() {
        use std::sync::{Arc, Mutex};

        let bus = EventBus::new();
        let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let observed_clone = Arc::clone(&observed);
        bus.add_observer(move |event| {
            observed_clone.lock().unwrap().push(event.name.clone());
        });

        let _sub = bus.subscribe("task.*");

        // Observer should see all events regardless of routing
        bus.publish(Event::new("task.start"));
        bus.publish(Event::new("other.event"));
        bus.publish(Event::new("task.done"));

        let captured = observed.lock().unwrap();
        assert_eq!(*captured, vec!["task.start", "other.event", "task.done"]);
    }

    #[test]
    fn test_clear_observers() {
        use std::sync::{Arc, Mutex};

        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));

        let count_clone = Arc::clone(&count);
        bus.add_observer(move |_| {
            *count_clone.lock().unwrap() += 1;
        });

        bus.publish(Event::new("test"));
        assert_eq!(*count.lock().unwrap(), 1);

        bus.clear_observers();
        bus.publish(Event::new("test"));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_payload_preserved() {
        let bus = EventBus::new();
        let sub = bus.subscribe("PriceFetched");

        bus.publish(
            Event::new("PriceFetched")
                .with_payload(json!({"price": 100.5}))
                .with_source("exchange"),
        );

        let events = sub.drain();
        assert_eq!(events[0].payload["price"], 100.5);
        assert_eq!(events[0].source, "exchange");
    }
}
