//! The publish seam shared by the bus and every wrapper around it.

use crate::Event;

/// Anything that can accept a published event.
///
/// The bus implements this, and so does every interceptor on the publish
/// path (recorder, chaos injector). Interceptors are composed by wrapping:
/// each holds an inner sink and forwards to it, so the publish path is an
/// explicit chain rather than a patched method.
///
/// Publishing is fire-and-forget: implementations must not block the
/// caller on delivery.
pub trait EventSink: Send + Sync {
    /// Publishes an event.
    fn publish(&self, event: Event);
}
