//! Delivery seam between the watcher and fan-out
//!
//! The watcher does not know what consumes its events; it pushes them
//! through this trait. Production wires the fan-out queue in; tests use a
//! channel.

use pulse_protocol::Event;

/// Receives events the watcher emits, in emission order
pub trait EventSink: Send + Sync + 'static {
    /// Accept one event; must not block the watcher
    fn deliver(&self, event: Event);
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<Event> {
    fn deliver(&self, event: Event) {
        // Receiver dropped means the consumer is shutting down; the
        // watcher keeps tailing and the events are simply discarded.
        let _ = self.send(event);
    }
}
