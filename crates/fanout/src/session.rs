//! Client session management
//!
//! Each connected stream client is a [`ClientSession`]: a unique ID for
//! diagnostics, a bounded channel toward its socket task, and the
//! per-client watermark for the cross-batch ordering check. Sessions
//! expose nothing to the sender beyond "send bytes, may fail"; a failed
//! send evicts the session and never affects the others.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use pulse_protocol::EventId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Counter for unique session IDs
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Frames buffered per session before a send counts as failed
///
/// This channel is the per-client buffer limit the concurrency contract
/// refers to: a stuck socket fills it, the next `try_send` fails, and the
/// session is evicted.
pub const SESSION_CHANNEL_CAPACITY: usize = 1024;

/// Session count above which new registrations are warned about
const SESSION_WARN_THRESHOLD: usize = 100;

/// One connected stream client
#[derive(Debug)]
pub struct ClientSession {
    id: u64,
    sender: mpsc::Sender<String>,
    /// Last ID of the previous batch delivered to this client
    last_batch_last_id: Mutex<Option<EventId>>,
}

impl ClientSession {
    fn new(sender: mpsc::Sender<String>) -> Self {
        Self {
            id: SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            sender,
            last_batch_last_id: Mutex::new(None),
        }
    }

    /// Unique session identifier, for diagnostics
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the socket task is still draining this session
    #[inline]
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Deliver one serialized batch frame
    ///
    /// `first_id`/`last_id` are the batch's bracketing canonical IDs;
    /// `watermark_reset` is set when the batch contains an event without
    /// an ID (a rotation reset marker), which legitimately restarts the
    /// offset sequence.
    ///
    /// Returns false when the send failed and the session must go.
    fn deliver(
        &self,
        frame: &str,
        first_id: Option<&EventId>,
        last_id: Option<&EventId>,
        watermark_reset: bool,
    ) -> bool {
        {
            let mut last = self.last_batch_last_id.lock();
            if !watermark_reset {
                if let (Some(prev), Some(first)) = (last.as_ref(), first_id) {
                    if let (Some(prev_offset), Some(first_offset)) = (prev.offset(), first.offset())
                    {
                        debug_assert!(
                            first_offset > prev_offset,
                            "cross-batch ordering violated for session {}: {} !> {}",
                            self.id,
                            first_offset,
                            prev_offset
                        );
                    }
                }
            }
            match (watermark_reset, last_id) {
                (true, id) => *last = id.cloned(),
                (false, Some(id)) => *last = Some(id.clone()),
                (false, None) => {}
            }
        }

        self.sender.try_send(frame.to_string()).is_ok()
    }
}

/// Registry of all live sessions
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<Vec<Arc<ClientSession>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client
    ///
    /// Returns the session handle and the receiver its socket task drains.
    /// Concurrent sessions are expected; past the advisory threshold the
    /// registration is logged loudly but still permitted.
    pub fn register(&self) -> (Arc<ClientSession>, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let session = Arc::new(ClientSession::new(sender));

        let mut sessions = self.sessions.write();
        sessions.push(Arc::clone(&session));
        if sessions.len() > SESSION_WARN_THRESHOLD {
            warn!(
                count = sessions.len(),
                "unusually many concurrent stream sessions"
            );
        }
        debug!(session_id = session.id(), "stream session registered");

        (session, receiver)
    }

    /// Remove a session by ID (disconnect path)
    pub fn unregister(&self, id: u64) {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|s| s.id() != id);
        if sessions.len() < before {
            debug!(session_id = id, "stream session unregistered");
        }
    }

    /// Number of live sessions
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Deliver a frame to every session, evicting the ones whose send
    /// failed
    ///
    /// Sessions are iterated sequentially, which is what keeps per-client
    /// frame order: two frames for the same client are never in flight at
    /// once.
    ///
    /// Returns the number of sessions evicted.
    pub fn broadcast(
        &self,
        frame: &str,
        first_id: Option<&EventId>,
        last_id: Option<&EventId>,
        watermark_reset: bool,
    ) -> usize {
        let failed: Vec<u64> = {
            let sessions = self.sessions.read();
            sessions
                .iter()
                .filter(|s| !s.deliver(frame, first_id, last_id, watermark_reset))
                .map(|s| s.id())
                .collect()
        };

        if !failed.is_empty() {
            let mut sessions = self.sessions.write();
            sessions.retain(|s| !failed.contains(&s.id()));
            for id in &failed {
                warn!(session_id = id, "evicting session after send failure");
            }
        }

        failed.len()
    }

    /// Drop sessions whose socket task is gone
    pub fn cleanup_disconnected(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|s| s.is_connected());
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "cleaned up disconnected sessions");
        }
        removed
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
