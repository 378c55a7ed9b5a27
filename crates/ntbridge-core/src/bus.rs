//! Process-wide event multiplexer.
//!
//! The host-facing listener layer pushes every event it receives through
//! [`EventBus::emit`]. The bus keeps a pending table keyed by event name; each
//! entry holds a matcher and a one-shot completion handle. A payload is only
//! referenced while a waiter for its name exists, nothing is buffered.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{trace, warn};

// =============================================================================
// HostEvent
// =============================================================================

/// An inbound notification emitted by the host.
///
/// A name alone never identifies the command an event answers; many events
/// of the same name arrive for unrelated reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    /// Event name, e.g. `nodeIKernelGroupListener/onGroupAllInfoChange`.
    pub name: String,
    /// Opaque payload.
    #[serde(default)]
    pub payload: Value,
}

// =============================================================================
// Matcher
// =============================================================================

/// Predicate over an event payload and the immediate reply of the command
/// being correlated (absent until the reply is known).
pub type Predicate = Arc<dyn Fn(&Value, Option<&Value>) -> bool + Send + Sync>;

/// How a waiter decides whether an event is the one it waits for.
#[derive(Clone)]
pub enum Matcher {
    /// Accept the first event of the armed name.
    First,
    /// Accept the first event the predicate returns `true` for.
    Predicate(Predicate),
}

impl Matcher {
    /// Builds a matcher from a payload-only predicate.
    pub fn payload<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(move |payload, _| f(payload)))
    }

    /// Builds a matcher that also sees the command's immediate reply.
    pub fn with_reply<F>(f: F) -> Self
    where
        F: Fn(&Value, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    fn matches(&self, payload: &Value, reply: Option<&Value>) -> bool {
        match self {
            Self::First => true,
            Self::Predicate(f) => f(payload, reply),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("First"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

// =============================================================================
// EventBus
// =============================================================================

struct Waiter {
    id: u64,
    matcher: Matcher,
    reply: Arc<OnceLock<Value>>,
    tx: oneshot::Sender<Value>,
}

#[derive(Default)]
struct BusState {
    armed: HashSet<String>,
    waiters: HashMap<String, Vec<Waiter>>,
}

/// Delivers named host events to the correlations waiting on them.
///
/// `emit` evaluates waiters in registration order under a single lock, so
/// each waiter sees events in the order the host emitted them, and a waiter
/// that consumes an event is gone before the next event is evaluated.
#[derive(Default)]
pub struct EventBus {
    state: Mutex<BusState>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `event` as a name the bus delivers to waiters.
    ///
    /// Idempotent; returns `true` only when the name was not armed before.
    pub fn arm(&self, event: &str) -> bool {
        let newly = self.state.lock().armed.insert(event.to_string());
        if newly {
            trace!(event = %event, "Armed event");
        }
        newly
    }

    /// Stops delivering `event`.
    ///
    /// Refused (returns `false`) while correlations are still waiting on it.
    pub fn disarm(&self, event: &str) -> bool {
        let mut state = self.state.lock();
        if state.waiters.get(event).is_some_and(|w| !w.is_empty()) {
            return false;
        }
        state.armed.remove(event)
    }

    /// Whether `event` is currently armed.
    pub fn is_armed(&self, event: &str) -> bool {
        self.state.lock().armed.contains(event)
    }

    /// Number of correlations waiting on `event`.
    pub fn pending_count(&self, event: &str) -> usize {
        self.state.lock().waiters.get(event).map_or(0, Vec::len)
    }

    /// Registers a waiter on `event`.
    ///
    /// The returned [`Registration`] removes the waiter when dropped, so a
    /// caller that gives up never leaves a dead entry behind.
    pub fn register(
        &self,
        event: &str,
        matcher: Matcher,
        reply: Arc<OnceLock<Value>>,
    ) -> Registration<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.state
            .lock()
            .waiters
            .entry(event.to_string())
            .or_default()
            .push(Waiter {
                id,
                matcher,
                reply,
                tx,
            });

        Registration {
            bus: self,
            event: event.to_string(),
            id,
            rx,
        }
    }

    /// Delivers a host event to every waiter armed for its name.
    ///
    /// Returns the number of waiters that consumed the payload. Events for
    /// names that are not armed are dropped. A predicate that panics removes
    /// only its own waiter; siblings keep waiting.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        let mut state = self.state.lock();
        if !state.armed.contains(event) {
            trace!(event = %event, "Dropped event for unarmed name");
            return 0;
        }
        let Some(waiters) = state.waiters.get_mut(event) else {
            return 0;
        };

        let mut delivered = 0;
        let mut remaining = Vec::with_capacity(waiters.len());
        for waiter in std::mem::take(waiters) {
            let matched = panic::catch_unwind(AssertUnwindSafe(|| {
                waiter.matcher.matches(&payload, waiter.reply.get())
            }));
            match matched {
                Ok(true) => {
                    trace!(event = %event, waiter = waiter.id, "Event matched waiter");
                    if waiter.tx.send(payload.clone()).is_ok() {
                        delivered += 1;
                    }
                }
                Ok(false) => remaining.push(waiter),
                // Only the offending waiter is dropped; its caller sees the
                // closed handle.
                Err(_) => {
                    warn!(
                        event = %event,
                        waiter = waiter.id,
                        "Predicate panicked, dropping waiter"
                    );
                }
            }
        }
        *waiters = remaining;
        if waiters.is_empty() {
            state.waiters.remove(event);
        }

        delivered
    }

    /// Convenience for [`emit`](Self::emit) with a parsed [`HostEvent`].
    pub fn emit_event(&self, event: HostEvent) -> usize {
        self.emit(&event.name, event.payload)
    }

    /// Removes a waiter; returns `true` if it had not been resolved yet.
    fn remove(&self, event: &str, id: u64) -> bool {
        let mut state = self.state.lock();
        let Some(waiters) = state.waiters.get_mut(event) else {
            return false;
        };
        let before = waiters.len();
        waiters.retain(|w| w.id != id);
        let removed = waiters.len() != before;
        if waiters.is_empty() {
            state.waiters.remove(event);
        }
        removed
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventBus")
            .field("armed", &state.armed.len())
            .field("waiting", &state.waiters.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

// =============================================================================
// Registration
// =============================================================================

/// A waiter's handle on the bus.
pub struct Registration<'a> {
    bus: &'a EventBus,
    event: String,
    id: u64,
    rx: oneshot::Receiver<Value>,
}

impl Registration<'_> {
    /// The event name this registration waits on.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Waits for the matching payload.
    ///
    /// Resolves to `None` only if the waiter was dropped from the bus without
    /// being resolved.
    pub async fn recv(&mut self) -> Option<Value> {
        (&mut self.rx).await.ok()
    }

    /// Withdraws the waiter.
    ///
    /// If the bus already resolved it, the claimed payload is returned so the
    /// event is not lost; otherwise `None`, and later events are never
    /// evaluated against it.
    pub fn withdraw(&mut self) -> Option<Value> {
        if self.bus.remove(&self.event, self.id) {
            None
        } else {
            self.rx.try_recv().ok()
        }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.bus.remove(&self.event, self.id);
    }
}
