//! Direct-vs-correlated dispatch for a single logical operation.
//!
//! Every bridged operation is authored twice: once against the host's live
//! in-process session (when the process runs embedded and one is available)
//! and once as commands over the [`Correlator`]. [`TransportResolver::call`]
//! is the only place that decides which one runs.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{Instrument, debug, debug_span};

use crate::correlator::Correlator;
use crate::error::BridgeResult;

// =============================================================================
// SessionSlot
// =============================================================================

/// Holder for the borrowed host session handle.
///
/// The handle is owned by the host; this slot only keeps a reference while
/// the host says it is live. Absence is a normal runtime condition.
pub struct SessionSlot<S: ?Sized> {
    session: RwLock<Option<Arc<S>>>,
}

impl<S: ?Sized> SessionSlot<S> {
    /// Creates an empty slot.
    pub fn empty() -> Self {
        Self {
            session: RwLock::new(None),
        }
    }

    /// Creates a slot holding `session`.
    pub fn with(session: Arc<S>) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }

    /// Makes `session` the live handle, returning the one it replaces.
    pub fn attach(&self, session: Arc<S>) -> Option<Arc<S>> {
        self.session.write().replace(session)
    }

    /// Drops the live handle.
    pub fn detach(&self) -> Option<Arc<S>> {
        self.session.write().take()
    }

    /// The live handle, if any.
    pub fn current(&self) -> Option<Arc<S>> {
        self.session.read().clone()
    }

    /// Whether a handle is attached.
    pub fn is_attached(&self) -> bool {
        self.session.read().is_some()
    }
}

impl<S: ?Sized> Default for SessionSlot<S> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<S: ?Sized> fmt::Debug for SessionSlot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

// =============================================================================
// TransportResolver
// =============================================================================

/// The path an operation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPath {
    /// Through the live in-process session.
    Direct,
    /// Through commands and correlated events.
    Correlated,
}

/// Picks between the direct and the correlated implementation of an
/// operation.
pub struct TransportResolver<S: ?Sized> {
    session: Arc<SessionSlot<S>>,
    correlator: Correlator,
}

impl<S: ?Sized> Clone for TransportResolver<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            correlator: self.correlator.clone(),
        }
    }
}

impl<S: ?Sized + Send + Sync> TransportResolver<S> {
    /// Creates a resolver over a shared session slot.
    pub fn new(session: Arc<SessionSlot<S>>, correlator: Correlator) -> Self {
        Self {
            session,
            correlator,
        }
    }

    /// The session slot.
    pub fn session(&self) -> &Arc<SessionSlot<S>> {
        &self.session
    }

    /// The correlator used by the fallback path.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// The path the next call would take.
    pub fn path(&self) -> TransportPath {
        if self.session.is_attached() {
            TransportPath::Direct
        } else {
            TransportPath::Correlated
        }
    }

    /// Runs `operation` through `direct` if a session is attached, otherwise
    /// through `fallback`.
    ///
    /// The direct path gets no timeout layer: the session call is already
    /// awaitable at the host boundary. Failures from either path are returned
    /// verbatim.
    pub async fn call<T, D, DFut, F, FFut>(
        &self,
        operation: &str,
        direct: D,
        fallback: F,
    ) -> BridgeResult<T>
    where
        D: FnOnce(Arc<S>) -> DFut,
        DFut: Future<Output = BridgeResult<T>>,
        F: FnOnce(Correlator) -> FFut,
        FFut: Future<Output = BridgeResult<T>>,
    {
        let span = debug_span!("bridge_call", operation = %operation);

        let result = match self.session.current() {
            Some(session) => {
                debug!(parent: &span, path = ?TransportPath::Direct, "Dispatching operation");
                direct(session).instrument(span.clone()).await
            }
            None => {
                debug!(parent: &span, path = ?TransportPath::Correlated, "Dispatching operation");
                fallback(self.correlator.clone())
                    .instrument(span.clone())
                    .await
            }
        };

        if let Err(e) = &result {
            debug!(parent: &span, error = %e, "Operation failed");
        }
        result
    }
}

impl<S: ?Sized> fmt::Debug for TransportResolver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResolver")
            .field("session", &self.session)
            .field("correlator", &self.correlator)
            .finish()
    }
}
