//! Turns "send a command, wait for a matching later event" into one awaitable
//! call with timeout and cancellation.
//!
//! # Flow
//!
//! 1. Arm the expected event name on the [`EventBus`] (and ask the host to
//!    emit it, awaited when `require_arm_before_send` is set). A failed host
//!    subscription is retried by the next arm.
//! 2. Register a waiter with the caller's matcher *before* sending, so an
//!    event the host emits while `send` is still in flight is not lost.
//! 3. Send the command; its immediate reply is made visible to the matcher.
//! 4. Wait for a matching event.
//!
//! The deadline and the cancellation token race every step, so a host that
//! never acknowledges a send still yields a timeout on schedule.
//!
//! Exactly one terminal outcome is produced. A waiter that times out or is
//! cancelled is withdrawn from the bus before the error is returned, so no
//! later event is ever matched against it.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{EventBus, Matcher};
use crate::channel::{Command, CommandChannel};
use crate::error::{BridgeError, BridgeResult, ensure_success};

/// Engine default correlation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

// =============================================================================
// Expectation & options
// =============================================================================

/// The event a correlated command waits for.
#[derive(Debug, Clone)]
pub struct Expect {
    event: String,
    matcher: Matcher,
}

impl Expect {
    /// Accepts the first `event` emitted after send.
    pub fn first(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            matcher: Matcher::First,
        }
    }

    /// Accepts the first `event` whose payload satisfies `predicate`.
    pub fn matching<F>(event: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            event: event.into(),
            matcher: Matcher::payload(predicate),
        }
    }

    /// Like [`matching`](Self::matching) but the predicate also receives the
    /// command's immediate reply.
    pub fn matching_reply<F>(event: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self {
            event: event.into(),
            matcher: Matcher::with_reply(predicate),
        }
    }

    /// The event name.
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Per-call correlation options.
#[derive(Debug, Clone, Default)]
pub struct CorrelateOptions {
    /// Overrides the engine default timeout.
    pub timeout: Option<Duration>,
    /// Await the host subscription before the command is sent.
    pub require_arm_before_send: bool,
    /// Aborts the correlation with [`BridgeError::Cancelled`].
    pub cancel: Option<CancellationToken>,
}

impl CorrelateOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Requires the host subscription to complete before send.
    pub fn arm_before_send(mut self) -> Self {
        self.require_arm_before_send = true;
        self
    }

    /// Attaches a cancellation token.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

// =============================================================================
// Correlator
// =============================================================================

/// Host-side subscription state of an event name.
///
/// Tracked apart from the bus arm set: a name stays armed for delivery even
/// when asking the host to emit it failed, and the next arm retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subscription {
    Pending,
    Active,
}

/// Why a phase of a correlation stopped early.
enum Interrupt {
    Cancelled,
    Expired,
}

/// Resolves once the token fires or the deadline passes, whichever is first.
async fn interrupted(cancel: &CancellationToken, deadline: Instant) -> Interrupt {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Interrupt::Cancelled,
        () = sleep_until(deadline) => Interrupt::Expired,
    }
}

/// Issues commands and resolves them against later host events.
///
/// Cheap to clone; clones share the bus, the channel and the host
/// subscriptions.
#[derive(Clone)]
pub struct Correlator {
    bus: Arc<EventBus>,
    channel: Arc<dyn CommandChannel>,
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
    default_timeout: Duration,
}

impl Correlator {
    /// Creates a correlator with the engine default timeout.
    pub fn new(bus: Arc<EventBus>, channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            bus,
            channel,
            subscriptions: Arc::default(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replaces the default timeout used when a call does not override it.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The default timeout.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The bus this correlator waits on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Whether the host confirmed it emits `event`.
    pub fn is_subscribed(&self, event: &str) -> bool {
        self.subscriptions.lock().get(event) == Some(&Subscription::Active)
    }

    /// Sends a command without waiting for any event.
    ///
    /// Resolves with the host's immediate reply, or `null` when there is none.
    /// The host acknowledgement is still bounded by the default timeout.
    pub async fn send(&self, command: Command) -> BridgeResult<Value> {
        self.correlate(command, None, CorrelateOptions::default())
            .await
    }

    /// Sends `command` and waits for the event described by `expect`.
    ///
    /// With no expectation the call resolves right after send. A command
    /// marked [`first_event_only`](Command::first_event_only) accepts the
    /// first armed event without consulting the predicate.
    ///
    /// The deadline and the cancellation token cover the whole call: arming,
    /// the host acknowledgement of the send, and the wait for the event. A
    /// token that is already cancelled stops the call before anything reaches
    /// the host.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Transport`] if the immediate reply carries a non-zero
    ///   status.
    /// - [`BridgeError::Timeout`] if nothing answered within the window.
    /// - [`BridgeError::Cancelled`] if the token fired first.
    /// - Any failure from the command channel, verbatim.
    pub async fn correlate(
        &self,
        command: Command,
        expect: Option<Expect>,
        options: CorrelateOptions,
    ) -> BridgeResult<Value> {
        let window = options.timeout.unwrap_or(self.default_timeout);
        let deadline = Instant::now() + window;
        let cancel = options.cancel.unwrap_or_default();

        let Some(expect) = expect else {
            if cancel.is_cancelled() {
                return Err(self.interrupt(Interrupt::Cancelled, &command, command.name(), window));
            }
            let reply = tokio::select! {
                biased;
                reply = self.channel.send(&command) => reply?,
                why = interrupted(&cancel, deadline) => {
                    return Err(self.interrupt(why, &command, command.name(), window));
                }
            };
            if let Some(reply) = &reply {
                ensure_success(reply)?;
            }
            return Ok(reply.unwrap_or(Value::Null));
        };

        let event = expect.event;
        if cancel.is_cancelled() {
            return Err(self.interrupt(Interrupt::Cancelled, &command, &event, window));
        }
        let matcher = if command.options().first_event_only {
            Matcher::First
        } else {
            expect.matcher
        };

        tokio::select! {
            biased;
            armed = self.arm(&event, options.require_arm_before_send) => armed?,
            why = interrupted(&cancel, deadline) => {
                return Err(self.interrupt(why, &command, &event, window));
            }
        }

        let reply_slot = Arc::new(OnceLock::new());
        let mut registration = self.bus.register(&event, matcher, Arc::clone(&reply_slot));

        debug!(
            command = %command.name(),
            event = %event,
            timeout_ms = window.as_millis() as u64,
            "Correlating command"
        );

        let reply = tokio::select! {
            biased;
            reply = self.channel.send(&command) => reply?,
            why = interrupted(&cancel, deadline) => {
                if let Some(payload) = registration.withdraw() {
                    return Ok(payload);
                }
                return Err(self.interrupt(why, &command, &event, window));
            }
        };
        if let Some(reply) = reply {
            ensure_success(&reply)?;
            let _ = reply_slot.set(reply);
        }

        tokio::select! {
            biased;

            payload = registration.recv() => {
                let payload = payload.ok_or(BridgeError::NotConnected)?;
                debug!(command = %command.name(), event = %event, "Correlation resolved");
                Ok(payload)
            }

            why = interrupted(&cancel, deadline) => {
                if let Some(payload) = registration.withdraw() {
                    return Ok(payload);
                }
                Err(self.interrupt(why, &command, &event, window))
            }
        }
    }

    fn interrupt(
        &self,
        why: Interrupt,
        command: &Command,
        event: &str,
        window: Duration,
    ) -> BridgeError {
        match why {
            Interrupt::Cancelled => {
                debug!(command = %command.name(), event = %event, "Correlation cancelled");
                BridgeError::Cancelled
            }
            Interrupt::Expired => {
                warn!(command = %command.name(), event = %event, "Correlation timed out");
                BridgeError::Timeout {
                    event: event.to_string(),
                    after: window,
                }
            }
        }
    }

    /// Arms `event` on the bus and asks the host to emit it.
    ///
    /// The bus arm is never rolled back here; another correlation may rely on
    /// it. Only the host subscription is retried after a failure.
    async fn arm(&self, event: &str, require_before_send: bool) -> BridgeResult<()> {
        self.bus.arm(event);

        if require_before_send {
            if self.is_subscribed(event) {
                return Ok(());
            }
            self.channel.subscribe(event).await?;
            self.subscriptions
                .lock()
                .insert(event.to_string(), Subscription::Active);
            return Ok(());
        }

        {
            let mut subscriptions = self.subscriptions.lock();
            if subscriptions.contains_key(event) {
                return Ok(());
            }
            subscriptions.insert(event.to_string(), Subscription::Pending);
        }

        let channel = Arc::clone(&self.channel);
        let subscriptions = Arc::clone(&self.subscriptions);
        let event = event.to_string();
        tokio::spawn(async move {
            let result = channel.subscribe(&event).await;
            let mut subscriptions = subscriptions.lock();
            match result {
                Ok(()) => {
                    subscriptions.insert(event, Subscription::Active);
                }
                Err(e) => {
                    warn!(event = %event, error = %e, "Host subscription failed");
                    if subscriptions.get(&event) == Some(&Subscription::Pending) {
                        subscriptions.remove(&event);
                    }
                }
            }
        });

        Ok(())
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("bus", &self.bus)
            .field("subscriptions", &self.subscriptions.lock().len())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}
