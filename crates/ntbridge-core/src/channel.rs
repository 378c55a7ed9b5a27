//! The one-way command channel to the host.
//!
//! A [`Command`] is an outbound instruction with no guaranteed synchronous
//! response. The host may hand back an immediate reply (an acknowledgement
//! value) but any real result usually arrives later as an event on the
//! [`EventBus`](crate::EventBus).

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{BridgeError, BridgeResult};

// =============================================================================
// Command
// =============================================================================

/// Options attached to a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// The host pushes exactly one unsolicited event in response to this
    /// command class, so the first armed event after send is accepted
    /// without consulting the predicate.
    pub first_event_only: bool,
}

/// An outbound instruction to the host. Immutable once issued.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    payload: Value,
    options: CommandOptions,
}

impl Command {
    /// Creates a command with the given name and payload.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            options: CommandOptions::default(),
        }
    }

    /// Marks the command as answered by the first armed event after send.
    pub fn first_event_only(mut self) -> Self {
        self.options.first_event_only = true;
        self
    }

    /// The command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The opaque payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The command options.
    pub fn options(&self) -> &CommandOptions {
        &self.options
    }
}

// =============================================================================
// CommandChannel trait
// =============================================================================

/// Outbound path to the host transport.
///
/// This is a fire call, not a response channel: `send` returns the host's
/// immediate reply if it produces one, and nothing else.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Sends a command and returns the immediate reply, if any.
    async fn send(&self, command: &Command) -> BridgeResult<Option<Value>>;

    /// Asks the host to start emitting `event` to this process.
    ///
    /// The default is a no-op, correct for hosts that emit every event
    /// unconditionally.
    async fn subscribe(&self, _event: &str) -> BridgeResult<()> {
        Ok(())
    }
}

// =============================================================================
// MpscCommandChannel
// =============================================================================

/// A command queued for the host-facing task.
#[derive(Debug)]
pub enum HostRequest {
    /// Execute a command; the reply sender resolves `send`.
    Command {
        /// The command to execute.
        command: Command,
        /// Sender half for the immediate reply.
        reply: oneshot::Sender<BridgeResult<Option<Value>>>,
    },
    /// Start emitting the named event.
    Subscribe {
        /// Event name.
        event: String,
        /// Sender half for the acknowledgement.
        reply: oneshot::Sender<BridgeResult<()>>,
    },
}

/// [`CommandChannel`] backed by a `tokio::sync::mpsc` queue.
///
/// The receiving half belongs to whatever task talks to the host; it answers
/// each [`HostRequest`] through the bundled one-shot sender.
#[derive(Debug, Clone)]
pub struct MpscCommandChannel {
    tx: mpsc::Sender<HostRequest>,
}

impl MpscCommandChannel {
    /// Creates a channel and the receiver for the host-facing task.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<HostRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CommandChannel for MpscCommandChannel {
    async fn send(&self, command: &Command) -> BridgeResult<Option<Value>> {
        let (reply, rx) = oneshot::channel();
        debug!(command = %command.name(), "Sending command to host");
        trace!(payload = %command.payload(), "Command payload");

        self.tx
            .send(HostRequest::Command {
                command: command.clone(),
                reply,
            })
            .await
            .map_err(|_| BridgeError::NotConnected)?;

        rx.await.map_err(|_| BridgeError::NotConnected)?
    }

    async fn subscribe(&self, event: &str) -> BridgeResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HostRequest::Subscribe {
                event: event.to_string(),
                reply,
            })
            .await
            .map_err(|_| BridgeError::NotConnected)?;

        rx.await.map_err(|_| BridgeError::NotConnected)?
    }
}
