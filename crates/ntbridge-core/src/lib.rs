//! # ntbridge Core
//!
//! The command/event correlation engine behind ntbridge.
//!
//! The host application this crate bridges to has no request/response
//! surface: commands go out one way and results come back, some time later,
//! as named events that are not tied to any particular command. This crate
//! turns that into ordinary awaitable calls.
//!
//! ## Components
//!
//! - **Event Bus** ([`EventBus`]): multiplexes host events to the
//!   correlations waiting on them.
//! - **Command Channel** ([`CommandChannel`]): one-way send of a [`Command`]
//!   to the host.
//! - **Correlator** ([`Correlator`]): send, arm, and wait for the event whose
//!   payload satisfies a predicate, with timeout and cancellation.
//! - **Transport Resolver** ([`TransportResolver`]): runs an operation through
//!   the live session handle when one is attached, otherwise through the
//!   correlator.
//!
//! ```text
//! caller ──▶ TransportResolver ──▶ direct session call
//!                    │
//!                    └──────────▶ CommandChannel ──▶ host
//!                                                     │
//!            Correlator ◀── EventBus ◀── emit ◀───────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ntbridge_core::{Command, CorrelateOptions, Correlator, EventBus, Expect};
//! use serde_json::json;
//!
//! let correlator = Correlator::new(bus, channel);
//! let info = correlator
//!     .correlate(
//!         Command::new("nodeIKernelGroupService/getGroupAllInfo", json!([{ "groupCode": "1" }])),
//!         Some(Expect::matching("nodeIKernelGroupListener/onGroupAllInfoChange", |p| {
//!             p["groupAll"]["groupCode"] == "1"
//!         })),
//!         CorrelateOptions::new(),
//!     )
//!     .await?;
//! ```

pub mod bus;
pub mod channel;
pub mod correlator;
pub mod error;
pub mod resolver;

pub use bus::{EventBus, HostEvent, Matcher, Predicate, Registration};
pub use channel::{Command, CommandChannel, CommandOptions, HostRequest, MpscCommandChannel};
pub use correlator::{CorrelateOptions, Correlator, DEFAULT_TIMEOUT, Expect};
pub use error::{BridgeError, BridgeResult, ensure_success};
pub use resolver::{SessionSlot, TransportPath, TransportResolver};

// Re-exported for cancellation of pending correlations.
pub use tokio_util::sync::CancellationToken;
