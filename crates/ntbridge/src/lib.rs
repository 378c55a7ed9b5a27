//! # ntbridge
//!
//! Ordinary awaitable calls over a host application that only speaks
//! one-way commands and unsolicited, named events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────────────┐  session attached   ┌──────────────┐
//! │ GroupApi │────▶│ TransportResolver │───────────────────▶│ NtSession    │
//! └──────────┘     └───────────────────┘                     └──────────────┘
//!      │                    │ no session
//!      ▼                    ▼
//! ┌─────────────┐    ┌────────────┐   Command   ┌──────┐
//! │ MemberCache │    │ Correlator │────────────▶│ host │
//! └─────────────┘    └────────────┘             └──────┘
//!                          ▲                        │
//!                          └──── EventBus ◀── emit ─┘
//! ```
//!
//! - **Core** ([`core`]): event bus, command channel, correlator, resolver
//! - **Group** ([`group`]): group operations and the member cache
//! - **Runtime** ([`runtime`]): configuration, logging and [`Bridge`] assembly
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ntbridge::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bridge = Bridge::builder().init_logging(true).build()?;
//!     let requests = bridge.take_host_requests();
//!     // drive `requests` against the host, forward host events to `bridge.emit`
//!
//!     for group in bridge.group().get_groups().await? {
//!         println!("{} {}", group.group_code, group.group_name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use ntbridge_core as core;
pub use ntbridge_group as group;
pub use ntbridge_runtime as runtime;

pub use ntbridge_runtime::{Bridge, BridgeBuilder, BridgeConfig};

/// Prelude module for convenient imports.
pub mod prelude {
    // Assembly
    pub use ntbridge_runtime::{Bridge, BridgeConfig, ConfigLoader, LoggingBuilder};

    // Correlation
    pub use ntbridge_core::{
        BridgeError, BridgeResult, CancellationToken, Command, CommandChannel, CorrelateOptions,
        Correlator, Expect, HostEvent, HostRequest, TransportPath,
    };

    // Group domain
    pub use ntbridge_group::{
        Group, GroupApi, GroupMember, GroupService, MemberRole, MuteEntry, NtSession,
        RequestOperation,
    };
}
