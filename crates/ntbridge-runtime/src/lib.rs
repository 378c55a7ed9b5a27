//! ntbridge Runtime - configuration, logging and assembly.
//!
//! This crate provides:
//! - Layered configuration loading and validation (`config`)
//! - Logging initialisation on `tracing-subscriber` (`logging`)
//! - The [`Bridge`], which wires the event bus, command channel, correlator,
//!   session slot and group API from a [`BridgeConfig`]
//!
//! ```ignore
//! use ntbridge_runtime::Bridge;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bridge = Bridge::builder().init_logging(true).build()?;
//!     let requests = bridge.take_host_requests();
//!     // hand `requests` to the host-facing task ...
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;

pub use bridge::{Bridge, BridgeBuilder};
pub use config::{BridgeConfig, ConfigError, ConfigLoader, ConfigResult};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-exported so downstream crates log through the same facade.
pub use tracing;
