//! Unified error types for the bridge core.
//!
//! Both transport paths (direct session calls and correlated commands) report
//! failures through [`BridgeError`], so callers never need to know which path
//! executed.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

// =============================================================================
// Bridge Errors
// =============================================================================

/// Error type for every bridged operation.
///
/// `Clone` so that a single failure can be handed to every caller joined on
/// the same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The host explicitly reported a non-zero status for a command.
    #[error("host error ({code}): {message}")]
    Transport {
        /// Host-provided status code.
        code: i64,
        /// Host-provided message.
        message: String,
    },

    /// Nothing answered within the correlation window.
    #[error("timed out after {after:?} waiting for '{event}'")]
    Timeout {
        /// The armed event name, or the command name when no event is
        /// expected.
        event: String,
        /// The window that elapsed.
        after: Duration,
    },

    /// The caller aborted a pending correlation.
    #[error("correlation cancelled")]
    Cancelled,

    /// The command could not be handed to the host.
    #[error("failed to send command: {0}")]
    SendFailed(String),

    /// The host-facing side of the command channel is gone.
    #[error("host is not connected")]
    NotConnected,

    /// A payload did not have the expected shape.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The caller supplied an argument the host cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl BridgeError {
    /// Creates a transport failure from a host status code and message.
    pub fn transport(code: i64, message: impl Into<String>) -> Self {
        Self::Transport {
            code,
            message: message.into(),
        }
    }

    /// Returns `true` for [`BridgeError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` for [`BridgeError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for bridged operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

// =============================================================================
// Host status envelope
// =============================================================================

/// Checks the status envelope the host attaches to command replies.
///
/// The host reports status either as `result` (general call results) or as
/// `errCode` (list queries), with the message in `errMsg`. Payloads carrying
/// neither field are treated as successful.
pub fn ensure_success(value: &Value) -> BridgeResult<()> {
    let code = value
        .get("result")
        .and_then(Value::as_i64)
        .or_else(|| value.get("errCode").and_then(Value::as_i64));

    match code {
        Some(code) if code != 0 => {
            let message = value
                .get("errMsg")
                .and_then(Value::as_str)
                .unwrap_or("unknown host error")
                .to_string();
            Err(BridgeError::Transport { code, message })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zero_status_is_success() {
        assert!(ensure_success(&json!({ "result": 0, "errMsg": "" })).is_ok());
        assert!(ensure_success(&json!({ "errCode": 0 })).is_ok());
        assert!(ensure_success(&json!({ "arkJson": "{}" })).is_ok());
        assert!(ensure_success(&Value::Null).is_ok());
    }

    #[test]
    fn test_non_zero_status_carries_host_message() {
        let err = ensure_success(&json!({ "errCode": 3, "errMsg": "no permission" })).unwrap_err();
        match err {
            BridgeError::Transport { code, message } => {
                assert_eq!(code, 3);
                assert_eq!(message, "no permission");
            }
            other => panic!("Expected Transport, got {other:?}"),
        }
    }

    #[test]
    fn test_result_field_takes_precedence() {
        let err = ensure_success(&json!({ "result": 7, "errCode": 0 })).unwrap_err();
        assert!(matches!(err, BridgeError::Transport { code: 7, .. }));
    }
}
