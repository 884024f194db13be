//! Error types for bosh-core
//!
//! This module defines all error types used throughout the session engine,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for bosh-core operations.
///
/// Mirrors the taxonomy from the error handling design: transport failures
/// that mark a session `lost`, CM-signalled binding conditions that dispose
/// it, protocol violations, usage errors surfaced synchronously to the
/// caller, and the cause reported when a blocking wait is interrupted by
/// disposal.
#[derive(Error, Debug)]
pub enum BoshError {
    /// Connect/read/write failure, or an I/O timeout firing. Triggers `lost`.
    #[error("transport error: {0}")]
    Transport(String),

    /// CM-signalled unrecoverable binding condition (`type="terminate"`).
    #[error("terminal binding condition: {0}")]
    TerminalBinding(String),

    /// `type="error"` response with no condition: the CM discarded a request.
    #[error("recoverable binding condition, resending outstanding requests")]
    RecoverableBinding,

    /// The CM violated the protocol, e.g. a `report` referencing an unknown RID.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Caller misuse: `send` on a disposed session, an unsupported `pause`, etc.
    #[error("usage error: {0}")]
    Usage(String),

    /// A blocking wait (`send`, `drain`) was released by session disposal.
    #[error("interrupted by session disposal")]
    InterruptedWait,

    /// Configuration is missing a required field or holds an invalid value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error from the concrete `reqwest`-based sender.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Config file failed to parse as YAML.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A configured URI/URL failed to parse.
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for bosh-core operations.
///
/// Uses `anyhow::Error` so call sites can propagate with `?` freely; the
/// concrete variant is still recoverable via
/// `anyhow::Error::downcast_ref::<BoshError>()` where callers need to match
/// on it (e.g. to decide whether a connection loss is recoverable).
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = BoshError::Transport("connection reset".to_string());
        assert_eq!(err.to_string(), "transport error: connection reset");
    }

    #[test]
    fn terminal_binding_display() {
        let err = BoshError::TerminalBinding("host-gone".to_string());
        assert_eq!(err.to_string(), "terminal binding condition: host-gone");
    }

    #[test]
    fn recoverable_binding_display() {
        let err = BoshError::RecoverableBinding;
        assert!(err.to_string().contains("resending outstanding"));
    }

    #[test]
    fn protocol_violation_display() {
        let err = BoshError::ProtocolViolation("report references unknown rid 42".to_string());
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn usage_error_display() {
        let err = BoshError::Usage("send on disposed session".to_string());
        assert_eq!(err.to_string(), "usage error: send on disposed session");
    }

    #[test]
    fn interrupted_wait_display() {
        let err = BoshError::InterruptedWait;
        assert_eq!(err.to_string(), "interrupted by session disposal");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: BoshError = io_err.into();
        assert!(matches!(err, BoshError::Io(_)));
    }

    #[test]
    fn yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let err: BoshError = yaml_err.into();
        assert!(matches!(err, BoshError::Yaml(_)));
    }

    #[test]
    fn url_error_conversion() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: BoshError = url_err.into();
        assert!(matches!(err, BoshError::Url(_)));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BoshError>();
    }
}
