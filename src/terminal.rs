//! Terminal binding condition classification.
//!
//! The XEP-0124 closed table of `condition` strings the CM may report on a
//! `type="terminate"` response, plus an `Unknown` catch-all and a pre-1.6
//! (no `ver` attribute) HTTP-status-code fallback.

use std::fmt;

/// A terminal binding condition: CM-reported, unrecoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCondition {
    HostGone,
    HostUnknown,
    ImproperAddressing,
    InternalServerError,
    ItemNotFound,
    OtherRequest,
    PolicyViolation,
    RemoteConnectionFailed,
    RemoteStreamError,
    SeeOtherUri,
    SystemShutdown,
    UndefinedCondition,
    /// A `condition` string not in the closed XEP-0124 table.
    Unknown(String),
}

impl TerminalCondition {
    /// Map a `condition` attribute value to a known condition, or `Unknown`.
    pub fn from_condition(condition: &str) -> Self {
        match condition {
            "host-gone" => Self::HostGone,
            "host-unknown" => Self::HostUnknown,
            "improper-addressing" => Self::ImproperAddressing,
            "internal-server-error" => Self::InternalServerError,
            "item-not-found" => Self::ItemNotFound,
            "other-request" => Self::OtherRequest,
            "policy-violation" => Self::PolicyViolation,
            "remote-connection-failed" => Self::RemoteConnectionFailed,
            "remote-stream-error" => Self::RemoteStreamError,
            "see-other-uri" => Self::SeeOtherUri,
            "system-shutdown" => Self::SystemShutdown,
            "undefined-condition" => Self::UndefinedCondition,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Pre-1.6 (no `ver` attribute) fallback: derive a terminal condition
    /// from a non-2xx HTTP status code. `None` for 2xx (not terminal).
    pub fn from_http_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            400 => Some(Self::ImproperAddressing),
            403 => Some(Self::PolicyViolation),
            404 => Some(Self::ItemNotFound),
            _ => Some(Self::UndefinedCondition),
        }
    }
}

impl fmt::Display for TerminalCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostGone => write!(f, "host-gone"),
            Self::HostUnknown => write!(f, "host-unknown"),
            Self::ImproperAddressing => write!(f, "improper-addressing"),
            Self::InternalServerError => write!(f, "internal-server-error"),
            Self::ItemNotFound => write!(f, "item-not-found"),
            Self::OtherRequest => write!(f, "other-request"),
            Self::PolicyViolation => write!(f, "policy-violation"),
            Self::RemoteConnectionFailed => write!(f, "remote-connection-failed"),
            Self::RemoteStreamError => write!(f, "remote-stream-error"),
            Self::SeeOtherUri => write!(f, "see-other-uri"),
            Self::SystemShutdown => write!(f, "system-shutdown"),
            Self::UndefinedCondition => write!(f, "undefined-condition"),
            Self::Unknown(s) => write!(f, "unknown({s})"),
        }
    }
}
