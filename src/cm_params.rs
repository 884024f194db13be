//! Connection manager session parameters.
//!
//! Parsed once, from the attributes of the session-creation response, and
//! immutable for the remainder of the session.

use crate::body::Body;

/// Parameters the CM reports at session creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmSessionParams {
    /// Opaque session id.
    pub sid: String,
    /// Server long-poll maximum hold seconds.
    pub wait: u64,
    /// Maximum number of requests the CM may hold open (≥0).
    pub hold: u64,
    /// Maximum concurrent requests the client may have in flight; absent
    /// means the sending side falls back to treating it as unbounded.
    pub requests: Option<u64>,
    /// Minimum interval between empty polls when `hold == 0`.
    pub polling: Option<std::time::Duration>,
    /// Maximum pause duration the CM accepts; `None` means pause is
    /// unsupported.
    pub maxpause: Option<std::time::Duration>,
    /// Protocol version string; absent means "pre-1.6" deprecated mode.
    pub ver: Option<String>,
    /// Whether the server includes the `ack` attribute (ack support).
    pub ack_support: bool,
}

impl CmSessionParams {
    /// Parse from the attributes of a session-creation response body.
    ///
    /// `sid` and `wait` and `hold` are required by BOSH; a response missing
    /// any of them cannot materialize session parameters, and the caller
    /// should treat that as a protocol violation.
    pub fn from_response(body: &Body) -> Option<Self> {
        let sid = body.sid()?.to_string();
        let wait = body.attr("wait")?.parse().ok()?;
        let hold = body.attr("hold")?.parse().ok()?;
        let requests = body.attr("requests").and_then(|v| v.parse().ok());
        let polling = body
            .attr("polling")
            .and_then(|v| v.parse::<u64>().ok())
            .map(std::time::Duration::from_secs);
        let maxpause = body
            .attr("maxpause")
            .and_then(|v| v.parse::<u64>().ok())
            .map(std::time::Duration::from_secs);
        let ver = body.attr("ver").map(str::to_string);
        let ack_support = body.attr("ack").is_some();

        Some(Self {
            sid,
            wait,
            hold,
            requests,
            polling,
            maxpause,
            ver,
            ack_support,
        })
    }

    /// `true` for a polling (non-long-poll) session: `wait == 0 || hold == 0`.
    pub fn is_polling(&self) -> bool {
        self.wait == 0 || self.hold == 0
    }

    /// Pause is supported iff the CM advertised a `maxpause`.
    pub fn supports_pause(&self) -> bool {
        self.maxpause.is_some()
    }

    /// "pre-1.6" deprecated error-code mode: the CM omitted `ver`.
    pub fn is_pre_1_6(&self) -> bool {
        self.ver.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_response() {
        let body = Body::builder()
            .attr("sid", "abc123")
            .attr("wait", "60")
            .attr("hold", "1")
            .attr("requests", "2")
            .attr("ver", "1.10")
            .attr("ack", "1")
            .build();
        let params = CmSessionParams::from_response(&body).unwrap();
        assert_eq!(params.sid, "abc123");
        assert_eq!(params.wait, 60);
        assert_eq!(params.hold, 1);
        assert_eq!(params.requests, Some(2));
        assert!(params.ack_support);
        assert!(!params.is_pre_1_6());
    }

    #[test]
    fn missing_sid_fails_to_parse() {
        let body = Body::builder().attr("wait", "60").attr("hold", "1").build();
        assert!(CmSessionParams::from_response(&body).is_none());
    }

    #[test]
    fn absent_ver_is_pre_1_6() {
        let body = Body::builder()
            .attr("sid", "s")
            .attr("wait", "60")
            .attr("hold", "1")
            .build();
        let params = CmSessionParams::from_response(&body).unwrap();
        assert!(params.is_pre_1_6());
    }

    #[test]
    fn is_polling_detects_hold_zero_or_wait_zero() {
        let hold_zero = CmSessionParams {
            sid: "s".into(),
            wait: 60,
            hold: 0,
            requests: None,
            polling: None,
            maxpause: None,
            ver: None,
            ack_support: false,
        };
        assert!(hold_zero.is_polling());

        let wait_zero = CmSessionParams {
            wait: 0,
            hold: 1,
            ..hold_zero.clone()
        };
        assert!(wait_zero.is_polling());

        let long_poll = CmSessionParams {
            wait: 60,
            hold: 1,
            ..hold_zero
        };
        assert!(!long_poll.is_polling());
    }

    #[test]
    fn supports_pause_requires_maxpause() {
        let without = CmSessionParams {
            sid: "s".into(),
            wait: 60,
            hold: 1,
            requests: None,
            polling: None,
            maxpause: None,
            ver: None,
            ack_support: false,
        };
        assert!(!without.supports_pause());

        let with = CmSessionParams {
            maxpause: Some(std::time::Duration::from_secs(120)),
            ..without
        };
        assert!(with.supports_pause());
    }
}
