//! Outbound and inbound acknowledgment bookkeeping.
//!
//! Two separately-reasoned concerns live here: the outbound
//! `pendingRequestAcks` list (bodies sent but not yet acknowledged by the
//! CM, used for replay) and the inbound `(response_ack, pending_set)` pair
//! (the contiguous high-water mark of responses received, used to decide
//! whether the next outbound request needs an explicit `ack` attribute).

use crate::body::Body;
use std::collections::{BTreeSet, VecDeque};

/// Ack tracker for one session.
#[derive(Debug, Default)]
pub struct AckTracker {
    pending_request_acks: VecDeque<Body>,
    response_ack: i64,
    pending_set: BTreeSet<i64>,
}

impl AckTracker {
    /// New tracker: `response_ack` starts at the "none yet" sentinel `-1`.
    pub fn new() -> Self {
        Self {
            pending_request_acks: VecDeque::new(),
            response_ack: -1,
            pending_set: BTreeSet::new(),
        }
    }

    /// Record that `body` was just sent; append to the outbound pending list.
    pub fn record_send(&mut self, body: Body) {
        self.pending_request_acks.push_back(body);
    }

    /// Bodies sent but not yet acknowledged, in send order. Used for replay
    /// on reconnect and recoverable-binding resend.
    pub fn pending_request_acks(&self) -> impl Iterator<Item = &Body> {
        self.pending_request_acks.iter()
    }

    /// Number of bodies awaiting outbound ack.
    pub fn pending_count(&self) -> usize {
        self.pending_request_acks.len()
    }

    /// Process the outbound-ack side of a response to the request with RID
    /// `request_rid`. No-op if the response carries a `report` attribute —
    /// report handling is a distinct path (see [`AckTracker::find_for_report`]).
    pub fn apply_outbound_ack(&mut self, response: &Body, request_rid: i64) {
        if response.report().is_some() {
            return;
        }
        let ack_value = response.ack().unwrap_or(request_rid);
        let threshold = ack_value.min(request_rid);
        while let Some(front) = self.pending_request_acks.front() {
            if front.rid().unwrap_or(i64::MAX) <= threshold {
                self.pending_request_acks.pop_front();
            } else {
                break;
            }
        }
    }

    /// Process the inbound-ack side: a response with RID `rid` has arrived.
    /// Advances `response_ack` through any now-contiguous run in
    /// `pending_set`.
    pub fn record_response_rid(&mut self, rid: i64) {
        self.pending_set.insert(rid);
        if self.response_ack == -1 {
            // The first response received establishes the baseline: RIDs
            // don't start at a known value, so "contiguous" is relative to
            // whichever RID arrives first, not to zero.
            self.response_ack = rid;
            self.pending_set.remove(&rid);
        }
        while self.pending_set.contains(&(self.response_ack + 1)) {
            self.response_ack += 1;
            self.pending_set.remove(&self.response_ack);
        }
    }

    /// Current high-water mark: the highest RID for which all responses with
    /// RID ≤ it have been received. `-1` before any response arrives.
    pub fn response_ack(&self) -> i64 {
        self.response_ack
    }

    /// RIDs received out of order, not yet folded into `response_ack`.
    pub fn pending_set(&self) -> &BTreeSet<i64> {
        &self.pending_set
    }

    /// The `ack` attribute to decorate the next outbound request (with RID
    /// `next_rid`) with, per the implicit-ack rule: omit when
    /// `response_ack == next_rid - 1`.
    pub fn ack_attribute_for(&self, next_rid: i64) -> Option<i64> {
        if self.response_ack != -1 && self.response_ack != next_rid - 1 {
            Some(self.response_ack)
        } else {
            None
        }
    }

    /// Locate the pending body with RID `report_rid` for report-driven
    /// resend. `None` if the CM reported an RID the client never sent (a
    /// protocol violation the caller should dispose on).
    pub fn find_for_report(&self, report_rid: i64) -> Option<Body> {
        self.pending_request_acks
            .iter()
            .find(|b| b.rid() == Some(report_rid))
            .cloned()
    }
}
