//! The session state machine and request/response coordinator.
//!
//! This is the component the rest of the crate exists to support: it gates
//! application sends against the in-flight limit, decorates bodies with BOSH
//! bookkeeping attributes, runs the single receive loop that demultiplexes
//! CM responses, and drives the keepalive/timeout/pause/reconnect machinery.
//! Every other module here is a collaborator this type owns or calls.

use crate::ack::AckTracker;
use crate::body::Body;
use crate::cm_params::CmSessionParams;
use crate::config::Config;
use crate::error::{BoshError, Result};
use crate::listener::{ConnectionEvent, ListenerId, Listeners};
use crate::rid::RidSequence;
use crate::scheduler::Scheduler;
use crate::terminal::TerminalCondition;
use crate::transport::{HttpResponse, ResponseHandle, SharedHttpSender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

tokio::task_local! {
    static IN_RECEIVE_LOOP: ();
}

struct Exchange {
    rid: i64,
    body: Body,
    handle: Option<ResponseHandle>,
    // Kept alongside `handle` rather than only inside it: once the receive
    // loop takes the handle out to await it, this is the only way left to
    // cancel that in-flight request (e.g. on disposal).
    cancel: CancellationToken,
}

struct State {
    rid: RidSequence,
    cm_params: Option<CmSessionParams>,
    outstanding: VecDeque<Exchange>,
    ack: AckTracker,
    paused: bool,
    lost: bool,
    disposed: bool,
}

struct Inner {
    to: String,
    from: Option<String>,
    lang: String,
    route: Option<String>,
    wait_seconds: u64,
    empty_request_delay_ms: u64,
    pause_margin_ms: u64,
    empty_requests_disabled: bool,
    assertions_enabled: bool,

    sender: SharedHttpSender,
    state: tokio::sync::Mutex<State>,
    not_full: Notify,
    not_empty: Notify,
    drained: Notify,
    scheduler: Scheduler,
    listeners: Listeners,
    receive_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// A live BOSH session: the public handle applications hold. Cloning shares
/// the same underlying coordinator (it is a thin `Arc` wrapper).
#[derive(Clone)]
pub struct Session(Arc<Inner>);

fn wants_extra_slot(body: &Body) -> bool {
    body.is_terminate() || body.attr("pause").is_some()
}

impl Session {
    /// Create a session and start its receive loop. The first `send` call
    /// performs session creation per §4.4.
    pub fn new(config: &Config, sender: SharedHttpSender) -> Result<Self> {
        Self::with_rid(config, sender, RidSequence::new())
    }

    /// Like [`Session::new`] but with a caller-chosen initial RID, useful
    /// for deterministic tests and for resuming a sequence across process
    /// restarts.
    pub fn with_initial_rid(config: &Config, sender: SharedHttpSender, initial_rid: u64) -> Result<Self> {
        Self::with_rid(config, sender, RidSequence::starting_at(initial_rid))
    }

    fn with_rid(config: &Config, sender: SharedHttpSender, rid: RidSequence) -> Result<Self> {
        sender.init()?;
        let inner = Arc::new(Inner {
            to: config.to.clone(),
            from: config.from.clone(),
            lang: config.lang.clone(),
            route: config.route.clone(),
            wait_seconds: config.wait_seconds,
            empty_request_delay_ms: config.empty_request_delay_ms,
            pause_margin_ms: config.pause_margin_ms,
            empty_requests_disabled: config.empty_requests_disabled,
            assertions_enabled: config.assertions_enabled,
            sender,
            state: tokio::sync::Mutex::new(State {
                rid,
                cm_params: None,
                outstanding: VecDeque::new(),
                ack: AckTracker::new(),
                paused: false,
                lost: false,
                disposed: false,
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
            drained: Notify::new(),
            scheduler: Scheduler::new(),
            listeners: Listeners::new(),
            receive_task: std::sync::Mutex::new(None),
        });
        let session = Self(inner);
        session.spawn_receive_loop();
        Ok(session)
    }

    fn spawn_receive_loop(&self) {
        let this = self.clone();
        let handle = tokio::spawn(IN_RECEIVE_LOOP.scope((), async move {
            this.run_receive_loop().await;
        }));
        *self.0.receive_task.lock().unwrap() = Some(handle);
    }

    // ---- Outward API (§6) --------------------------------------------

    /// Send a body. Blocks until immediately sendable (§4.3) or the session
    /// is disposed.
    pub async fn send(&self, body: Body) -> Result<()> {
        self.do_send(body, false).await.map(|_| ())
    }

    /// Request a pause, decorating `body` (or an empty one) with
    /// `pause=<maxpause>`. Returns `false` if the CM never advertised
    /// `maxpause` support.
    pub async fn pause(&self, body: Option<Body>) -> Result<bool> {
        let maxpause = {
            let state = self.0.state.lock().await;
            match state.cm_params.as_ref().and_then(|p| p.maxpause) {
                Some(d) => d,
                None => return Ok(false),
            }
        };
        let body = body
            .unwrap_or_default()
            .to_builder()
            .attr("pause", maxpause.as_secs().to_string())
            .build();
        self.do_send(body, true).await?;

        self.0.scheduler.empty_request.cancel();
        let margin = Duration::from_millis(self.0.pause_margin_ms);
        let delay = maxpause.checked_sub(margin).unwrap_or(Duration::ZERO);
        let this = self.clone();
        self.0.scheduler.empty_request.schedule(delay, move || async move {
            this.fire_empty_request(true).await;
        });
        Ok(true)
    }

    /// Send `body` decorated with `type="terminate"`; the receive loop
    /// disposes the session once the CM's response arrives.
    pub async fn disconnect(&self, body: Option<Body>) -> Result<()> {
        let body = body.unwrap_or_default().to_builder().attr("type", "terminate").build();
        self.send(body).await
    }

    /// Forcible local disposal: no network round trip.
    pub async fn close(&self) {
        self.dispose(None).await;
    }

    /// Abort all outstanding exchanges, clear `lost`, resend every pending
    /// body, and pad `outstanding` up to `hold + 1` with dummy requests so
    /// the CM is forced to answer at least one (confirming connectivity).
    pub async fn attempt_reconnect(&self) -> Result<bool> {
        let (pending, hold, was_working) = {
            let mut state = self.0.state.lock().await;
            if state.disposed {
                return Ok(false);
            }
            let pending: Vec<Body> = state.ack.pending_request_acks().cloned().collect();
            state.lost = false;
            let hold = state.cm_params.as_ref().map(|p| p.hold).unwrap_or(0);
            (pending, hold, true)
        };

        let max_in_flight = {
            let state = self.0.state.lock().await;
            state.cm_params.as_ref().and_then(|p| p.requests)
        };
        if let Some(m) = max_in_flight {
            self.assert_invariant(pending.len() as u64 <= m, "pendingRequestAcks exceeds max_in_flight on reconnect");
        }

        for body in pending {
            self.requeue_exchange(body).await;
        }

        let target = hold.saturating_add(1);
        loop {
            let current = self.0.state.lock().await.outstanding.len() as u64;
            if current >= target {
                break;
            }
            if let Some(m) = max_in_flight {
                if current >= m {
                    break;
                }
            }
            let dummy = Body::builder().payload("<message xmlns='jabber:client' />").build();
            self.do_send(dummy, false).await?;
        }

        self.maybe_schedule_empty_request().await;
        Ok(was_working)
    }

    /// Whether the session is in the `lost` (recoverable disconnection) state.
    pub async fn is_recoverable_connection_loss(&self) -> bool {
        let state = self.0.state.lock().await;
        state.lost && !state.disposed
    }

    /// Block until `outstanding` is empty or the session is disposed. Test
    /// hook; see the `drain()` design note.
    pub async fn drain(&self) {
        loop {
            let state = self.0.state.lock().await;
            if state.outstanding.is_empty() || state.disposed {
                return;
            }
            let notified = self.0.drained.notified();
            drop(state);
            notified.await;
        }
    }

    /// Number of bodies sent but not yet acknowledged by the CM. Exposed so
    /// an application can replay them onto a fresh session after a terminal
    /// disposal.
    pub async fn pending_request_ack_count(&self) -> usize {
        self.0.state.lock().await.ack.pending_count()
    }

    pub fn add_connection_listener<F>(&self, f: F) -> ListenerId
    where
        F: Fn(ConnectionEvent) + Send + Sync + 'static,
    {
        self.0.listeners.add_connection_listener(f)
    }

    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        self.0.listeners.remove_connection_listener(id)
    }

    pub fn add_request_sent_listener<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Body) + Send + Sync + 'static,
    {
        self.0.listeners.add_request_sent_listener(f)
    }

    pub fn remove_request_sent_listener(&self, id: ListenerId) -> bool {
        self.0.listeners.remove_request_sent_listener(id)
    }

    pub fn add_response_received_listener<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Body) + Send + Sync + 'static,
    {
        self.0.listeners.add_response_received_listener(f)
    }

    pub fn remove_response_received_listener(&self, id: ListenerId) -> bool {
        self.0.listeners.remove_response_received_listener(id)
    }

    // ---- Send path (§4.3, §4.4, §4.5) ----------------------------------

    async fn do_send(&self, body: Body, is_pause_entry: bool) -> Result<i64> {
        let extra_slot = wants_extra_slot(&body);
        let mut state = loop {
            let state = self.0.state.lock().await;
            if state.disposed {
                return Err(BoshError::Usage("send on a disposed session".to_string()).into());
            }
            if Self::immediately_sendable(&state, extra_slot) {
                break state;
            }
            let notified = self.0.not_full.notified();
            drop(state);
            notified.await;
        };

        let decorated = self.decorate(&mut state, body);
        let rid = decorated.rid().expect("decorated body always carries rid");
        self.assert_invariant(rid > 0, "rid must be positive");

        state.ack.record_send(decorated.clone());
        let max = state.cm_params.as_ref().and_then(|p| p.requests);
        if let Some(m) = max {
            self.assert_invariant(
                state.outstanding.len() as u64 <= m + 1,
                "outstanding exceeds max_in_flight + 1",
            );
        }

        let handle = self.0.sender.send(decorated.clone());
        let cancel = handle.cancel_token();
        state.outstanding.push_back(Exchange {
            rid,
            body: decorated.clone(),
            handle: Some(handle),
            cancel,
        });

        if is_pause_entry {
            state.paused = true;
        } else if state.paused {
            state.paused = false;
        }

        drop(state);

        self.0.not_empty.notify_waiters();
        if decorated.is_empty_request() {
            tracing::debug!(rid, "sending empty keepalive request");
        }
        self.0.listeners.notify_request_sent(&decorated);
        self.maybe_reschedule_io_timeout().await;

        Ok(rid)
    }

    fn immediately_sendable(state: &State, extra_slot: bool) -> bool {
        if state.cm_params.is_none() {
            return state.outstanding.is_empty();
        }
        if state.lost {
            return false;
        }
        match state.cm_params.as_ref().and_then(|p| p.requests) {
            None => true,
            Some(max) => {
                let n = state.outstanding.len() as u64;
                n < max || (n == max && extra_slot)
            }
        }
    }

    fn decorate(&self, state: &mut State, body: Body) -> Body {
        let rid = state.rid.next() as i64;
        let mut builder = body.to_builder().attr("rid", rid.to_string());
        match &state.cm_params {
            None => {
                builder = builder
                    .attr("to", self.0.to.clone())
                    .attr("xml:lang", self.0.lang.clone())
                    .attr("ver", "1.10")
                    .attr("wait", self.0.wait_seconds.to_string())
                    .attr("hold", "3")
                    .attr("ack", "1")
                    .without_attr("sid");
                if let Some(route) = &self.0.route {
                    builder = builder.attr("route", route.clone());
                }
                if let Some(from) = &self.0.from {
                    builder = builder.attr("from", from.clone());
                }
            }
            Some(params) => {
                builder = builder.attr("sid", params.sid.clone());
                match state.ack.ack_attribute_for(rid) {
                    Some(ack) => builder = builder.attr("ack", ack.to_string()),
                    None => builder = builder.without_attr("ack"),
                }
            }
        }
        builder.build()
    }

    async fn requeue_exchange(&self, body: Body) {
        let rid = body.rid().expect("pending body always carries rid");
        let handle = self.0.sender.send(body.clone());
        let cancel = handle.cancel_token();
        {
            let mut state = self.0.state.lock().await;
            state.outstanding.push_back(Exchange {
                rid,
                body,
                handle: Some(handle),
                cancel,
            });
        }
        self.0.not_empty.notify_waiters();
    }

    // ---- Receive loop (§4.6) -------------------------------------------

    async fn take_head(&self) -> Option<(i64, ResponseHandle)> {
        loop {
            let mut state = self.0.state.lock().await;
            if state.disposed {
                return None;
            }
            if let Some(front) = state.outstanding.front_mut() {
                if let Some(handle) = front.handle.take() {
                    return Some((front.rid, handle));
                }
            }
            let notified = self.0.not_empty.notified();
            drop(state);
            notified.await;
        }
    }

    async fn run_receive_loop(&self) {
        loop {
            let Some((rid, handle)) = self.take_head().await else {
                return;
            };
            match handle.wait().await {
                Err(_err) => self.handle_transport_error().await,
                Ok(response) => self.handle_response(rid, response).await,
            }
        }
    }

    async fn handle_transport_error(&self) {
        let mut state = self.0.state.lock().await;
        if state.disposed {
            return;
        }
        state.lost = true;
        for ex in state.outstanding.drain(..) {
            ex.cancel.cancel();
        }
        drop(state);
        self.0.not_full.notify_waiters();
        self.0.drained.notify_waiters();
    }

    async fn handle_response(&self, rid: i64, response: HttpResponse) {
        let HttpResponse { body, status } = response;

        let mut just_materialized = false;
        {
            let mut state = self.0.state.lock().await;
            if state.cm_params.is_none() {
                match CmSessionParams::from_response(&body) {
                    Some(params) => {
                        state.cm_params = Some(params);
                        just_materialized = true;
                    }
                    None => {
                        drop(state);
                        self.dispose(Some(BoshError::ProtocolViolation(
                            "session-creation response missing sid/wait/hold".to_string(),
                        )))
                        .await;
                        return;
                    }
                }
            }
        }
        // Established must fire before any response-received notification,
        // including the one for the session-creation response itself.
        if just_materialized {
            self.0.listeners.notify_connection(ConnectionEvent::Established);
        }
        self.0.listeners.notify_response_received(&body);

        if body.is_terminate() {
            if let Some(cond) = body.condition() {
                let condition = TerminalCondition::from_condition(cond);
                self.dispose(Some(BoshError::TerminalBinding(condition.to_string()))).await;
            } else {
                self.dispose(None).await;
            }
            return;
        }

        let pre_1_6 = {
            let state = self.0.state.lock().await;
            state.cm_params.as_ref().map(|p| p.is_pre_1_6()).unwrap_or(false)
        };
        if pre_1_6 {
            if let Some(condition) = TerminalCondition::from_http_status(status) {
                self.dispose(Some(BoshError::TerminalBinding(condition.to_string()))).await;
                return;
            }
        }

        if body.is_recoverable_error() {
            self.handle_recoverable_error().await;
            self.finish_receive_iteration().await;
            return;
        }

        {
            let mut state = self.0.state.lock().await;
            state.ack.apply_outbound_ack(&body, rid);
            state.ack.record_response_rid(rid);

            if let Some(report_rid) = body.report() {
                match state.ack.find_for_report(report_rid) {
                    Some(found) => {
                        remove_outstanding_rid(&mut state.outstanding, report_rid);
                        drop(state);
                        self.0.not_full.notify_waiters();
                        self.requeue_exchange(found).await;
                    }
                    None => {
                        drop(state);
                        self.dispose(Some(BoshError::ProtocolViolation(format!(
                            "report references unknown rid {report_rid}"
                        ))))
                        .await;
                        return;
                    }
                }
            }
        }

        {
            let mut state = self.0.state.lock().await;
            state.outstanding.retain(|e| e.rid != rid);
            let now_empty = state.outstanding.is_empty();
            drop(state);
            self.0.not_full.notify_waiters();
            if now_empty {
                self.0.drained.notify_waiters();
            }
        }

        self.finish_receive_iteration().await;
    }

    async fn handle_recoverable_error(&self) {
        let to_resend: Vec<Body> = {
            let mut state = self.0.state.lock().await;
            let mut bodies = Vec::with_capacity(state.outstanding.len());
            for ex in state.outstanding.drain(..) {
                ex.cancel.cancel();
                bodies.push(ex.body);
            }
            bodies
        };
        self.0.not_full.notify_waiters();
        for body in to_resend {
            self.requeue_exchange(body).await;
        }
    }

    async fn finish_receive_iteration(&self) {
        self.maybe_reschedule_io_timeout().await;
        let paused = self.0.state.lock().await.paused;
        if !paused {
            self.maybe_schedule_empty_request().await;
        }
    }

    // ---- Timers (§4.7, §4.11) -------------------------------------------

    async fn maybe_reschedule_io_timeout(&self) {
        let (has_outstanding, wait) = {
            let state = self.0.state.lock().await;
            let wait = state.cm_params.as_ref().map(|p| p.wait).unwrap_or(self.0.wait_seconds);
            (!state.outstanding.is_empty(), wait)
        };
        if !has_outstanding {
            self.0.scheduler.io_timeout.cancel();
            return;
        }
        let base_secs = if wait == 0 { 60 } else { wait };
        let millis = ((base_secs as f64) * 1.5 * 1000.0) as u64;
        let this = self.clone();
        self.0
            .scheduler
            .io_timeout
            .schedule(Duration::from_millis(millis), move || async move {
                this.handle_io_timeout().await;
            });
    }

    async fn handle_io_timeout(&self) {
        let mut state = self.0.state.lock().await;
        if state.disposed {
            return;
        }
        state.lost = true;
        for ex in state.outstanding.drain(..) {
            ex.cancel.cancel();
        }
        drop(state);
        self.0.not_full.notify_waiters();
        self.0.drained.notify_waiters();
    }

    async fn maybe_schedule_empty_request(&self) {
        if self.0.empty_requests_disabled {
            return;
        }
        let delay = {
            let state = self.0.state.lock().await;
            if state.disposed {
                return;
            }
            let params = match &state.cm_params {
                Some(p) => p,
                None => return,
            };
            if params.hold > 0 {
                Duration::from_millis(0)
            } else if let Some(polling) = params.polling {
                polling
            } else {
                Duration::from_millis(self.0.empty_request_delay_ms)
            }
        };
        let this = self.clone();
        self.0.scheduler.empty_request.schedule_if_absent(delay, move || async move {
            this.fire_empty_request(false).await;
        });
    }

    async fn fire_empty_request(&self, mut wake: bool) {
        loop {
            let should_send = {
                let state = self.0.state.lock().await;
                if state.disposed || state.lost || state.paused && !wake {
                    false
                } else if let Some(params) = state.cm_params.as_ref() {
                    let target = if params.is_polling() { 1 } else { params.hold };
                    (state.outstanding.len() as u64) < target
                } else {
                    false
                }
            };
            if !should_send {
                break;
            }
            if self.do_send(Body::builder().build(), false).await.is_err() {
                break;
            }
            wake = false;
        }
    }

    // ---- Disposal (§4.12) -----------------------------------------------

    async fn dispose(&self, cause: Option<BoshError>) {
        let cause_string;
        let pending;
        {
            let mut state = self.0.state.lock().await;
            if state.disposed {
                return;
            }
            state.disposed = true;
            for ex in state.outstanding.drain(..) {
                ex.cancel.cancel();
            }
            pending = state.ack.pending_request_acks().cloned().collect::<Vec<_>>();
            cause_string = cause.as_ref().map(|e| e.to_string());
        }

        self.0.scheduler.cancel_all();
        self.0.not_full.notify_waiters();
        self.0.not_empty.notify_waiters();
        self.0.drained.notify_waiters();
        self.0.sender.destroy();

        self.0
            .listeners
            .notify_connection(ConnectionEvent::Closed { cause: cause_string, pending_request_acks: pending });

        self.join_receive_task_if_not_self().await;
    }

    async fn join_receive_task_if_not_self(&self) {
        if IN_RECEIVE_LOOP.try_with(|_| ()).is_ok() {
            return;
        }
        let handle = self.0.receive_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn assert_invariant(&self, condition: bool, message: &str) {
        if self.0.assertions_enabled && !condition {
            panic!("bosh-core invariant violated: {message}");
        }
    }
}

fn remove_outstanding_rid(outstanding: &mut VecDeque<Exchange>, rid: i64) {
    if let Some(pos) = outstanding.iter().position(|e| e.rid == rid) {
        if let Some(ex) = outstanding.remove(pos) {
            ex.cancel.cancel();
        }
    }
}
