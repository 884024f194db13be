//! The HTTP sender contract and its concrete `reqwest`-backed collaborator.
//!
//! The session coordinator never touches `reqwest` directly; it depends only
//! on [`HttpSender`], a handle-based abstraction that mirrors the way the
//! coordinator actually wants to use the network: fire a request, get back a
//! handle that can be awaited for the response or aborted if the session is
//! disposed while the request is still in flight.

use crate::body::Body;
use crate::error::{BoshError, Result};
use crate::wire;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A collaborator capable of sending one encoded BOSH body over HTTP and
/// returning a handle for its response.
///
/// Implementations must be safe to share across the coordinator's requests:
/// `send` may be called concurrently up to the session's `max_in_flight`.
#[cfg_attr(test, mockall::automock)]
pub trait HttpSender: Send + Sync {
    /// One-time setup, e.g. connection pool warmup. Called once, before the
    /// first `send`.
    fn init(&self) -> Result<()>;

    /// Send `body` and return a handle for its eventual response. Must not
    /// block; the actual I/O happens on a background task.
    fn send(&self, body: Body) -> ResponseHandle;

    /// Release any held resources. Called once, on session disposal.
    fn destroy(&self);
}

/// A successfully completed HTTP exchange: the decoded response body plus
/// its HTTP status. The status matters only for pre-1.6 CMs that omit `ver`
/// and therefore signal terminal conditions via status code instead of a
/// `condition` attribute (see [`crate::terminal::TerminalCondition::from_http_status`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub body: Body,
    pub status: u16,
}

/// A handle to an in-flight HTTP exchange.
///
/// Exactly one of `wait` or `abort` should be used to retire a handle;
/// calling `abort` after the response already arrived is a harmless no-op.
pub struct ResponseHandle {
    receiver: oneshot::Receiver<Result<HttpResponse>>,
    cancel: CancellationToken,
}

impl ResponseHandle {
    /// Await the response. Resolves to [`BoshError::InterruptedWait`] if
    /// `abort` was called first, or to the underlying transport error if the
    /// request failed.
    pub async fn wait(self) -> Result<HttpResponse> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(BoshError::InterruptedWait.into()),
        }
    }

    /// Cancel the in-flight request. The background task stops waiting on
    /// the socket; a subsequent `wait` (if any caller still holds this
    /// handle) resolves to `InterruptedWait`.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// A clone of this handle's cancellation token, so a caller that has
    /// handed the handle itself off elsewhere (e.g. to the receive loop)
    /// can still cancel the request it's waiting on.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// The concrete [`HttpSender`] used outside tests: plain HTTP POST via
/// `reqwest`, one request per call, no connection reuse beyond what the
/// underlying client pool already does.
pub struct ReqwestHttpSender {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl ReqwestHttpSender {
    pub fn new(endpoint: url::Url, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

impl HttpSender for ReqwestHttpSender {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn send(&self, body: Body) -> ResponseHandle {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        tokio::spawn(async move {
            let xml = wire::encode(&body);
            let outcome = tokio::select! {
                biased;
                _ = cancel_clone.cancelled() => Err(BoshError::InterruptedWait.into()),
                result = post(client, endpoint, xml) => result,
            };
            let _ = tx.send(outcome);
        });

        ResponseHandle { receiver: rx, cancel }
    }

    fn destroy(&self) {}
}

async fn post(client: reqwest::Client, endpoint: url::Url, xml: String) -> Result<HttpResponse> {
    let response = client
        .post(endpoint)
        .header("Content-Type", "text/xml; charset=utf-8")
        .body(xml)
        .send()
        .await
        .map_err(|e| BoshError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let text = response.text().await.map_err(|e| BoshError::Transport(e.to_string()))?;

    if text.trim().is_empty() {
        return Err(BoshError::Transport(format!("empty response body, status {status}")).into());
    }

    let body = wire::decode(&text)?;
    Ok(HttpResponse { body, status })
}

/// An `Arc`-wrapped `HttpSender`, the shape the coordinator actually holds
/// (shared across the background receive worker and the public handle).
pub type SharedHttpSender = Arc<dyn HttpSender>;

#[cfg(test)]
impl ResponseHandle {
    /// Build a handle that resolves immediately to `result`. A helper for
    /// `mockall`-based coordinator tests, where `send`'s return value is
    /// produced inside a `.returning(...)` closure rather than pulled off
    /// `FakeHttpSender`'s queue.
    pub fn ready(result: Result<HttpResponse>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        ResponseHandle {
            receiver: rx,
            cancel: CancellationToken::new(),
        }
    }
}

/// An in-memory [`HttpSender`] for coordinator tests: records sent bodies
/// and replies from a pre-seeded queue, never touching the network. Public
/// (under `#[cfg(test)]`) so the session coordinator's own tests can drive
/// it too.
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A queued reply. `Pending` never resolves on its own, modeling a
    /// request the CM is still holding open; it only completes if the
    /// handle's cancellation token is triggered, same as `ReqwestHttpSender`.
    enum QueuedResponse {
        Ready(Result<HttpResponse>),
        Pending,
    }

    pub struct FakeHttpSender {
        pub sent: Mutex<Vec<Body>>,
        responses: Mutex<std::collections::VecDeque<QueuedResponse>>,
        pub destroyed: AtomicUsize,
    }

    impl FakeHttpSender {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                responses: Mutex::new(std::collections::VecDeque::new()),
                destroyed: AtomicUsize::new(0),
            }
        }

        /// Queue a 200-status response carrying `body`.
        pub fn push_ok(&self, body: Body) {
            self.push_response(Ok(HttpResponse { body, status: 200 }));
        }

        pub fn push_response(&self, response: Result<HttpResponse>) {
            self.responses.lock().unwrap().push_back(QueuedResponse::Ready(response));
        }

        /// Queue a reply that never arrives, so the exchange it's consumed
        /// by stays outstanding for the lifetime of this sender.
        pub fn push_pending(&self) {
            self.responses.lock().unwrap().push_back(QueuedResponse::Pending);
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        pub fn sent_bodies(&self) -> Vec<Body> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Default for FakeHttpSender {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HttpSender for FakeHttpSender {
        fn init(&self) -> Result<()> {
            Ok(())
        }

        fn send(&self, body: Body) -> ResponseHandle {
            self.sent.lock().unwrap().push(body);
            let (tx, rx) = oneshot::channel();
            let cancel = CancellationToken::new();
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(QueuedResponse::Ready(result)) => {
                    let _ = tx.send(result);
                }
                Some(QueuedResponse::Pending) => {
                    let cancel_clone = cancel.clone();
                    tokio::spawn(async move {
                        cancel_clone.cancelled().await;
                        let _ = tx.send(Err(BoshError::InterruptedWait.into()));
                    });
                }
                None => {
                    let _ = tx.send(Err(BoshError::Transport("no fake response queued".into()).into()));
                }
            }
            ResponseHandle { receiver: rx, cancel }
        }

        fn destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeHttpSender;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn fake_sender_returns_queued_response() {
        let sender = FakeHttpSender::new();
        let reply = Body::builder().attr("rid", "1").build();
        sender.push_ok(reply.clone());

        let handle = sender.send(Body::builder().attr("rid", "1").build());
        let got = handle.wait().await.unwrap();
        assert_eq!(got.body, reply);
        assert_eq!(got.status, 200);
        assert_eq!(sender.sent_count(), 1);
    }

    #[tokio::test]
    async fn abort_before_response_arrives_yields_interrupted_wait() {
        let sender = ReqwestHttpSender::new(
            url::Url::parse("http://127.0.0.1:1/nonexistent-bosh-endpoint").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();

        let handle = sender.send(Body::builder().attr("rid", "1").build());
        handle.abort();
        let result = handle.wait().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_tracked() {
        let sender = FakeHttpSender::new();
        sender.destroy();
        sender.destroy();
        assert_eq!(sender.destroyed.load(Ordering::SeqCst), 2);
    }
}
