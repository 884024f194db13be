//! Background timers: the empty-request keepalive and the per-request I/O
//! timeout.
//!
//! Both are single-owner, idempotently-reschedulable countdowns. Calling
//! `schedule` while a countdown is already running cancels it and starts a
//! fresh one; this is what lets the coordinator "pet" the empty-request
//! timer on every real send without juggling handles itself.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A single idempotently-reschedulable countdown.
///
/// Dropping the `Timer` cancels any in-flight countdown; the spawned task
/// exits without firing. The countdown clears itself (so `is_armed` goes
/// back to `false`) once it fires, not just when cancelled.
pub struct Timer {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a `delay` countdown that calls `on_fire` on expiry. Any
    /// previously scheduled countdown on this timer is cancelled first, so
    /// repeated calls act as "reset the deadline", not "queue another timer".
    pub fn schedule<F, Fut>(&self, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        {
            let mut guard = self.current.lock().unwrap();
            if let Some(old) = guard.replace(token.clone()) {
                old.cancel();
            }
        }
        self.spawn_countdown(token, delay, on_fire);
    }

    /// Start a `delay` countdown only if none is currently pending; a no-op
    /// otherwise. This is the semantics the empty-request keepalive wants:
    /// an already-scheduled wakeup must not have its deadline reset by a
    /// second caller racing to schedule the same thing.
    pub fn schedule_if_absent<F, Fut>(&self, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        {
            let mut guard = self.current.lock().unwrap();
            if guard.is_some() {
                return;
            }
            *guard = Some(token.clone());
        }
        self.spawn_countdown(token, delay, on_fire);
    }

    fn spawn_countdown<F, Fut>(&self, token: CancellationToken, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let current = Arc::clone(&self.current);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // `schedule`/`schedule_if_absent` always cancel the
                    // previous token before installing a new one, so if this
                    // select resolved via the sleep branch (not cancelled),
                    // this token is still the installed one.
                    current.lock().unwrap().take();
                    on_fire().await;
                }
            }
        });
    }

    /// Cancel any in-flight countdown without scheduling a new one.
    pub fn cancel(&self) {
        if let Some(token) = self.current.lock().unwrap().take() {
            token.cancel();
        }
    }

    /// Whether a countdown is currently armed.
    pub fn is_armed(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Bundles the two session-level timers named in the concurrency model: the
/// empty-request keepalive and the per-request I/O timeout. Kept as
/// distinct `Timer`s rather than one shared one since they race
/// independently against unrelated events (an empty request firing must not
/// disarm an in-flight request's I/O timeout, and vice versa).
#[derive(Default)]
pub struct Scheduler {
    pub empty_request: Timer,
    pub io_timeout: Timer,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel both timers, e.g. on disposal.
    pub fn cancel_all(&self) {
        self.empty_request.cancel();
        self.io_timeout.cancel();
    }
}
