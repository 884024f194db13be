//! Request identifier (RID) sequence generation.
//!
//! A per-session, monotonically increasing 63-bit counter. The initial value
//! is chosen uniformly at random within a range that guarantees `rid + window`
//! never exceeds `2^53` (the largest integer an IEEE-754 double can represent
//! exactly), since some connection managers are implemented in JavaScript.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound on the number of sends a single session is expected to make;
/// used only to size the random initial-value window.
const MAX_SENDS_PER_SESSION: u64 = 1 << 20;

/// `2^53`, the largest safe integer representable exactly as an `f64`.
const JS_SAFE_INTEGER: u64 = 1 << 53;

/// Monotonic per-session RID generator.
///
/// Not `Clone`: a `RidSequence` belongs to exactly one session, and sharing
/// it is done through `Arc`, not duplication.
#[derive(Debug)]
pub struct RidSequence {
    next: AtomicU64,
}

impl RidSequence {
    /// Create a sequence with a uniformly random initial value in
    /// `[1, 2^53 - MAX_SENDS_PER_SESSION]`.
    pub fn new() -> Self {
        let upper = JS_SAFE_INTEGER - MAX_SENDS_PER_SESSION;
        let initial = rand::rng().random_range(1..=upper);
        Self::starting_at(initial)
    }

    /// Create a sequence starting at a specific value. Exposed for
    /// deterministic tests; production callers should use [`RidSequence::new`].
    pub fn starting_at(initial: u64) -> Self {
        Self {
            next: AtomicU64::new(initial),
        }
    }

    /// Return the next RID and post-increment the counter.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Peek at the value `next()` would return without consuming it.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for RidSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_increments_monotonically() {
        let seq = RidSequence::starting_at(100);
        assert_eq!(seq.next(), 100);
        assert_eq!(seq.next(), 101);
        assert_eq!(seq.next(), 102);
    }

    #[test]
    fn peek_does_not_consume() {
        let seq = RidSequence::starting_at(5);
        assert_eq!(seq.peek(), 5);
        assert_eq!(seq.peek(), 5);
        assert_eq!(seq.next(), 5);
        assert_eq!(seq.peek(), 6);
    }

    #[test]
    fn random_initial_value_is_in_safe_range() {
        for _ in 0..64 {
            let seq = RidSequence::new();
            let first = seq.peek();
            assert!(first >= 1);
            assert!(first + MAX_SENDS_PER_SESSION <= JS_SAFE_INTEGER);
        }
    }

    #[test]
    fn concurrent_next_calls_never_repeat() {
        use std::sync::Arc;
        let seq = Arc::new(RidSequence::starting_at(1));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let seq = Arc::clone(&seq);
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| seq.next()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total, "RIDs must never repeat across threads");
    }
}
