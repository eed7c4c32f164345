//! Duplicate detector (spec C5, §4.4): content-hashed suppression of repeated packets
//! within a 30 s window. Grounded on the teacher's `dedup.rs`, which keys an expiry
//! structure by message content and coalesces arrivals within a threshold — adapted here
//! from an async merge stage to a synchronous check called inline from the RX pipeline,
//! since the spec's duplicate detector is a plain lookup, not a buffering stage.
use crate::callsign::Callsign;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a (source, info) key is remembered after its last sighting.
pub const WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateCheck {
    New,
    Duplicate,
}

/// Content-hashed duplicate suppression window. Not thread-safe by itself; the RX
/// pipeline that owns it runs on a single task (see the crate-level concurrency note).
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    seen: HashMap<(Callsign, Vec<u8>), Instant>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self {
            seen: HashMap::new(),
        }
    }

    /// Evicts every entry whose last sighting is older than [`WINDOW`] relative to `now`.
    fn evict_expired(&mut self, now: Instant) {
        self.seen
            .retain(|_, last_seen| now.duration_since(*last_seen) < WINDOW);
    }

    /// Checks whether `(source, info)` has been seen within the last [`WINDOW`]. Always
    /// records the current sighting regardless of the verdict, so a later packet with
    /// the same key extends the window.
    pub fn check(&mut self, source: Callsign, info: &[u8]) -> DuplicateCheck {
        self.check_at(source, info, Instant::now())
    }

    pub fn check_at(&mut self, source: Callsign, info: &[u8], now: Instant) -> DuplicateCheck {
        self.evict_expired(now);
        let key = (source, info.to_vec());
        let verdict = if self.seen.contains_key(&key) {
            DuplicateCheck::Duplicate
        } else {
            DuplicateCheck::New
        };
        self.seen.insert(key, now);
        verdict
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
