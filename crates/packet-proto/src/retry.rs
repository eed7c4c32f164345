//! Message retry engine (spec C10, §4.9): resends unacknowledged outbound APRS
//! messages on a two-tier fast/slow schedule and tracks delivery/acknowledgment.
use crate::callsign::Callsign;
use std::time::{Duration, Instant};

/// Tuning parameters (spec §4.9, §6 `retry`/`retry_fast`/`retry_slow`).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub t_fast: Duration,
    pub t_slow: Duration,
    pub n_max: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            t_fast: Duration::from_secs(20),
            t_slow: Duration::from_secs(600),
            n_max: 3,
        }
    }
}

/// State tracked per outbound message (spec §4.9).
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub to_call: Callsign,
    pub text: String,
    /// `None` for ACK messages, which are retried but don't expect an ack of their own.
    pub msg_id: Option<String>,
    pub sent_at: Instant,
    pub retries: u32,
    pub digipeated: bool,
    pub acked: bool,
    pub failed: bool,
}

impl OutboundMessage {
    fn is_settled(&self) -> bool {
        self.acked || self.failed
    }
}

#[derive(Debug)]
pub struct MessageRetryEngine {
    config: RetryConfig,
    outstanding: Vec<OutboundMessage>,
}

impl MessageRetryEngine {
    pub fn new(config: RetryConfig) -> Self {
        MessageRetryEngine {
            config,
            outstanding: Vec::new(),
        }
    }

    pub fn submit(&mut self, to_call: Callsign, text: String, msg_id: Option<String>, now: Instant) {
        self.outstanding.push(OutboundMessage {
            to_call,
            text,
            msg_id,
            sent_at: now,
            retries: 0,
            digipeated: false,
            acked: false,
            failed: false,
        });
    }

    /// Marks the message carrying `msg_id` as digipeated — proof (an RX of our own
    /// message ID within the duplicate window) that it reached the network.
    pub fn mark_digipeated(&mut self, msg_id: &str) {
        for m in &mut self.outstanding {
            if m.msg_id.as_deref() == Some(msg_id) {
                m.digipeated = true;
            }
        }
    }

    /// Handles an inbound ack-message addressed to us: marks the matching outstanding
    /// message acked (terminal).
    pub fn handle_ack(&mut self, acked_msg_id: &str) {
        for m in &mut self.outstanding {
            if m.msg_id.as_deref() == Some(acked_msg_id) {
                m.acked = true;
            }
        }
    }

    /// Runs one 5 s scheduling tick (spec §4.9): returns `(to_call, text, msg_id)` for
    /// every message due for resend, in submission order.
    pub fn due_resends(&mut self, now: Instant) -> Vec<(Callsign, String, Option<String>)> {
        let mut due = Vec::new();
        for m in &mut self.outstanding {
            if m.is_settled() {
                continue;
            }
            let interval_elapsed = if !m.digipeated {
                now.saturating_duration_since(m.sent_at) >= self.config.t_fast
            } else {
                !m.acked && now.saturating_duration_since(m.sent_at) >= self.config.t_slow
            };
            if !interval_elapsed {
                continue;
            }
            if m.retries >= self.config.n_max {
                m.failed = true;
                continue;
            }
            m.retries += 1;
            m.sent_at = now;
            due.push((m.to_call, m.text.clone(), m.msg_id.clone()));
        }
        due
    }

    pub fn outstanding(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.outstanding.iter()
    }

    /// Drops settled entries older than `retain_age`, so the outstanding list doesn't
    /// grow without bound once messages are acked or failed.
    pub fn prune_settled(&mut self, now: Instant, retain_age: Duration) {
        self.outstanding.retain(|m| {
            !m.is_settled() || now.saturating_duration_since(m.sent_at) < retain_age
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn peer() -> Callsign {
        Callsign::from_str("KB0ABC-9").unwrap()
    }

    #[test]
    fn not_yet_due_before_fast_interval_elapses() {
        let mut engine = MessageRetryEngine::new(RetryConfig::default());
        let now = Instant::now();
        engine.submit(peer(), "hello".into(), Some("1".into()), now);
        assert!(engine.due_resends(now + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn fast_resend_before_digipeated() {
        let mut engine = MessageRetryEngine::new(RetryConfig::default());
        let now = Instant::now();
        engine.submit(peer(), "hello".into(), Some("1".into()), now);
        let due = engine.due_resends(now + Duration::from_secs(21));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, "hello");
        assert_eq!(engine.outstanding().next().unwrap().retries, 1);
    }

    #[test]
    fn digipeated_message_waits_for_slow_interval() {
        let mut engine = MessageRetryEngine::new(RetryConfig::default());
        let now = Instant::now();
        engine.submit(peer(), "hello".into(), Some("1".into()), now);
        engine.mark_digipeated("1");

        // Past the fast interval but not the slow one: no resend.
        assert!(engine.due_resends(now + Duration::from_secs(21)).is_empty());

        let due = engine.due_resends(now + Duration::from_secs(601));
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn ack_stops_further_resends() {
        let mut engine = MessageRetryEngine::new(RetryConfig::default());
        let now = Instant::now();
        engine.submit(peer(), "hello".into(), Some("1".into()), now);
        engine.handle_ack("1");
        assert!(engine
            .due_resends(now + Duration::from_secs(3600))
            .is_empty());
        assert!(engine.outstanding().next().unwrap().acked);
    }

    #[test]
    fn exhausted_retries_mark_failed() {
        let mut config = RetryConfig::default();
        config.n_max = 1;
        let mut engine = MessageRetryEngine::new(config);
        let now = Instant::now();
        engine.submit(peer(), "hello".into(), Some("1".into()), now);

        let t1 = now + Duration::from_secs(21);
        assert_eq!(engine.due_resends(t1).len(), 1);
        let t2 = t1 + Duration::from_secs(21);
        assert!(engine.due_resends(t2).is_empty());
        assert!(engine.outstanding().next().unwrap().failed);
    }

    #[test]
    fn prune_settled_removes_old_acked_entries() {
        let mut engine = MessageRetryEngine::new(RetryConfig::default());
        let now = Instant::now();
        engine.submit(peer(), "hello".into(), Some("1".into()), now);
        engine.handle_ack("1");
        engine.prune_settled(now + Duration::from_secs(120), Duration::from_secs(60));
        assert_eq!(engine.outstanding().count(), 0);
    }
}
