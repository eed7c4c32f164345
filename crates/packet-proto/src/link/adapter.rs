//! Connected-mode link-layer state machine (spec C7, §4.6): ties `LinkState`, the
//! V(S)/V(R) sequence counters and the retransmit queue together.
//!
//! No transport I/O lives here: carrier sense, RX hold-off against the wall clock and
//! the 500 ms retransmit-worker tick are all driven by a caller (`packet-station`) that
//! owns the clock and the transport. This module only decides *what* to send and
//! *when*, given an explicit `now`.
use crate::ax25::frame::{build_disc, build_iframe, build_rej, build_rr, build_sabm, build_ua};
use crate::ax25::{Control, Frame, SFrameType, UFrameType};
use crate::callsign::Callsign;
use crate::link::state::{in_window, LinkConfig, LinkState, RetransmitEntry};
use std::time::{Duration, Instant};
use tracing::warn;

/// Why a connected-mode session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Disc,
    Dm,
}

/// Events surfaced to whatever is driving a UI or the retry engine (spec §4.8: "link
/// established", "no response after N attempts", "disconnected by remote").
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    LinkEstablished { peer: Callsign },
    LinkFailed { peer: Callsign },
    Disconnected { peer: Callsign, reason: DisconnectReason },
    Delivered { peer: Callsign, info: Vec<u8> },
}

/// Result of feeding one inbound frame to the state machine: frames to transmit, in
/// order, and events to surface.
#[derive(Debug, Default)]
pub struct Outcome {
    pub events: Vec<InboundEvent>,
    pub to_transmit: Vec<Frame>,
}

impl Outcome {
    fn empty() -> Self {
        Outcome::default()
    }

    fn frame(frame: Frame) -> Self {
        Outcome {
            events: Vec::new(),
            to_transmit: vec![frame],
        }
    }

    fn event(event: InboundEvent) -> Self {
        Outcome {
            events: vec![event],
            to_transmit: Vec::new(),
        }
    }

    fn push_frame(&mut self, frame: Frame) {
        self.to_transmit.push(frame);
    }

    fn push_event(&mut self, event: InboundEvent) {
        self.events.push(event);
    }
}

/// A single connected-mode session (one peer at a time, per §4.6).
#[derive(Debug)]
pub struct LinkAdapter {
    mycall: Callsign,
    config: LinkConfig,
    state: LinkState,
    vs: u8,
    vr: u8,
    last_delivered_ns: Option<u8>,
    queue: Vec<RetransmitEntry>,
    rnr_paused: bool,
}

impl LinkAdapter {
    pub fn new(mycall: Callsign, config: LinkConfig) -> Self {
        LinkAdapter {
            mycall,
            config,
            state: LinkState::Disconnected,
            vs: 0,
            vr: 0,
            last_delivered_ns: None,
            queue: Vec::new(),
            rnr_paused: false,
        }
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn vs(&self) -> u8 {
        self.vs
    }

    pub fn vr(&self) -> u8 {
        self.vr
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn reset_session(&mut self) {
        self.vs = 0;
        self.vr = 0;
        self.last_delivered_ns = None;
        self.queue.clear();
        self.rnr_paused = false;
    }

    /// Begins an outbound connection: resets sequence state and returns the SABM to
    /// transmit.
    pub fn connect(&mut self, peer: Callsign) -> Frame {
        self.reset_session();
        self.state = LinkState::Connecting { peer, attempts: 1 };
        build_sabm(peer, self.mycall, &[])
    }

    /// Called when the `T_connect` timer elapses with no UA. Retransmits SABM up to
    /// `n_retry` attempts; past that, fails the connect and returns to `Disconnected`.
    pub fn retry_connect(&mut self) -> (Option<Frame>, Option<InboundEvent>) {
        match self.state {
            LinkState::Connecting { peer, attempts } if attempts < self.config.n_retry => {
                self.state = LinkState::Connecting {
                    peer,
                    attempts: attempts + 1,
                };
                (Some(build_sabm(peer, self.mycall, &[])), None)
            }
            LinkState::Connecting { peer, .. } => {
                self.state = LinkState::Disconnected;
                (None, Some(InboundEvent::LinkFailed { peer }))
            }
            _ => (None, None),
        }
    }

    /// Builds and queues an outbound I-frame. Returns `None` if not connected, or while
    /// paused by an outstanding RNR.
    pub fn send_i_frame(&mut self, info: &[u8], now: Instant) -> Option<Frame> {
        if self.rnr_paused {
            return None;
        }
        let peer = self.state.peer().filter(|_| self.state.is_connected())?;
        let ns = self.vs;
        let frame = build_iframe(peer, self.mycall, &[], ns, self.vr, true, info);
        self.queue.push(RetransmitEntry {
            ns,
            frame: frame.clone(),
            sent_at: now,
            retries: 0,
            force: false,
        });
        self.vs = self.vs.wrapping_add(1) & 0x07;
        Some(frame)
    }

    /// User-initiated disconnect: returns the DISC to transmit and tears down local
    /// session state immediately (we don't wait for the peer's UA to stop treating the
    /// link as closed).
    pub fn disconnect(&mut self) -> Option<Frame> {
        let peer = self.state.peer()?;
        let frame = build_disc(peer, self.mycall, &[]);
        self.state = LinkState::Disconnected;
        self.queue.clear();
        Some(frame)
    }

    /// Purges every queue entry acknowledged by `nr`, per the half-window rule. Returns
    /// `false` (and ignores the purge) if `nr` is outside the valid send window.
    fn purge_acknowledged(&mut self, nr: u8) -> bool {
        let old = self.queue.first().map(|e| e.ns).unwrap_or(self.vs);
        let valid = nr == self.vs || in_window(old, self.vs, nr);
        if !valid {
            warn!(nr, "N(R) outside valid send window, ignoring");
            return false;
        }
        self.queue.retain(|e| !in_window(old, nr, e.ns));
        true
    }

    fn peer_matches(&self, frame: &Frame) -> bool {
        self.state.peer() == Some(frame.source)
    }

    /// Dispatches one inbound frame against the current session state.
    pub fn on_frame(&mut self, frame: &Frame) -> Outcome {
        match frame.control {
            Control::UFrame {
                kind: UFrameType::SABM,
                ..
            } => self.on_sabm(frame),
            Control::UFrame {
                kind: UFrameType::UA,
                ..
            } => self.on_ua(frame),
            Control::UFrame {
                kind: UFrameType::DISC,
                ..
            } => self.on_disc(frame),
            Control::UFrame {
                kind: UFrameType::DM, ..
            } => self.on_dm(frame),
            Control::UFrame {
                kind: UFrameType::FRMR,
                ..
            } => self.on_frmr(frame),
            Control::UFrame {
                kind: UFrameType::UI,
                ..
            } => Outcome::empty(),
            Control::IFrame { ns, nr, pf } => self.on_iframe(frame, ns, nr, pf),
            Control::SFrame { kind, nr, pf } => self.on_sframe(frame, kind, nr, pf),
        }
    }

    fn on_sabm(&mut self, frame: &Frame) -> Outcome {
        let sender = frame.source;
        self.reset_session();
        self.state = LinkState::Connected { peer: sender };
        let mut out = Outcome::frame(build_ua(sender, self.mycall, &[]));
        out.push_event(InboundEvent::LinkEstablished { peer: sender });
        out
    }

    fn on_ua(&mut self, frame: &Frame) -> Outcome {
        if let LinkState::Connecting { peer, .. } = self.state {
            if peer == frame.source {
                self.reset_session();
                self.state = LinkState::Connected { peer };
                return Outcome::event(InboundEvent::LinkEstablished { peer });
            }
        }
        Outcome::empty()
    }

    fn on_disc(&mut self, frame: &Frame) -> Outcome {
        if !self.peer_matches(frame) {
            return Outcome::empty();
        }
        let peer = frame.source;
        self.state = LinkState::Disconnected;
        self.queue.clear();
        let mut out = Outcome::frame(build_ua(peer, self.mycall, &[]));
        out.push_event(InboundEvent::Disconnected {
            peer,
            reason: DisconnectReason::Disc,
        });
        out
    }

    fn on_dm(&mut self, frame: &Frame) -> Outcome {
        if !self.peer_matches(frame) {
            return Outcome::empty();
        }
        let peer = frame.source;
        self.state = LinkState::Disconnected;
        self.queue.clear();
        Outcome::event(InboundEvent::Disconnected {
            peer,
            reason: DisconnectReason::Dm,
        })
    }

    /// FRMR: clears the retransmit queue and resyncs V(S) to the remote's reported
    /// V(R), unconditionally (open question resolved in DESIGN.md — not gated behind a
    /// config flag).
    fn on_frmr(&mut self, frame: &Frame) -> Outcome {
        if !self.peer_matches(frame) {
            return Outcome::empty();
        }
        warn!(
            peer = %frame.source,
            info = ?frame.info,
            "received FRMR, clearing retransmit queue and resyncing V(S)"
        );
        self.queue.clear();
        if let Some(&byte1) = frame.info.get(1) {
            self.vs = (byte1 >> 5) & 0x07;
        }
        Outcome::empty()
    }

    fn on_iframe(&mut self, frame: &Frame, ns: u8, nr: u8, pf: bool) -> Outcome {
        if !self.peer_matches(frame) {
            return Outcome::empty();
        }
        let peer = frame.source;
        let mut out = Outcome::empty();
        if ns != self.vr {
            if self.last_delivered_ns == Some(ns) {
                // Duplicate of the last delivered I-frame: our RR was likely lost.
                out.push_frame(build_rr(peer, self.mycall, &[], self.vr, pf));
            } else {
                out.push_frame(build_rej(peer, self.mycall, &[], self.vr, pf));
            }
        } else {
            out.push_event(InboundEvent::Delivered {
                peer,
                info: frame.info.clone(),
            });
            self.last_delivered_ns = Some(ns);
            self.vr = ns.wrapping_add(1) & 0x07;
            out.push_frame(build_rr(peer, self.mycall, &[], self.vr, pf));
        }
        self.purge_acknowledged(nr);
        out
    }

    fn on_sframe(&mut self, frame: &Frame, kind: SFrameType, nr: u8, _pf: bool) -> Outcome {
        if !self.peer_matches(frame) {
            return Outcome::empty();
        }
        match kind {
            SFrameType::RR => {
                self.purge_acknowledged(nr);
                self.rnr_paused = false;
            }
            SFrameType::RNR => {
                self.purge_acknowledged(nr);
                self.rnr_paused = true;
            }
            SFrameType::REJ => {
                self.purge_acknowledged(nr);
                for entry in &mut self.queue {
                    entry.force = true;
                }
            }
            SFrameType::SREJ => {
                warn!("SREJ received but selective reject is not implemented, ignoring");
            }
        }
        Outcome::empty()
    }

    /// Runs one 500 ms retransmit-worker tick (spec §4.6): advances backoff for each
    /// queued entry, drops ones that exhausted their retry budget, and returns the
    /// frames due for resend. RX hold-off is checked against `last_rx_at`; carrier
    /// sense and the actual write are the caller's responsibility.
    pub fn due_retransmits(&mut self, now: Instant, last_rx_at: Option<Instant>) -> Vec<Frame> {
        if let Some(last_rx) = last_rx_at {
            if now.saturating_duration_since(last_rx) < self.config.rx_holdoff {
                return Vec::new();
            }
        }
        let config = self.config;
        let mut due = Vec::new();
        self.queue.retain_mut(|entry| {
            if entry.force {
                entry.force = false;
                entry.sent_at = now;
                entry.retries += 1;
                due.push(entry.frame.clone());
                return true;
            }
            let elapsed = now.saturating_duration_since(entry.sent_at);
            if elapsed < retransmit_timeout(&config, entry.retries) {
                return true;
            }
            if entry.retries >= config.n_max {
                warn!(ns = entry.ns, "dropping I-frame after exhausting retransmit budget");
                return false;
            }
            entry.retries += 1;
            entry.sent_at = now;
            due.push(entry.frame.clone());
            true
        });
        due
    }
}

/// `T_base * 1.5^retries + uniform(0, T_jitter)`.
fn retransmit_timeout(config: &LinkConfig, retries: u32) -> Duration {
    let base = config.t_base.as_secs_f64() * 1.5f64.powi(retries as i32);
    let jitter = rand::random::<f64>() * config.t_jitter.as_secs_f64();
    Duration::from_secs_f64(base + jitter)
}

/// Spec §4.6.1: the delay to honor before transmitting an acknowledgment, so it doesn't
/// collide with a multi-frame response still in flight.
pub fn ack_delay(txdelay: Duration, last_rx_at: Option<Instant>, now: Instant) -> Duration {
    let since_rx = last_rx_at
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(Duration::MAX);
    let budget = Duration::from_millis(1500).saturating_sub(since_rx);
    txdelay.max(budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ax25::frame::{build_dm, build_rr};
    use std::str::FromStr;
    use std::time::Duration;

    fn calls() -> (Callsign, Callsign) {
        (
            Callsign::from_str("K1ABC-9").unwrap(),
            Callsign::from_str("KB0ABC").unwrap(),
        )
    }

    #[test]
    fn outbound_connect_handshake_resets_sequence_numbers() {
        let (mycall, peer) = calls();
        let mut link = LinkAdapter::new(mycall, LinkConfig::default());
        let sabm = link.connect(peer);
        assert!(matches!(sabm.control, Control::UFrame { kind: UFrameType::SABM, .. }));
        assert!(matches!(link.state(), LinkState::Connecting { .. }));

        let ua = build_ua(mycall, peer, &[]);
        let outcome = link.on_frame(&ua);
        assert_eq!(link.state(), &LinkState::Connected { peer });
        assert_eq!(link.vs(), 0);
        assert_eq!(link.vr(), 0);
        assert_eq!(
            outcome.events,
            vec![InboundEvent::LinkEstablished { peer }]
        );
    }

    #[test]
    fn send_i_frame_then_rr_empties_the_queue() {
        let (mycall, peer) = calls();
        let mut link = LinkAdapter::new(mycall, LinkConfig::default());
        link.connect(peer);
        link.on_frame(&build_ua(mycall, peer, &[]));

        let now = Instant::now();
        let i_frame = link.send_i_frame(b"hello", now).unwrap();
        match i_frame.control {
            Control::IFrame { ns, nr, .. } => assert_eq!((ns, nr), (0, 0)),
            _ => panic!("expected I-frame"),
        }
        assert_eq!(link.queue_len(), 1);

        let rr = build_rr(mycall, peer, &[], 1, true);
        link.on_frame(&rr);
        assert_eq!(link.queue_len(), 0);
    }

    #[test]
    fn out_of_order_iframe_triggers_rej_without_advancing_vr() {
        let (mycall, peer) = calls();
        let mut link = LinkAdapter::new(mycall, LinkConfig::default());
        link.connect(peer);
        link.on_frame(&build_ua(mycall, peer, &[]));

        let i_frame = crate::ax25::frame::build_iframe(mycall, peer, &[], 2, 0, true, b"x");
        let outcome = link.on_frame(&i_frame);
        assert_eq!(link.vr(), 0);
        assert_eq!(outcome.to_transmit.len(), 1);
        match outcome.to_transmit[0].control {
            Control::SFrame { kind: SFrameType::REJ, nr, .. } => assert_eq!(nr, 0),
            _ => panic!("expected REJ"),
        }
    }

    #[test]
    fn duplicate_iframe_is_reacked_not_redelivered() {
        let (mycall, peer) = calls();
        let mut link = LinkAdapter::new(mycall, LinkConfig::default());
        link.connect(peer);
        link.on_frame(&build_ua(mycall, peer, &[]));

        let first = crate::ax25::frame::build_iframe(mycall, peer, &[], 0, 0, true, b"x");
        let outcome1 = link.on_frame(&first);
        assert_eq!(outcome1.events.len(), 1);
        assert_eq!(link.vr(), 1);

        let outcome2 = link.on_frame(&first);
        assert!(outcome2.events.is_empty());
        match outcome2.to_transmit[0].control {
            Control::SFrame { kind: SFrameType::RR, nr, .. } => assert_eq!(nr, 1),
            _ => panic!("expected RR re-ack"),
        }
    }

    #[test]
    fn rej_forces_immediate_retransmit() {
        let (mycall, peer) = calls();
        let mut link = LinkAdapter::new(mycall, LinkConfig::default());
        link.connect(peer);
        link.on_frame(&build_ua(mycall, peer, &[]));

        let now = Instant::now();
        link.send_i_frame(b"one", now).unwrap();
        let rej = crate::ax25::frame::build_rej(mycall, peer, &[], 0, true);
        link.on_frame(&rej);

        let due = link.due_retransmits(now, None);
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn frmr_clears_queue_and_resyncs_vs() {
        let (mycall, peer) = calls();
        let mut link = LinkAdapter::new(mycall, LinkConfig::default());
        link.connect(peer);
        link.on_frame(&build_ua(mycall, peer, &[]));
        link.send_i_frame(b"one", Instant::now()).unwrap();
        assert_eq!(link.queue_len(), 1);

        let mut frmr = crate::ax25::frame::build_disc(mycall, peer, &[]);
        frmr.control = Control::UFrame {
            kind: UFrameType::FRMR,
            pf: true,
        };
        frmr.info = vec![0x00, 0b010_0_0000];
        link.on_frame(&frmr);
        assert_eq!(link.queue_len(), 0);
        assert_eq!(link.vs(), 2);
    }

    #[test]
    fn retry_connect_fails_after_n_retry_attempts() {
        let (mycall, peer) = calls();
        let mut config = LinkConfig::default();
        config.n_retry = 2;
        let mut link = LinkAdapter::new(mycall, config);
        link.connect(peer);

        let (frame, event) = link.retry_connect();
        assert!(frame.is_some());
        assert!(event.is_none());

        let (frame, event) = link.retry_connect();
        assert!(frame.is_none());
        assert_eq!(event, Some(InboundEvent::LinkFailed { peer }));
        assert_eq!(link.state(), &LinkState::Disconnected);
    }

    #[test]
    fn ack_delay_respects_txdelay_floor() {
        let now = Instant::now();
        let delay = ack_delay(Duration::from_millis(50), None, now);
        assert_eq!(delay, Duration::from_millis(1500));

        let recent_rx = now - Duration::from_millis(1400);
        let delay = ack_delay(Duration::from_millis(50), Some(recent_rx), now);
        assert_eq!(delay, Duration::from_millis(100));
    }

    #[test]
    fn disc_replies_with_ua_and_disconnects() {
        let (mycall, peer) = calls();
        let mut link = LinkAdapter::new(mycall, LinkConfig::default());
        link.connect(peer);
        link.on_frame(&build_ua(mycall, peer, &[]));

        let disc = build_disc(mycall, peer, &[]);
        let outcome = link.on_frame(&disc);
        assert_eq!(link.state(), &LinkState::Disconnected);
        assert!(matches!(
            outcome.to_transmit[0].control,
            Control::UFrame { kind: UFrameType::UA, .. }
        ));
        assert_eq!(
            outcome.events,
            vec![InboundEvent::Disconnected {
                peer,
                reason: DisconnectReason::Disc
            }]
        );
    }

    #[test]
    fn dm_disconnects_silently() {
        let (mycall, peer) = calls();
        let mut link = LinkAdapter::new(mycall, LinkConfig::default());
        link.connect(peer);
        link.on_frame(&build_ua(mycall, peer, &[]));

        let dm = build_dm(mycall, peer, &[]);
        let outcome = link.on_frame(&dm);
        assert!(outcome.to_transmit.is_empty());
        assert_eq!(link.state(), &LinkState::Disconnected);
    }
}
