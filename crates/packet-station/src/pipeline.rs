//! RX pipeline (spec C9, §4.8): KISS reassembly -> link-layer dispatch -> APRS parse ->
//! duplicate check -> station database update -> digipeater evaluation -> bridge fan-out.
//!
//! Kept as a synchronous `Pipeline` so the policy (what to record, what to digipeat,
//! what to transmit back) is unit-testable without a transport; `main.rs` drives it from
//! an async loop and owns the actual socket reads/writes.
use std::time::{Duration, Instant};

use packet_proto::aprs::{self, InfoField};
use packet_proto::ax25::frame::{build_ui, decode_frame, encode_frame};
use packet_proto::ax25::{Control, Frame, UFrameType};
use packet_proto::callsign::Callsign;
use packet_proto::dedup::{DuplicateCheck, DuplicateDetector};
use packet_proto::digipeater::Digipeater;
use packet_proto::framebuffer::{Direction, FrameBuffer};
use packet_proto::kiss::{self, FrameReassembler};
use packet_proto::link::{InboundEvent, LinkAdapter};
use packet_proto::retry::MessageRetryEngine;
use packet_proto::station::{PacketType, PositionEntry, ReceptionEvent, StationDb, WeatherEntry};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::StationConfig;

/// Everything one `ingest` call produced: bytes to write back to the transport, and raw
/// KISS frames to fan out to any attached bridge server.
#[derive(Debug, Default)]
pub struct IngestResult {
    pub to_transmit: Vec<Vec<u8>>,
}

pub struct Pipeline {
    mycall: Callsign,
    monitor: bool,
    auto_ack: bool,
    unproto_path: Vec<Callsign>,
    txdelay: Duration,
    beacon_enabled: bool,
    beacon_path: Vec<Callsign>,
    beacon_symbol: (char, char),
    beacon_comment: String,
    beacon_location: Option<(f64, f64)>,
    db: StationDb,
    dedup: DuplicateDetector,
    digipeater: Digipeater,
    link: LinkAdapter,
    retry: MessageRetryEngine,
    frames: FrameBuffer,
    reassembler: FrameReassembler,
    last_rx_at: Option<Instant>,
    bridge_tx: broadcast::Sender<Vec<u8>>,
    next_msg_id: u32,
    pending_link_events: Vec<InboundEvent>,
}

impl Pipeline {
    pub fn new(config: &StationConfig) -> Result<Self, crate::config::ConfigError> {
        let mycall = config.mycall()?;
        let myalias = config.myalias();
        let unproto_path = parse_path(&config.unproto);
        let (bridge_tx, _rx) = broadcast::channel(256);

        Ok(Pipeline {
            mycall,
            monitor: config.monitor,
            auto_ack: config.auto_ack,
            unproto_path,
            txdelay: config.txdelay(),
            beacon_enabled: config.beacon,
            beacon_path: parse_path(&config.beacon_path),
            beacon_symbol: config.beacon_symbol(),
            beacon_comment: config.beacon_comment.clone(),
            beacon_location: config.beacon_location(),
            db: StationDb::new(),
            dedup: DuplicateDetector::new(),
            digipeater: Digipeater::new(mycall, myalias, config.digipeat_mode()),
            link: LinkAdapter::new(mycall, config.link_config()),
            retry: MessageRetryEngine::new(config.retry_config()),
            frames: FrameBuffer::new(packet_proto::framebuffer::DEFAULT_CAPACITY),
            reassembler: FrameReassembler::new(),
            last_rx_at: None,
            bridge_tx,
            next_msg_id: 0,
            pending_link_events: Vec::new(),
        })
    }

    /// Clones the broadcast sender bridge tasks use to get their own `Receiver` via
    /// `subscribe()`.
    pub fn bridge_sender(&self) -> broadcast::Sender<Vec<u8>> {
        self.bridge_tx.clone()
    }

    pub fn station_db(&self) -> &StationDb {
        &self.db
    }

    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frames
    }

    /// Replaces the in-memory frame ring with one restored from a snapshot, called once
    /// before the main loop starts.
    pub fn restore_frames(&mut self, frames: FrameBuffer) {
        self.frames = frames;
    }

    /// Replaces the in-memory station database with one restored from a snapshot,
    /// called once before the main loop starts.
    pub fn restore_stations(&mut self, db: StationDb) {
        self.db = db;
    }

    pub fn link(&self) -> &LinkAdapter {
        &self.link
    }

    /// Drains link-layer events accumulated since the last call, so the AGWPE server can
    /// surface "link established"/"disconnected"/"data delivered" to its owning client
    /// without holding a reference into the pipeline across an `await`.
    pub fn take_link_events(&mut self) -> Vec<InboundEvent> {
        std::mem::take(&mut self.pending_link_events)
    }

    /// AGWPE `C`/`v`/`c`: initiate an outbound connect. Rejected by the caller (the AGWPE
    /// handler) if a connection is already active, per §4.10 "single-channel".
    pub fn agwpe_connect(&mut self, peer: Callsign) -> Frame {
        self.link.connect(peer)
    }

    /// AGWPE `D`: send connected-mode data over the current session.
    pub fn agwpe_send_data(&mut self, info: &[u8], now: Instant) -> Option<Frame> {
        self.link.send_i_frame(info, now)
    }

    /// AGWPE `d`: disconnect the current session.
    pub fn agwpe_disconnect(&mut self) -> Option<Frame> {
        self.link.disconnect()
    }

    /// AGWPE `M`/`V`: unconnected-mode (UI-frame) send via an explicit digipeater path.
    pub fn agwpe_send_unproto(&mut self, to_call: Callsign, via: &[Callsign], info: &[u8]) -> Frame {
        build_ui(to_call, self.mycall, via, info)
    }

    /// AGWPE `y`/`Y`: outstanding (unacknowledged) connected-mode frame count.
    pub fn link_queue_len(&self) -> usize {
        self.link.queue_len()
    }

    pub fn link_peer(&self) -> Option<Callsign> {
        self.link.state().peer()
    }

    /// Feeds newly arrived transport bytes through reassembly and frame handling.
    /// Returns the raw KISS bytes the caller should write back to the transport.
    pub fn ingest(&mut self, raw: &[u8], now: Instant) -> IngestResult {
        let mut result = IngestResult::default();
        for payload in self.reassembler.push(raw) {
            self.last_rx_at = Some(now);
            self.frames.push(Direction::Rx, unix_seconds(now), payload.clone());
            let _ = self.bridge_tx.send(kiss::wrap(&payload, 0));

            let frame = match decode_frame(&payload) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("dropping malformed frame: {e}");
                    continue;
                }
            };
            for out_frame in self.handle_frame(&frame, now) {
                let bytes = kiss::wrap(&encode_frame(&out_frame), 0);
                self.frames.push(Direction::Tx, unix_seconds(now), encode_frame(&out_frame));
                result.to_transmit.push(bytes);
            }
        }
        result
    }

    /// Runs one scheduling tick: link-layer retransmit worker and the message retry
    /// engine's due resends. Returns frames to transmit.
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        let mut out = self.link.due_retransmits(now, self.last_rx_at);
        for (to_call, text, msg_id) in self.retry.due_resends(now) {
            out.push(self.build_message_frame(to_call, &text, msg_id.as_deref()));
        }
        out
    }

    /// Fires when the outbound `T_connect` timer elapses with no UA yet seen. Only does
    /// anything while the link is mid-connect; returns the retried SABM, if any, to
    /// transmit.
    pub fn connect_retry_tick(&mut self) -> Option<Frame> {
        if !matches!(self.link.state(), packet_proto::link::LinkState::Connecting { .. }) {
            return None;
        }
        let (frame, event) = self.link.retry_connect();
        if let Some(event) = event {
            if let InboundEvent::LinkFailed { peer } = &event {
                warn!(%peer, "connect attempt abandoned after repeated unanswered SABM");
            }
            self.pending_link_events.push(event);
        }
        frame
    }

    /// Submits an outbound APRS message for tracking by the retry engine and returns the
    /// frame to transmit immediately.
    pub fn send_message(&mut self, to_call: Callsign, text: &str, now: Instant) -> Frame {
        let msg_id = self.next_msg_id.to_string();
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        self.retry
            .submit(to_call, text.to_string(), Some(msg_id.clone()), now);
        self.build_message_frame(to_call, text, Some(&msg_id))
    }

    /// Builds this station's periodic position beacon, if `beacon = true` and a
    /// `mylocation` is configured. `main.rs` transmits the result on its own interval
    /// timer; the pipeline only knows how to construct the frame.
    pub fn build_beacon(&self) -> Option<Frame> {
        if !self.beacon_enabled {
            return None;
        }
        let (lat, lon) = self.beacon_location?;
        let (table, code) = self.beacon_symbol;
        let body = format!(
            "!{}",
            aprs::position::format_position(lat, lon, table, code, &self.beacon_comment)
        );
        Some(build_ui(self.mycall, self.mycall, &self.beacon_path, body.as_bytes()))
    }

    fn build_message_frame(&self, to_call: Callsign, text: &str, msg_id: Option<&str>) -> Frame {
        let info = aprs::message::format_message(&to_call.to_string(), text, msg_id);
        let mut body = vec![b':'];
        body.extend_from_slice(info.as_bytes());
        build_ui(self.mycall, self.mycall, &self.unproto_path, &body)
    }

    fn handle_frame(&mut self, frame: &Frame, now: Instant) -> Vec<Frame> {
        let is_connected_mode = frame.destination.same_station(&self.mycall)
            && !matches!(
                frame.control,
                Control::UFrame { kind: UFrameType::UI, .. }
            );
        if is_connected_mode {
            return self.handle_link_frame(frame);
        }

        if let DuplicateCheck::Duplicate = self.dedup.check_at(frame.source, &frame.info, now) {
            debug!(source = %frame.source, "duplicate packet suppressed");
            return Vec::new();
        }

        let hops = frame.path.iter().filter(|c| c.repeated).count() as u16;
        let field = aprs::classify(&frame.destination, &frame.info);
        self.update_station_db(frame, &field, hops, now);

        let mut out = Vec::new();
        if let Some(copy) = self.digipeater.digipeat_frame(frame, &self.db) {
            self.db.record_digipeat(frame.source, unix_seconds(now));
            out.push(copy);
        }
        if frame.source.same_base(&self.mycall) {
            if let InfoField::Message(m) = &field {
                if let Some(id) = &m.msg_id {
                    self.retry.mark_digipeated(id);
                }
            }
        }
        if let Some(ack) = self.maybe_auto_ack(&field) {
            out.push(ack);
        }
        out
    }

    fn handle_link_frame(&mut self, frame: &Frame) -> Vec<Frame> {
        let outcome = self.link.on_frame(frame);
        for event in outcome.events {
            match &event {
                InboundEvent::LinkEstablished { peer } => info!(%peer, "link established"),
                InboundEvent::LinkFailed { peer } => warn!(%peer, "link failed to establish"),
                InboundEvent::Disconnected { peer, reason } => {
                    info!(%peer, ?reason, "link disconnected")
                }
                InboundEvent::Delivered { peer, info } => {
                    debug!(%peer, bytes = info.len(), "connected-mode data delivered")
                }
            }
            self.pending_link_events.push(event);
        }
        outcome.to_transmit
    }

    fn maybe_auto_ack(&mut self, field: &InfoField) -> Option<Frame> {
        if !self.auto_ack || !self.monitor {
            return None;
        }
        let InfoField::Message(m) = field else {
            return None;
        };
        if m.is_ack || m.is_rej {
            if let Some(id) = &m.msg_id {
                self.retry.handle_ack(id);
            }
            return None;
        }
        let addressee: Callsign = m.addressee.parse().ok()?;
        if !addressee.same_base(&self.mycall) {
            return None;
        }
        let msg_id = m.msg_id.as_deref()?;
        let info = aprs::message::format_message(&m.addressee, &format!("ack{msg_id}"), None);
        let mut body = vec![b':'];
        body.extend_from_slice(info.as_bytes());
        Some(build_ui(self.mycall, self.mycall, &self.unproto_path, &body))
    }

    fn update_station_db(&mut self, frame: &Frame, field: &InfoField, hops: u16, now: Instant) {
        let ts = unix_seconds(now);
        let relay = frame.path.iter().rev().find(|c| c.repeated).copied();
        let packet_type = match field {
            InfoField::Position(_) => PacketType::Position,
            InfoField::MicE(_) => PacketType::MicE,
            InfoField::Message(_) => PacketType::Message,
            InfoField::Weather(_) => PacketType::Weather,
            InfoField::Status(_) => PacketType::Status,
            InfoField::Object(_) => PacketType::Object,
            InfoField::Item(_) => PacketType::Item,
            InfoField::Telemetry(_) => PacketType::Telemetry,
            InfoField::ThirdParty(_) => PacketType::ThirdParty,
            InfoField::Unknown(_) => PacketType::Unknown,
        };
        self.db.record_reception(
            frame.source,
            ReceptionEvent {
                timestamp: ts,
                hop_count: hops,
                direct_rf: hops == 0,
                relay,
                path: frame.path.clone(),
                packet_type,
                frame_ref: None,
            },
        );

        match field {
            InfoField::Position(p) => {
                self.db.record_position(
                    frame.source,
                    PositionEntry {
                        timestamp: ts,
                        latitude: p.latitude,
                        longitude: p.longitude,
                        symbol_table: p.symbol_table,
                        symbol_code: p.symbol_code,
                        comment: p.comment.clone(),
                        hop_count: hops,
                        direct_rf: hops == 0,
                        relay,
                        path: frame.path.clone(),
                    },
                );
                if let Some(weather) = &p.weather {
                    self.db.mark_weather_station(frame.source, ts);
                    self.db.record_weather(
                        frame.source,
                        WeatherEntry {
                            timestamp: ts,
                            report: weather.clone(),
                        },
                    );
                }
            }
            InfoField::MicE(m) => {
                self.db.record_position(
                    frame.source,
                    PositionEntry {
                        timestamp: ts,
                        latitude: m.latitude,
                        longitude: m.longitude,
                        symbol_table: m.symbol_table,
                        symbol_code: m.symbol_code,
                        comment: m.comment.clone(),
                        hop_count: hops,
                        direct_rf: hops == 0,
                        relay,
                        path: frame.path.clone(),
                    },
                );
            }
            InfoField::Weather(w) => {
                self.db.mark_weather_station(frame.source, ts);
                self.db.record_weather(
                    frame.source,
                    WeatherEntry {
                        timestamp: ts,
                        report: w.weather.clone(),
                    },
                );
            }
            InfoField::Status(s) => self.db.record_status(frame.source, s.clone(), ts),
            InfoField::Object(_) => self.db.mark_object(frame.source, ts),
            _ => {}
        }
    }
}

fn parse_path(unproto: &str) -> Vec<Callsign> {
    // "APRS via WIDE1-1,WIDE2-1" or a bare "WIDE1-1,WIDE2-1" list.
    let list = unproto.split("via").last().unwrap_or(unproto).trim();
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// `Instant` carries no wall-clock epoch, but every scheduling decision in this pipeline
/// is driven by `Instant` (so tests can advance it without sleeping); station records
/// persist Unix timestamps instead, so this converts via the offset between "now" on
/// both clocks at the point of the call.
fn unix_seconds(now: Instant) -> f64 {
    let system_now = std::time::SystemTime::now();
    let offset = now.elapsed();
    let wall = system_now - offset;
    wall.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use packet_proto::ax25::frame::build_ui;
    use std::str::FromStr;

    fn test_config() -> StationConfig {
        let mut config = StationConfig::default();
        config.mycall = "K1FSY-1".to_string();
        config
    }

    #[test]
    fn ui_position_frame_updates_station_db() {
        let mut pipeline = Pipeline::new(&test_config()).unwrap();
        let src = Callsign::from_str("KB0ABC-9").unwrap();
        let dest = Callsign::from_str("APRS").unwrap();
        let frame = build_ui(dest, src, &[], b"!4741.90N/12219.18W>test");
        let bytes = kiss::wrap(&encode_frame(&frame), 0);

        let result = pipeline.ingest(&bytes, Instant::now());
        assert!(result.to_transmit.is_empty());
        let station = pipeline.station_db().get(&src).unwrap();
        assert_eq!(station.positions.len(), 1);
    }

    #[test]
    fn duplicate_ui_frame_is_suppressed_on_second_arrival() {
        let mut pipeline = Pipeline::new(&test_config()).unwrap();
        let src = Callsign::from_str("KB0ABC-9").unwrap();
        let dest = Callsign::from_str("APRS").unwrap();
        let frame = build_ui(dest, src, &[], b"!4741.90N/12219.18W>test");
        let bytes = kiss::wrap(&encode_frame(&frame), 0);

        let now = Instant::now();
        pipeline.ingest(&bytes, now);
        pipeline.ingest(&bytes, now);
        let station = pipeline.station_db().get(&src).unwrap();
        assert_eq!(station.receptions.len(), 1);
    }

    #[test]
    fn directed_message_gets_auto_acked() {
        let mut pipeline = Pipeline::new(&test_config()).unwrap();
        let src = Callsign::from_str("KB0ABC-9").unwrap();
        let dest = Callsign::from_str("APRS").unwrap();
        let info = aprs::message::format_message("K1FSY-1", "hi", Some("5"));
        let mut body = vec![b':'];
        body.extend_from_slice(info.as_bytes());
        let frame = build_ui(dest, src, &[], &body);
        let bytes = kiss::wrap(&encode_frame(&frame), 0);

        let result = pipeline.ingest(&bytes, Instant::now());
        assert_eq!(result.to_transmit.len(), 1);
    }

    #[test]
    fn beacon_is_none_without_location_even_when_enabled() {
        let mut config = test_config();
        config.beacon = true;
        let pipeline = Pipeline::new(&config).unwrap();
        assert!(pipeline.build_beacon().is_none());
    }

    #[test]
    fn beacon_builds_a_position_ui_frame_when_configured() {
        let mut config = test_config();
        config.beacon = true;
        config.mylocation = Some("47.6985,-122.3200".to_string());
        let pipeline = Pipeline::new(&config).unwrap();
        let frame = pipeline.build_beacon().unwrap();
        assert_eq!(frame.info[0], b'!');
        assert!(matches!(frame.control, Control::UFrame { kind: UFrameType::UI, .. }));
    }

    #[test]
    fn connect_retry_tick_is_noop_while_disconnected() {
        let mut pipeline = Pipeline::new(&test_config()).unwrap();
        assert!(pipeline.connect_retry_tick().is_none());
    }

    #[test]
    fn sabm_addressed_to_us_is_routed_to_the_link_layer() {
        let mut pipeline = Pipeline::new(&test_config()).unwrap();
        let mycall = Callsign::from_str("K1FSY-1").unwrap();
        let peer = Callsign::from_str("KB0ABC-9").unwrap();
        let sabm = packet_proto::ax25::frame::build_sabm(mycall, peer, &[]);
        let bytes = kiss::wrap(&encode_frame(&sabm), 0);

        let result = pipeline.ingest(&bytes, Instant::now());
        assert_eq!(result.to_transmit.len(), 1);
        assert!(pipeline.link().state().is_connected());
    }
}
