//! New-paradigm APRS digipeating (spec C8, §4.7): admission test, path rewrite, and
//! the SELF-mode courtesy-relay variant.
//!
//! Grounded on `original_source/src/digipeater.py`'s admission/rewrite split and its
//! per-path-type statistics counters.
use crate::ax25::frame::Frame;
use crate::callsign::Callsign;
use crate::station::StationDb;

/// Digipeating policy, per §4.7's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigipeatMode {
    Off,
    On,
    /// Only relay packets that involve our own base callsign, either as the originator
    /// or as a directed recipient.
    SelfOnly,
}

/// Which hop in the path gets consumed, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAction {
    /// Normal WIDEn-N / mycall-hop consumption at `filler_index`.
    Relay { filler_index: usize },
    /// SELF-mode courtesy relay: insert `mycall*` right after the last already-consumed
    /// hop (`insert_index`), with no WIDE decrement.
    Courtesy { insert_index: usize },
}

/// Per-path-type relay counters (supplement, grounded in `original_source/src/digipeater.py`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigipeaterStats {
    pub packets_digipeated: u64,
    pub wide1_1: u64,
    pub wide2_2: u64,
    pub wide2_1: u64,
    pub direct: u64,
    pub courtesy: u64,
    pub other: u64,
}

#[derive(Debug)]
pub struct Digipeater {
    mycall: Callsign,
    myalias: Option<Callsign>,
    mode: DigipeatMode,
    stats: DigipeaterStats,
}

fn hop_count(path: &[Callsign]) -> u16 {
    path.iter().filter(|c| c.repeated).count() as u16
}

/// Parses a `WIDEn-N` path entry into `(n, N)`, e.g. `WIDE2-1` -> `(2, 1)`.
fn parse_wide(call: &Callsign) -> Option<(u8, u8)> {
    let digits = call.base().strip_prefix("WIDE")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, call.ssid))
}

fn wide_callsign(n: u8, hops: u8) -> Callsign {
    Callsign::new(&format!("WIDE{n}"), hops).expect("WIDEn callsign is always valid")
}

fn message_addressee(info: &[u8]) -> Option<Callsign> {
    if info.first() != Some(&b':') {
        return None;
    }
    let report = crate::aprs::message::parse_message(&info[1..])?;
    report.addressee.parse().ok()
}

impl Digipeater {
    pub fn new(mycall: Callsign, myalias: Option<Callsign>, mode: DigipeatMode) -> Self {
        Digipeater {
            mycall,
            myalias,
            mode,
            stats: DigipeaterStats::default(),
        }
    }

    pub fn stats(&self) -> &DigipeaterStats {
        &self.stats
    }

    /// Exact match including SSID.
    fn is_mycall(&self, call: &Callsign) -> bool {
        call.same_station(&self.mycall)
    }

    /// mycall (exact) or myalias (any SSID).
    fn is_mycall_or_alias(&self, call: &Callsign) -> bool {
        self.is_mycall(call) || self.myalias.is_some_and(|alias| call.same_base(&alias))
    }

    /// Admission test (spec §4.7 `should_digipeat`). Returns the rewrite plan, or
    /// `None` if this frame must not be repeated.
    pub fn should_digipeat(&self, frame: &Frame, db: &StationDb) -> Option<PathAction> {
        if self.mode == DigipeatMode::Off {
            return None;
        }

        let path = &frame.path;
        let hops = hop_count(path);

        let addressee_base_match = message_addressee(&frame.info)
            .is_some_and(|addressee| addressee.same_base(&self.mycall));
        let dest_base_match = frame.destination.same_base(&self.mycall);

        let self_inbound = self.mode == DigipeatMode::SelfOnly
            && (dest_base_match || addressee_base_match)
            && frame.destination.ssid != self.mycall.ssid
            && !frame.source.same_base(&self.mycall);
        let self_outbound =
            self.mode == DigipeatMode::SelfOnly && frame.source.same_base(&self.mycall) && hops == 0;

        // Rule 2: already digipeated, unless this is the SELF courtesy-relay case.
        if hops > 0 && !self_inbound {
            return None;
        }
        // Rule 3: source is a known digipeater, unless SELF-inbound-to-us.
        if db.is_digipeater(&frame.source) && !self_inbound {
            return None;
        }
        // Rule 4: our own packet.
        if self.is_mycall(&frame.source) {
            return None;
        }
        // Rule 5: SELF mode requires our base callsign to be involved one way or the other.
        if self.mode == DigipeatMode::SelfOnly && !(self_inbound || self_outbound) {
            return None;
        }

        if self_inbound {
            // Last-mile delivery: exempt from the path-viability check (rule 6).
            let insert_index = path.iter().rposition(|c| c.repeated).map(|i| i + 1).unwrap_or(0);
            return Some(PathAction::Courtesy { insert_index });
        }

        // Rule 6: path must contain an unconsumed viable hop.
        let filler_index = path.iter().position(|c| {
            !c.repeated && (parse_wide(c).is_some_and(|(_, n)| n >= 1) || self.is_mycall_or_alias(c))
        })?;
        Some(PathAction::Relay { filler_index })
    }

    /// Rewrites `path` per `action` (spec §4.7 "Path rewrite").
    fn rewrite_path(&self, path: &[Callsign], action: PathAction) -> Vec<Callsign> {
        match action {
            PathAction::Relay { filler_index } => {
                let filler = path[filler_index];
                let mut out = path[..filler_index].to_vec();
                out.push(self.mycall.with_repeated(true));
                if let Some((n, hops)) = parse_wide(&filler) {
                    let remaining = if hops <= 1 {
                        wide_callsign(n, 0).with_repeated(true)
                    } else {
                        wide_callsign(n, hops - 1)
                    };
                    out.push(remaining);
                }
                out.extend_from_slice(&path[filler_index + 1..]);
                out
            }
            PathAction::Courtesy { insert_index } => {
                let mut out = path[..insert_index].to_vec();
                out.push(self.mycall.with_repeated(true));
                out.extend_from_slice(&path[insert_index..]);
                out
            }
        }
    }

    fn path_label(action: PathAction, original_filler: Option<Callsign>) -> &'static str {
        match action {
            PathAction::Courtesy { .. } => "Courtesy",
            PathAction::Relay { .. } => match original_filler.and_then(|c| parse_wide(&c)) {
                Some((1, 1)) => "WIDE1-1",
                Some((2, 2)) => "WIDE2-2",
                Some((2, 1)) => "WIDE2-1",
                Some(_) => "Other",
                None => "Direct",
            },
        }
    }

    fn record_stat(&mut self, action: PathAction, original_filler: Option<Callsign>) {
        self.stats.packets_digipeated += 1;
        match Self::path_label(action, original_filler) {
            "WIDE1-1" => self.stats.wide1_1 += 1,
            "WIDE2-2" => self.stats.wide2_2 += 1,
            "WIDE2-1" => self.stats.wide2_1 += 1,
            "Direct" => self.stats.direct += 1,
            "Courtesy" => self.stats.courtesy += 1,
            _ => self.stats.other += 1,
        }
    }

    /// Runs the admission test and, if it passes, returns the digipeated copy: same
    /// destination/control/PID/info, rewritten path. Transmitted with no retry
    /// (digipeated frames are UI by convention, per §4.7 Output).
    pub fn digipeat_frame(&mut self, frame: &Frame, db: &StationDb) -> Option<Frame> {
        let action = self.should_digipeat(frame, db)?;
        let original_filler = match action {
            PathAction::Relay { filler_index } => Some(frame.path[filler_index]),
            PathAction::Courtesy { .. } => None,
        };
        let new_path = self.rewrite_path(&frame.path, action);
        self.record_stat(action, original_filler);
        Some(Frame {
            path: new_path,
            ..frame.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ax25::frame::build_ui;
    use std::str::FromStr;

    fn path(calls: &[&str]) -> Vec<Callsign> {
        calls.iter().map(|c| Callsign::from_str(c).unwrap()).collect()
    }

    fn ui(dest: &str, src: &str, path_calls: &[&str], info: &[u8]) -> Frame {
        let dest = Callsign::from_str(dest).unwrap();
        let src = Callsign::from_str(src).unwrap();
        build_ui(dest, src, &path(path_calls), info)
    }

    #[test]
    fn off_mode_never_digipeats() {
        let digi = Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::Off);
        let frame = ui("APRS", "KB0ABC-9", &["WIDE2-2"], b"!test");
        let db = StationDb::new();
        assert!(digi.should_digipeat(&frame, &db).is_none());
    }

    #[test]
    fn relays_wide2_2_decrementing_to_wide2_1() {
        let digi = Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::On);
        let frame = ui("APRS", "KB0ABC-9", &["WIDE2-2"], b"!test");
        let db = StationDb::new();
        let action = digi.should_digipeat(&frame, &db).unwrap();
        let new_path = digi.rewrite_path(&frame.path, action);
        assert_eq!(new_path.len(), 2);
        assert_eq!(new_path[0].to_string(), "K1FSY-1*");
        assert_eq!(new_path[1].to_string(), "WIDE2-1");
    }

    #[test]
    fn relays_wide1_1_consuming_to_wide1_star() {
        let digi = Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::On);
        let frame = ui("APRS", "KB0ABC-9", &["WIDE1-1"], b"!test");
        let db = StationDb::new();
        let action = digi.should_digipeat(&frame, &db).unwrap();
        let new_path = digi.rewrite_path(&frame.path, action);
        assert_eq!(new_path[1].to_string(), "WIDE1*");
    }

    #[test]
    fn direct_mycall_hop_is_replaced_not_duplicated() {
        let digi = Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::On);
        let frame = ui("APRS", "KB0ABC-9", &["K1FSY-1", "WIDE2-1"], b"!test");
        let db = StationDb::new();
        let action = digi.should_digipeat(&frame, &db).unwrap();
        let new_path = digi.rewrite_path(&frame.path, action);
        assert_eq!(new_path.len(), 2);
        assert_eq!(new_path[0].to_string(), "K1FSY-1*");
        assert_eq!(new_path[1].to_string(), "WIDE2-1");
    }

    #[test]
    fn already_digipeated_frame_is_refused() {
        let digi = Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::On);
        let frame = ui("APRS", "KB0ABC-9", &["WIDE2-1*", "WIDE1-1"], b"!test");
        let db = StationDb::new();
        assert!(digi.should_digipeat(&frame, &db).is_none());
    }

    #[test]
    fn own_packet_is_refused() {
        let digi = Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::On);
        let frame = ui("APRS", "K1FSY-1", &["WIDE2-1"], b"!test");
        let db = StationDb::new();
        assert!(digi.should_digipeat(&frame, &db).is_none());
    }

    #[test]
    fn known_digipeater_source_is_refused() {
        let digi = Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::On);
        let frame = ui("APRS", "KB0ABC-9", &["WIDE2-1"], b"!test");
        let mut db = StationDb::new();
        db.mark_digipeater(Callsign::from_str("KB0ABC-9").unwrap(), 0.0);
        assert!(digi.should_digipeat(&frame, &db).is_none());
    }

    #[test]
    fn self_mode_refuses_third_party_traffic() {
        let digi =
            Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::SelfOnly);
        let frame = ui("APRS", "KB0ABC-9", &["WIDE2-1"], b"!test");
        let db = StationDb::new();
        assert!(digi.should_digipeat(&frame, &db).is_none());
    }

    #[test]
    fn self_mode_relays_own_outbound_traffic_from_another_ssid() {
        // Same base callsign, different SSID (e.g. a second device of ours) — not the
        // exact-match "our own packet" refusal in rule 4, but still "involves our base
        // callsign, outbound" for rule 5.
        let digi =
            Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::SelfOnly);
        let frame = ui("APRS", "K1FSY-7", &["WIDE2-1"], b"!test");
        let db = StationDb::new();
        assert!(digi.should_digipeat(&frame, &db).is_some());
    }

    #[test]
    fn self_mode_courtesy_relays_inbound_directed_message() {
        let digi =
            Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::SelfOnly);
        // Already digipeated once (hops>0) and addressed to our base callsign on a
        // different SSID: last-mile courtesy relay, exempt from path-viability.
        let frame = ui(
            "K1FSY-9",
            "KB0ABC-9",
            &["WIDE2-1*"],
            b"!test",
        );
        let db = StationDb::new();
        let action = digi.should_digipeat(&frame, &db).unwrap();
        assert!(matches!(action, PathAction::Courtesy { insert_index: 1 }));
    }

    #[test]
    fn missing_viable_hop_is_refused() {
        let digi = Digipeater::new(Callsign::from_str("K1FSY-1").unwrap(), None, DigipeatMode::On);
        let frame = ui("APRS", "KB0ABC-9", &["K9XYZ"], b"!test");
        let db = StationDb::new();
        assert!(digi.should_digipeat(&frame, &db).is_none());
    }

    #[test]
    fn myalias_matches_any_ssid() {
        // "RELAY" is not a WIDEn-N entry, so this only passes rule 6 via the alias
        // base-match path, not the WIDE-viability path.
        let digi = Digipeater::new(
            Callsign::from_str("K1FSY-1").unwrap(),
            Some(Callsign::from_str("RELAY").unwrap()),
            DigipeatMode::On,
        );
        let frame = ui("APRS", "KB0ABC-9", &["RELAY-3"], b"!test");
        let db = StationDb::new();
        assert!(digi.should_digipeat(&frame, &db).is_some());
    }
}
