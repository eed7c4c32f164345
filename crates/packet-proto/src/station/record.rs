//! Station record types (spec §3, C6): reception events and position/weather history.
use crate::aprs::status::StatusReport;
use crate::aprs::weather::WeatherReport;
use crate::callsign::Callsign;
use serde::{Deserialize, Serialize};

/// Tags a reception by which APRS dispatch target produced it, for history display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
    Position,
    MicE,
    Message,
    Weather,
    Status,
    Object,
    Item,
    Telemetry,
    ThirdParty,
    Unknown,
}

/// How many times a packet was digipeated before we heard it, per §3: 0 is direct RF,
/// 1..7 is a hop count, 999 marks an igated/third-party packet (never a real hop count).
pub const HOP_IGATED: u16 = 999;

/// A single heard-packet event, appended to a station's reception list in receive order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptionEvent {
    pub timestamp: f64,
    pub hop_count: u16,
    pub direct_rf: bool,
    pub relay: Option<Callsign>,
    pub path: Vec<Callsign>,
    pub packet_type: PacketType,
    pub frame_ref: Option<u64>,
}

impl ReceptionEvent {
    pub fn is_igated(&self) -> bool {
        self.hop_count == HOP_IGATED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub symbol_table: char,
    pub symbol_code: char,
    pub comment: String,
    pub hop_count: u16,
    pub direct_rf: bool,
    pub relay: Option<Callsign>,
    pub path: Vec<Callsign>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherEntry {
    pub timestamp: f64,
    pub report: WeatherReport,
}

/// Digipeater-activity counters for a station classified as a digipeater (spec §3,
/// `digipeater-activity statistics`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigipeatStats {
    pub packets_relayed: u64,
}

/// Caps applied to each history list (spec §4.5 Retention).
pub const MAX_POSITIONS: usize = 100;
pub const MAX_WEATHER: usize = 100;
pub const MAX_RECEPTIONS: usize = 500;

/// A heard station, keyed by its full callsign in [`crate::station::StationDb`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub callsign: Callsign,
    pub first_heard: f64,
    pub last_heard: f64,
    /// Newest-first.
    pub receptions: Vec<ReceptionEvent>,
    /// Newest-first.
    pub positions: Vec<PositionEntry>,
    /// Newest-first.
    pub weather: Vec<WeatherEntry>,
    pub last_status: Option<StatusReport>,
    pub digipeat_stats: DigipeatStats,
    pub is_digipeater: bool,
    pub is_weather_station: bool,
    pub is_object: bool,
}

impl Station {
    pub fn new(callsign: Callsign, timestamp: f64) -> Self {
        Station {
            callsign,
            first_heard: timestamp,
            last_heard: timestamp,
            receptions: Vec::new(),
            positions: Vec::new(),
            weather: Vec::new(),
            last_status: None,
            digipeat_stats: DigipeatStats::default(),
            is_digipeater: false,
            is_weather_station: false,
            is_object: false,
        }
    }

    pub(crate) fn push_reception(&mut self, event: ReceptionEvent) {
        if event.timestamp > self.last_heard {
            self.last_heard = event.timestamp;
        }
        self.receptions.insert(0, event);
        self.receptions.truncate(MAX_RECEPTIONS);
    }

    /// Appends a position reading, replacing the most recent entry instead of growing
    /// the list when both fall in the same minute (spec §4.5: "deduplicated by
    /// timestamp-at-minute-granularity to tolerate bursts").
    pub(crate) fn push_position(&mut self, entry: PositionEntry) {
        let same_minute = self
            .positions
            .first()
            .is_some_and(|latest| minute_bucket(latest.timestamp) == minute_bucket(entry.timestamp));
        if same_minute {
            self.positions[0] = entry;
        } else {
            self.positions.insert(0, entry);
            self.positions.truncate(MAX_POSITIONS);
        }
    }

    pub(crate) fn push_weather(&mut self, entry: WeatherEntry) {
        let same_minute = self
            .weather
            .first()
            .is_some_and(|latest| minute_bucket(latest.timestamp) == minute_bucket(entry.timestamp));
        if same_minute {
            self.weather[0] = entry;
        } else {
            self.weather.insert(0, entry);
            self.weather.truncate(MAX_WEATHER);
        }
    }
}

fn minute_bucket(timestamp: f64) -> i64 {
    (timestamp / 60.0).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn event(ts: f64) -> ReceptionEvent {
        ReceptionEvent {
            timestamp: ts,
            hop_count: 0,
            direct_rf: true,
            relay: None,
            path: Vec::new(),
            packet_type: PacketType::Position,
            frame_ref: None,
        }
    }

    #[test]
    fn reception_list_caps_and_stays_newest_first() {
        let mut s = Station::new(Callsign::from_str("K1ABC").unwrap(), 0.0);
        for i in 0..(MAX_RECEPTIONS + 10) {
            s.push_reception(event(i as f64));
        }
        assert_eq!(s.receptions.len(), MAX_RECEPTIONS);
        assert_eq!(s.receptions[0].timestamp, (MAX_RECEPTIONS + 9) as f64);
    }

    #[test]
    fn same_minute_positions_replace_not_grow() {
        let mut s = Station::new(Callsign::from_str("K1ABC").unwrap(), 0.0);
        let base = PositionEntry {
            timestamp: 0.0,
            latitude: 1.0,
            longitude: 1.0,
            symbol_table: '/',
            symbol_code: '>',
            comment: String::new(),
            hop_count: 0,
            direct_rf: true,
            relay: None,
            path: Vec::new(),
        };
        s.push_position(base.clone());
        let mut second = base.clone();
        second.timestamp = 30.0;
        second.latitude = 2.0;
        s.push_position(second);
        assert_eq!(s.positions.len(), 1);
        assert_eq!(s.positions[0].latitude, 2.0);
    }

    #[test]
    fn distinct_minute_positions_grow_the_list() {
        let mut s = Station::new(Callsign::from_str("K1ABC").unwrap(), 0.0);
        let base = PositionEntry {
            timestamp: 0.0,
            latitude: 1.0,
            longitude: 1.0,
            symbol_table: '/',
            symbol_code: '>',
            comment: String::new(),
            hop_count: 0,
            direct_rf: true,
            relay: None,
            path: Vec::new(),
        };
        s.push_position(base.clone());
        let mut second = base;
        second.timestamp = 120.0;
        s.push_position(second);
        assert_eq!(s.positions.len(), 2);
    }
}
