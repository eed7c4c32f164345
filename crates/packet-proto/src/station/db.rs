//! In-memory station database with a gzip-compressed-JSON snapshot (spec C6, §4.5).
//!
//! Grounded on the teacher's persistence-free `snapshot.rs` (an in-memory `BTreeMap`
//! keyed by station id) for the record-update shape, and on the crate's own `flate2` +
//! `serde_json` dependencies (carried specifically for this snapshot) for the on-disk
//! form: a single gzip-compressed JSON document, written to a temp file and renamed into
//! place so a reader never observes a half-written snapshot.
use crate::aprs::status::StatusReport;
use crate::callsign::Callsign;
use crate::error::{Result, StationError};
use crate::station::record::{PositionEntry, ReceptionEvent, Station, WeatherEntry};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::warn;

/// On-disk schema version. Bumped whenever the snapshot's shape changes incompatibly.
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default)]
pub struct StationDb {
    stations: HashMap<Callsign, Station>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    schema_version: u32,
    stations: Vec<Station>,
}

impl StationDb {
    pub fn new() -> Self {
        Self {
            stations: HashMap::new(),
        }
    }

    fn entry(&mut self, call: Callsign, timestamp: f64) -> &mut Station {
        self.stations
            .entry(call)
            .or_insert_with(|| Station::new(call, timestamp))
    }

    /// Inserts a new station or updates the existing one; appends `event` to its
    /// reception list and returns the updated record.
    pub fn record_reception(&mut self, call: Callsign, event: ReceptionEvent) -> &Station {
        let station = self.entry(call, event.timestamp);
        station.push_reception(event);
        station
    }

    pub fn record_position(&mut self, call: Callsign, entry: PositionEntry) {
        self.entry(call, entry.timestamp).push_position(entry);
    }

    pub fn record_weather(&mut self, call: Callsign, entry: WeatherEntry) {
        self.entry(call, entry.timestamp).push_weather(entry);
    }

    pub fn record_status(&mut self, call: Callsign, status: StatusReport, timestamp: f64) {
        self.entry(call, timestamp).last_status = Some(status);
    }

    /// Classifies `call` as a digipeater, per the bootstrap rule in §9: a station is
    /// only ever classified this way, never un-classified.
    pub fn mark_digipeater(&mut self, call: Callsign, timestamp: f64) {
        self.entry(call, timestamp).is_digipeater = true;
    }

    pub fn mark_weather_station(&mut self, call: Callsign, timestamp: f64) {
        self.entry(call, timestamp).is_weather_station = true;
    }

    pub fn mark_object(&mut self, call: Callsign, timestamp: f64) {
        self.entry(call, timestamp).is_object = true;
    }

    pub fn record_digipeat(&mut self, call: Callsign, timestamp: f64) {
        let station = self.entry(call, timestamp);
        station.is_digipeater = true;
        station.digipeat_stats.packets_relayed += 1;
    }

    pub fn is_digipeater(&self, call: &Callsign) -> bool {
        self.stations.get(call).is_some_and(|s| s.is_digipeater)
    }

    pub fn get(&self, call: &Callsign) -> Option<&Station> {
        self.stations.get(call)
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Removes every station whose `last_heard` is older than `max_age_secs` relative
    /// to `now`. Returns the number of stations removed.
    pub fn prune(&mut self, now: f64, max_age_secs: f64) -> usize {
        let before = self.stations.len();
        self.stations
            .retain(|_, station| now - station.last_heard <= max_age_secs);
        before - self.stations.len()
    }

    /// Serializes the database to `path` as gzip-compressed JSON, via a temp file and
    /// an atomic rename so a concurrent reader never sees a partial write.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = SnapshotFile {
            schema_version: SCHEMA_VERSION,
            stations: self.stations.values().cloned().collect(),
        };
        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;

        let tmp_path = path.with_extension("tmp");
        let file = File::create(&tmp_path)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        Ok(())
    }

    /// Loads a database previously written by [`Self::save`]. Tolerant: unknown fields
    /// are ignored by `serde`, and a station entry that fails to deserialize is skipped
    /// with a warning rather than failing the whole load.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| StationError::PersistenceError(e.to_string()))?;
        let mut decoder = GzDecoder::new(file);
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;

        let raw: serde_json::Value = serde_json::from_slice(&json)
            .map_err(|e| StationError::PersistenceError(e.to_string()))?;
        let station_values = raw
            .get("stations")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut db = StationDb::new();
        for value in station_values {
            match serde_json::from_value::<Station>(value) {
                Ok(station) => {
                    db.stations.insert(station.callsign, station);
                }
                Err(e) => warn!("skipping unparseable station record in snapshot: {e}"),
            }
        }
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::record::PacketType;
    use std::str::FromStr;
    use tempfile_fallback::TempPath;

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
    fn record_reception_creates_and_updates_station() {
        let mut db = StationDb::new();
        let call = Callsign::from_str("K1ABC-9").unwrap();
        db.record_reception(call, event(100.0));
        db.record_reception(call, event(105.0));
        let station = db.get(&call).unwrap();
        assert_eq!(station.first_heard, 100.0);
        assert_eq!(station.last_heard, 105.0);
        assert_eq!(station.receptions.len(), 2);
    }

    #[test]
    fn prune_removes_stale_stations_only() {
        let mut db = StationDb::new();
        let fresh = Callsign::from_str("K1ABC").unwrap();
        let stale = Callsign::from_str("K1OLD").unwrap();
        db.record_reception(fresh, event(1_000_000.0));
        db.record_reception(stale, event(0.0));
        let removed = db.prune(1_000_000.0, 86_400.0);
        assert_eq!(removed, 1);
        assert!(db.get(&fresh).is_some());
        assert!(db.get(&stale).is_none());
    }

    #[test]
    fn save_and_load_round_trips() {
        let mut db = StationDb::new();
        let call = Callsign::from_str("K1ABC-9").unwrap();
        db.record_reception(call, event(100.0));
        db.mark_digipeater(call, 100.0);

        let path = TempPath::new("packet-proto-station-db-test.gz");
        db.save(path.as_path()).unwrap();
        let loaded = StationDb::load(path.as_path()).unwrap();

        let station = loaded.get(&call).unwrap();
        assert_eq!(station.receptions.len(), 1);
        assert!(station.is_digipeater);
    }

    mod tempfile_fallback {
        use std::path::{Path, PathBuf};

        /// Minimal scoped-temp-file helper so the snapshot round-trip test doesn't need
        /// an extra dev-dependency: unique-per-test path under `std::env::temp_dir()`,
        /// removed on drop.
        pub struct TempPath(PathBuf);

        impl TempPath {
            pub fn new(name: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("{name}.{}", std::process::id()));
                TempPath(path)
            }

            pub fn as_path(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
                let _ = std::fs::remove_file(self.0.with_extension("tmp"));
            }
        }
    }
}
