//! Station database (spec C6): heard-station records, reception/position/weather
//! history, and a gzip-compressed-JSON snapshot.
pub mod db;
pub mod record;

pub use db::StationDb;
pub use record::{
    DigipeatStats, PacketType, PositionEntry, ReceptionEvent, Station, WeatherEntry, HOP_IGATED,
};
