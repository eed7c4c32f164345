//! APRS info-field parser (spec C4, §4.3): dispatch on the first byte, decoding into a
//! typed record. Never fails hard — an unrecognized format falls back to [`InfoField::Unknown`]
//! so the frame is still counted by the duplicate detector and station database.
pub mod item;
pub mod message;
pub mod mice;
pub mod object;
pub mod position;
pub mod status;
pub mod telemetry;
pub mod thirdparty;
pub mod weather;

use crate::callsign::Callsign;
use item::ItemReport;
use message::MessageReport;
use mice::MiceReport;
use object::ObjectReport;
use position::PositionReport;
use serde::{Deserialize, Serialize};
use status::StatusReport;
use telemetry::TelemetryReport;
use weather::WeatherReport;

/// A standalone weather-only packet (`_`): a timestamp plus the same Complete Weather
/// Report fields a position comment may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherOnlyReport {
    pub timestamp: String,
    pub weather: WeatherReport,
}

fn parse_weather_only(rest: &[u8]) -> Option<WeatherOnlyReport> {
    if rest.len() < 8 {
        return None;
    }
    let timestamp = std::str::from_utf8(&rest[0..8]).ok()?.to_string();
    let text = std::str::from_utf8(&rest[8..]).ok()?;
    let weather = weather::parse_weather(text)?;
    Some(WeatherOnlyReport { timestamp, weather })
}

/// A frame whose third-party envelope could not be recursively parsed (inner header
/// malformed, or the inner info field is itself unrecognized past one layer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThirdPartyReport {
    pub inner_source: Callsign,
    pub inner_destination: Callsign,
    pub inner_path: Vec<Callsign>,
    pub inner: Box<InfoField>,
}

/// The classified result of parsing one AX.25 info field as APRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InfoField {
    Position(PositionReport),
    MicE(MiceReport),
    Message(MessageReport),
    Weather(WeatherOnlyReport),
    Status(StatusReport),
    Object(ObjectReport),
    Item(ItemReport),
    Telemetry(TelemetryReport),
    ThirdParty(ThirdPartyReport),
    /// Format not recognized (or recognized-but-malformed); the raw bytes are kept so
    /// the frame can still be counted in duplicate detection and reception history.
    Unknown(Vec<u8>),
}

/// Classifies and decodes `info` per §4.3. `destination` is the frame's AX.25
/// destination address, needed for MIC-E (which packs part of the position there).
pub fn classify(destination: &Callsign, info: &[u8]) -> InfoField {
    let Some((&indicator, rest)) = info.split_first() else {
        return InfoField::Unknown(info.to_vec());
    };
    match indicator {
        b'!' | b'=' | b'@' | b'/' => position::parse_position(indicator, rest)
            .map(InfoField::Position)
            .unwrap_or_else(|| InfoField::Unknown(info.to_vec())),
        b'`' | b'\'' => mice::decode_mic_e(destination, rest)
            .map(InfoField::MicE)
            .unwrap_or_else(|| InfoField::Unknown(info.to_vec())),
        b':' => message::parse_message(rest)
            .map(InfoField::Message)
            .unwrap_or_else(|| InfoField::Unknown(info.to_vec())),
        b'_' => parse_weather_only(rest)
            .map(InfoField::Weather)
            .unwrap_or_else(|| InfoField::Unknown(info.to_vec())),
        b'>' => status::parse_status(rest)
            .map(InfoField::Status)
            .unwrap_or_else(|| InfoField::Unknown(info.to_vec())),
        b';' => object::parse_object(rest)
            .map(InfoField::Object)
            .unwrap_or_else(|| InfoField::Unknown(info.to_vec())),
        b')' => item::parse_item(rest)
            .map(InfoField::Item)
            .unwrap_or_else(|| InfoField::Unknown(info.to_vec())),
        b'T' if rest.first() == Some(&b'#') => telemetry::parse_telemetry(&rest[1..])
            .map(InfoField::Telemetry)
            .unwrap_or_else(|| InfoField::Unknown(info.to_vec())),
        b'}' => thirdparty::parse_third_party(rest)
            .map(|h| {
                let inner = classify(&h.inner_destination, &h.inner_info);
                InfoField::ThirdParty(ThirdPartyReport {
                    inner_source: h.inner_source,
                    inner_destination: h.inner_destination,
                    inner_path: h.inner_path,
                    inner: Box::new(inner),
                })
            })
            .unwrap_or_else(|| InfoField::Unknown(info.to_vec())),
        _ => InfoField::Unknown(info.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn classifies_position() {
        let dest = Callsign::from_str("APRS").unwrap();
        let field = classify(&dest, b"!4741.90N/12219.18W>test");
        assert!(matches!(field, InfoField::Position(_)));
    }

    #[test]
    fn classifies_message() {
        let dest = Callsign::from_str("APRS").unwrap();
        let field = classify(&dest, b":N0CALL   :hello{7");
        assert!(matches!(field, InfoField::Message(_)));
    }

    #[test]
    fn classifies_weather_only() {
        let dest = Callsign::from_str("APRS").unwrap();
        let field = classify(&dest, b"_09101530c220s004g005t077");
        assert!(matches!(field, InfoField::Weather(_)));
    }

    #[test]
    fn classifies_telemetry() {
        let dest = Callsign::from_str("APRS").unwrap();
        let field = classify(&dest, b"T#005,100,110,90,150,80,01101001");
        assert!(matches!(field, InfoField::Telemetry(_)));
    }

    #[test]
    fn classifies_third_party_recursively() {
        let dest = Callsign::from_str("APRS").unwrap();
        let info = b"}N0CALL>APRS,WIDE1-1:!4741.90N/12219.18W>test";
        let field = classify(&dest, info);
        match field {
            InfoField::ThirdParty(tp) => {
                assert_eq!(tp.inner_source.to_string(), "N0CALL");
                assert!(matches!(*tp.inner, InfoField::Position(_)));
            }
            other => panic!("expected ThirdParty, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_format_falls_back() {
        let dest = Callsign::from_str("APRS").unwrap();
        let field = classify(&dest, b"?not a known format");
        assert!(matches!(field, InfoField::Unknown(_)));
    }

    #[test]
    fn empty_info_is_unknown() {
        let dest = Callsign::from_str("APRS").unwrap();
        assert!(matches!(classify(&dest, b""), InfoField::Unknown(_)));
    }
}
