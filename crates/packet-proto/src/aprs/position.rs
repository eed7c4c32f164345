//! APRS position report parsing (`!`/`=`/`@`/`/`) (spec C4, §4.3).
use crate::aprs::weather::{parse_weather, WeatherReport};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub latitude: f64,
    pub longitude: f64,
    pub symbol_table: char,
    pub symbol_code: char,
    pub comment: String,
    pub timestamp: Option<String>,
    pub has_weather: bool,
    pub weather: Option<WeatherReport>,
}

/// Parses `DDMM.mmN`/`DDMM.mmS` into signed decimal degrees.
fn parse_lat(s: &str) -> Option<f64> {
    if s.len() != 8 {
        return None;
    }
    let deg: f64 = s[0..2].parse().ok()?;
    let min: f64 = s[2..7].parse().ok()?;
    let hemi = s.as_bytes()[7] as char;
    let value = deg + min / 60.0;
    match hemi {
        'N' => Some(value),
        'S' | 's' => Some(-value),
        'n' => Some(value),
        _ => None,
    }
}

/// Parses `DDDMM.mmE`/`DDDMM.mmW` into signed decimal degrees.
fn parse_lon(s: &str) -> Option<f64> {
    if s.len() != 9 {
        return None;
    }
    let deg: f64 = s[0..3].parse().ok()?;
    let min: f64 = s[3..8].parse().ok()?;
    let hemi = s.as_bytes()[8] as char;
    let value = deg + min / 60.0;
    match hemi {
        'E' | 'e' => Some(value),
        'W' | 'w' => Some(-value),
        _ => None,
    }
}

/// Parses a position info field. `indicator` is the first byte (`!`/`=`/`@`/`/`); when it
/// is `@` or `/` a 7-character DHM/HMS timestamp precedes the coordinates and is skipped.
pub fn parse_position(indicator: u8, rest: &[u8]) -> Option<PositionReport> {
    let text = std::str::from_utf8(rest).ok()?;
    let (timestamp, body) = if indicator == b'@' || indicator == b'/' {
        if text.len() < 7 {
            return None;
        }
        (Some(text[0..7].to_string()), &text[7..])
    } else {
        (None, text)
    };

    // DDMM.mmN (8) + symbol table (1) + DDDMM.mmW (9) + symbol code (1) = 19 bytes minimum.
    if body.len() < 19 {
        return None;
    }
    let latitude = parse_lat(&body[0..8])?;
    let symbol_table = body.as_bytes()[8] as char;
    let longitude = parse_lon(&body[9..18])?;
    let symbol_code = body.as_bytes()[18] as char;
    let comment = body[19..].to_string();

    let weather = parse_weather(&comment);
    let has_weather = weather.is_some();

    Some(PositionReport {
        latitude,
        longitude,
        symbol_table,
        symbol_code,
        comment,
        timestamp,
        has_weather,
        weather,
    })
}

/// Formats a position report into the on-air info-field body (no leading type indicator,
/// no timestamp) — used by the codec round-trip property tests.
pub fn format_position(lat: f64, lon: f64, symbol_table: char, symbol_code: char, comment: &str) -> String {
    let lat_hemi = if lat >= 0.0 { 'N' } else { 'S' };
    let lat_abs = lat.abs();
    let lat_deg = lat_abs.floor() as u32;
    let lat_min = (lat_abs - lat_deg as f64) * 60.0;

    let lon_hemi = if lon >= 0.0 { 'E' } else { 'W' };
    let lon_abs = lon.abs();
    let lon_deg = lon_abs.floor() as u32;
    let lon_min = (lon_abs - lon_deg as f64) * 60.0;

    format!(
        "{lat_deg:02}{lat_min:05.2}{lat_hemi}{symbol_table}{lon_deg:03}{lon_min:05.2}{lon_hemi}{symbol_code}{comment}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn parses_plain_position() {
        let body = b"4741.90N/12219.18W>test comment";
        let pos = parse_position(b'!', body).unwrap();
        assert_abs_diff_eq!(pos.latitude, 47.0 + 41.90 / 60.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pos.longitude, -(122.0 + 19.18 / 60.0), epsilon = 1e-6);
        assert_eq!(pos.symbol_table, '/');
        assert_eq!(pos.symbol_code, '>');
        assert_eq!(pos.comment, "test comment");
        assert!(!pos.has_weather);
    }

    #[test]
    fn skips_timestamp_for_at_indicator() {
        let body = b"091234z4741.90N/12219.18W>hi";
        let pos = parse_position(b'@', body).unwrap();
        assert_eq!(pos.timestamp.as_deref(), Some("091234z"));
        assert_abs_diff_eq!(pos.latitude, 47.0 + 41.90 / 60.0, epsilon = 1e-6);
    }

    #[test]
    fn detects_weather_in_comment() {
        let body = b"4741.90N/12219.18W_c220s004g005t077";
        let pos = parse_position(b'!', body).unwrap();
        assert!(pos.has_weather);
        assert_eq!(pos.weather.unwrap().wind_dir_deg, 220);
    }

    #[test]
    fn format_then_parse_round_trips_within_epsilon() {
        let lat = 43.628101;
        let lon = -1.367263;
        let formatted = format_position(lat, lon, '/', '>', "");
        let parsed = parse_position(b'!', formatted.as_bytes()).unwrap();
        assert_abs_diff_eq!(parsed.latitude, lat, epsilon = 1e-2);
        assert_abs_diff_eq!(parsed.longitude, lon, epsilon = 1e-2);
    }

    #[test]
    fn round_trips_exactly_for_values_quantized_to_hundredth_minute() {
        // 47 deg 41.90 min and 122 deg 19.18 min are exact multiples of 1/100 minute,
        // so format -> parse introduces no rounding beyond float precision.
        let lat = 47.0 + 41.90 / 60.0;
        let lon = -(122.0 + 19.18 / 60.0);
        let formatted = format_position(lat, lon, '/', '>', "");
        let parsed = parse_position(b'!', formatted.as_bytes()).unwrap();
        assert_abs_diff_eq!(parsed.latitude, lat, epsilon = 1e-6);
        assert_abs_diff_eq!(parsed.longitude, lon, epsilon = 1e-6);
    }
}
