//! Complete Weather Report extraction, embedded either in a position comment or as a
//! standalone weather-only (`_`) packet (spec C4, §4.3).
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches `c...s...g...t...` etc. The Complete Weather Report signature is the leading
/// `cDDDsDDD` pair; everything after is optional.
static WEATHER_SIGNATURE: Lazy<Regex> = Lazy::new(|| Regex::new(r"c\d{3}s\d{3}").unwrap());

static FIELD_C: Lazy<Regex> = Lazy::new(|| Regex::new(r"c(\d{3})").unwrap());
static FIELD_S: Lazy<Regex> = Lazy::new(|| Regex::new(r"s(\d{3})").unwrap());
static FIELD_G: Lazy<Regex> = Lazy::new(|| Regex::new(r"g(\d{3})").unwrap());
static FIELD_T: Lazy<Regex> = Lazy::new(|| Regex::new(r"t(-?\d{1,3})").unwrap());
static FIELD_H: Lazy<Regex> = Lazy::new(|| Regex::new(r"h(\d{2})").unwrap());
static FIELD_B: Lazy<Regex> = Lazy::new(|| Regex::new(r"b(\d{5})").unwrap());
static FIELD_R: Lazy<Regex> = Lazy::new(|| Regex::new(r"r(\d{3})").unwrap());
static FIELD_P: Lazy<Regex> = Lazy::new(|| Regex::new(r"p(\d{3})").unwrap());
static FIELD_P_MIDNIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"P(\d{3})").unwrap());

/// Decoded Complete Weather Report fields. Every field is independently optional except
/// wind direction/speed, which gate whether the report is recognized at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub wind_dir_deg: u32,
    pub wind_speed_mph: u32,
    pub gust_mph: Option<u32>,
    pub temperature_f: Option<i32>,
    pub humidity_pct: Option<u32>,
    pub pressure_tenths_mbar: Option<u32>,
    pub rain_1h_hundredths_in: Option<u32>,
    pub rain_24h_hundredths_in: Option<u32>,
    pub rain_since_midnight_hundredths_in: Option<u32>,
}

/// Returns `true` when `text` contains the Complete Weather Report signature.
pub fn looks_like_weather(text: &str) -> bool {
    WEATHER_SIGNATURE.is_match(text)
}

fn capture_u32(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn capture_i32(re: &Regex, text: &str) -> Option<i32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Extracts weather fields from `text` (an APRS position comment or a weather-only body).
/// Returns `None` if the wind direction/speed signature is absent.
pub fn parse_weather(text: &str) -> Option<WeatherReport> {
    if !looks_like_weather(text) {
        return None;
    }
    let wind_dir_deg = capture_u32(&FIELD_C, text)?;
    let wind_speed_mph = capture_u32(&FIELD_S, text)?;
    // humidity "00" means 100% per APRS 1.01.
    let humidity_pct = capture_u32(&FIELD_H, text).map(|h| if h == 0 { 100 } else { h });
    Some(WeatherReport {
        wind_dir_deg,
        wind_speed_mph,
        gust_mph: capture_u32(&FIELD_G, text),
        temperature_f: capture_i32(&FIELD_T, text),
        humidity_pct,
        pressure_tenths_mbar: capture_u32(&FIELD_B, text),
        rain_1h_hundredths_in: capture_u32(&FIELD_R, text),
        rain_24h_hundredths_in: capture_u32(&FIELD_P, text),
        rain_since_midnight_hundredths_in: capture_u32(&FIELD_P_MIDNIGHT, text),
    })
}
