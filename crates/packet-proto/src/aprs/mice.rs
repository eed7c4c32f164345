//! MIC-E position decoding (`` ` ``/`'`) (spec C4, §4.3).
//!
//! MIC-E packs latitude and a 3-bit status code into the six characters of the AX.25
//! destination address, and longitude/speed/course/symbol into the first bytes of the
//! info field. Each destination character is drawn from one of three alphabets
//! depending on position:
//!
//! - positions 1-3 (degrees tens/units, minutes tens): digit `0`-`9` (standard, bit 0)
//!   or `A`-`J`/`K` (custom, bit 1). The three bits form the 3-bit status code.
//! - positions 4-6 (minutes units, hundredths tens/units): digit `0`-`9`/`L` (bit 0)
//!   or `P`-`Y` (bit 1), additionally meaning North/long-offset/West when set.
use crate::callsign::Callsign;

/// The 3-bit MIC-E status code, recovered from which alphabet each of the first three
/// destination characters was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicEStatus {
    OffDuty,
    EnRoute,
    InService,
    Returning,
    Committed,
    Special,
    Priority,
    Emergency,
}

impl MicEStatus {
    fn from_bits(a: bool, b: bool, c: bool) -> Self {
        match (a, b, c) {
            (false, false, false) => MicEStatus::OffDuty,
            (false, false, true) => MicEStatus::EnRoute,
            (false, true, false) => MicEStatus::InService,
            (false, true, true) => MicEStatus::Returning,
            (true, false, false) => MicEStatus::Committed,
            (true, false, true) => MicEStatus::Special,
            (true, true, false) => MicEStatus::Priority,
            (true, true, true) => MicEStatus::Emergency,
        }
    }

    fn to_bits(self) -> (bool, bool, bool) {
        match self {
            MicEStatus::OffDuty => (false, false, false),
            MicEStatus::EnRoute => (false, false, true),
            MicEStatus::InService => (false, true, false),
            MicEStatus::Returning => (false, true, true),
            MicEStatus::Committed => (true, false, false),
            MicEStatus::Special => (true, false, true),
            MicEStatus::Priority => (true, true, false),
            MicEStatus::Emergency => (true, true, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MiceReport {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mph: u32,
    pub course_deg: u32,
    pub symbol_table: char,
    pub symbol_code: char,
    pub status: MicEStatus,
    pub comment: String,
}

fn digit_std(c: u8) -> Option<(u32, bool)> {
    match c {
        b'0'..=b'9' => Some(((c - b'0') as u32, false)),
        b'A'..=b'J' => Some(((c - b'A') as u32, true)),
        b'K' => Some((0, true)),
        b'L' => Some((0, false)),
        b'P'..=b'Y' => Some(((c - b'P') as u32, true)),
        b'Z' => Some((0, true)),
        _ => None,
    }
}

fn digit_dir(c: u8) -> Option<(u32, bool)> {
    match c {
        b'0'..=b'9' => Some(((c - b'0') as u32, false)),
        b'L' => Some((0, false)),
        b'P'..=b'Y' => Some(((c - b'P') as u32, true)),
        _ => None,
    }
}

fn char_std(digit: u32, custom: bool) -> u8 {
    if custom {
        b'A' + digit as u8
    } else {
        b'0' + digit as u8
    }
}

fn char_dir(digit: u32, flag: bool) -> u8 {
    if flag {
        b'P' + digit as u8
    } else {
        b'0' + digit as u8
    }
}

struct DestinationFields {
    latitude: f64,
    long_offset: bool,
    west: bool,
    status: MicEStatus,
}

fn decode_destination(dest: &Callsign) -> Option<DestinationFields> {
    let base = dest.base().as_bytes();
    if base.len() != 6 {
        return None;
    }
    let (d1, c1) = digit_std(base[0])?;
    let (d2, c2) = digit_std(base[1])?;
    let (d3, c3) = digit_std(base[2])?;
    let (d4, north) = digit_dir(base[3])?;
    let (d5, long_offset) = digit_dir(base[4])?;
    let (d6, west) = digit_dir(base[5])?;

    let degrees = (d1 * 10 + d2) as f64;
    let minutes = (d3 * 10 + d4) as f64;
    let hundredths = (d5 * 10 + d6) as f64;
    let magnitude = degrees + (minutes + hundredths / 100.0) / 60.0;

    Some(DestinationFields {
        latitude: if north { magnitude } else { -magnitude },
        long_offset,
        west,
        status: MicEStatus::from_bits(c1, c2, c3),
    })
}

/// Builds the six MIC-E destination-address characters for `latitude`/`status`, with
/// the N/S, long-offset, and E/W indicator bits set as given. `latitude` must already
/// carry its sign (negative = South).
pub fn encode_destination(latitude: f64, long_offset: bool, west: bool, status: MicEStatus) -> [u8; 6] {
    let north = latitude >= 0.0;
    let magnitude = latitude.abs();
    let degrees = magnitude.floor() as u32;
    let minutes_total = (magnitude - degrees as f64) * 60.0;
    let minutes = minutes_total.floor() as u32;
    let hundredths = ((minutes_total - minutes as f64) * 100.0).round() as u32;

    let (c1, c2, c3) = status.to_bits();
    [
        char_std(degrees / 10, c1),
        char_std(degrees % 10, c2),
        char_std(minutes / 10, c3),
        char_dir(minutes % 10, north),
        char_dir(hundredths / 10, long_offset),
        char_dir(hundredths % 10, west),
    ]
}

/// Decodes the longitude/speed/course/symbol/comment portion of a MIC-E info field.
/// `info` excludes the leading `` ` ``/`'` data-type byte.
fn decode_info(info: &[u8], long_offset: bool, west: bool) -> Option<(f64, u32, u32, char, char, String)> {
    if info.len() < 8 {
        return None;
    }
    let d = info[0].checked_sub(28)? as u32;
    let m = info[1].checked_sub(28)? as u32;
    let h = info[2].checked_sub(28)? as u32;
    let mut degrees = d;
    if long_offset {
        degrees += 100;
    }
    let minutes = if m >= 60 { m - 60 } else { m };
    let magnitude = degrees as f64 + (minutes as f64 + h as f64 / 100.0) / 60.0;
    let longitude = if west { -magnitude } else { magnitude };

    let dc = info[3].checked_sub(28)? as u32;
    let sp = info[4].checked_sub(28)? as u32;
    let se = info[5].checked_sub(28)? as u32;
    let speed_mph = sp * 10 + dc / 10;
    let course_deg = (dc % 10) * 100 + se;

    let symbol_code = info[6] as char;
    let symbol_table = info[7] as char;
    let comment = String::from_utf8_lossy(&info[8..]).into_owned();

    Some((longitude, speed_mph, course_deg, symbol_code, symbol_table, comment))
}

/// Builds the MIC-E info-field bytes (excluding the leading data-type byte) for the
/// given longitude magnitude components, speed/course, and symbol.
#[allow(clippy::too_many_arguments)]
pub fn encode_info(
    longitude: f64,
    long_offset: bool,
    speed_mph: u32,
    course_deg: u32,
    symbol_code: char,
    symbol_table: char,
    comment: &str,
) -> Vec<u8> {
    let magnitude = longitude.abs();
    let mut degrees = magnitude.floor() as u32;
    if long_offset {
        degrees -= 100;
    }
    let minutes_total = (magnitude - magnitude.floor()) * 60.0;
    let minutes = minutes_total.floor() as u32;
    let hundredths = ((minutes_total - minutes as f64) * 100.0).round() as u32;

    let dc = (speed_mph % 10) * 10 + course_deg / 100;
    let sp = speed_mph / 10;
    let se = course_deg % 100;

    let mut out = vec![
        (degrees + 28) as u8,
        (minutes + 28) as u8,
        (hundredths + 28) as u8,
        (dc + 28) as u8,
        (sp + 28) as u8,
        (se + 28) as u8,
        symbol_code as u8,
        symbol_table as u8,
    ];
    out.extend_from_slice(comment.as_bytes());
    out
}

/// Decodes a full MIC-E record from a frame's destination callsign and info field
/// (with the leading data-type byte already stripped).
pub fn decode_mic_e(dest: &Callsign, info: &[u8]) -> Option<MiceReport> {
    let fields = decode_destination(dest)?;
    let (longitude, speed_mph, course_deg, symbol_code, symbol_table, comment) =
        decode_info(info, fields.long_offset, fields.west)?;
    Some(MiceReport {
        latitude: fields.latitude,
        longitude,
        speed_mph,
        course_deg,
        symbol_table,
        symbol_code,
        status: fields.status,
        comment,
    })
}
