//! APRS object report parsing (`;`) (spec C4, §4.3).
use crate::aprs::position::parse_position;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectReport {
    pub name: String,
    pub live: bool,
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
    pub symbol_table: char,
    pub symbol_code: char,
    pub comment: String,
}

/// Parses an object info field. `rest` excludes the leading `;` data-type byte.
///
/// Wire form: 9-char name, then `*` (live) or `_` (killed), a 7-char DHM/HMS timestamp,
/// then the same position body as a standard position report.
pub fn parse_object(rest: &[u8]) -> Option<ObjectReport> {
    if rest.len() < 17 {
        return None;
    }
    let name = std::str::from_utf8(&rest[0..9]).ok()?.trim_end().to_string();
    let live = match rest[9] {
        b'*' => true,
        b'_' => false,
        _ => return None,
    };
    let timestamp = std::str::from_utf8(&rest[10..17]).ok()?.to_string();
    // Reuse the position parser's body grammar by feeding it as an `@`-style report
    // (timestamp already consumed above, so wrap with a placeholder indicator body).
    let body = &rest[17..];
    let pos = parse_position(b'!', body)?;
    Some(ObjectReport {
        name,
        live,
        timestamp,
        latitude: pos.latitude,
        longitude: pos.longitude,
        symbol_table: pos.symbol_table,
        symbol_code: pos.symbol_code,
        comment: pos.comment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn parses_live_object() {
        let rest = b"WXSPOT-1 *091234z4741.90N/12219.18W_c220s004";
        let o = parse_object(rest).unwrap();
        assert_eq!(o.name, "WXSPOT-1");
        assert!(o.live);
        assert_eq!(o.timestamp, "091234z");
        assert_abs_diff_eq!(o.latitude, 47.0 + 41.90 / 60.0, epsilon = 1e-6);
    }

    #[test]
    fn parses_killed_object() {
        let rest = b"WXSPOT-1 _091234z4741.90N/12219.18W_";
        let o = parse_object(rest).unwrap();
        assert!(!o.live);
    }
}
