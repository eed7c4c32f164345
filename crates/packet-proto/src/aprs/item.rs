//! APRS item report parsing (`)`) (spec C4, §4.3).
use crate::aprs::position::parse_position;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    pub name: String,
    pub live: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub symbol_table: char,
    pub symbol_code: char,
    pub comment: String,
}

/// Parses an item info field. `rest` excludes the leading `)` data-type byte.
///
/// Wire form: a 3-9 char name terminated by `!` (live) or `_` (killed), then the same
/// position body as a standard position report (no timestamp).
pub fn parse_item(rest: &[u8]) -> Option<ItemReport> {
    let text = std::str::from_utf8(rest).ok()?;
    let marker_pos = text.find(['!', '_'])?;
    if marker_pos < 3 || marker_pos > 9 {
        return None;
    }
    let name = text[..marker_pos].to_string();
    let live = text.as_bytes()[marker_pos] == b'!';
    let body = text[marker_pos + 1..].as_bytes();
    let pos = parse_position(b'!', body)?;
    Some(ItemReport {
        name,
        live,
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

    #[test]
    fn parses_live_item() {
        let rest = b"GATE1!4741.90N/12219.18W>";
        let item = parse_item(rest).unwrap();
        assert_eq!(item.name, "GATE1");
        assert!(item.live);
    }

    #[test]
    fn parses_killed_item() {
        let rest = b"GATE1_4741.90N/12219.18W>";
        let item = parse_item(rest).unwrap();
        assert!(!item.live);
    }

    #[test]
    fn rejects_missing_marker() {
        assert!(parse_item(b"GATE14741.90N/12219.18W>").is_none());
    }
}
