//! APRS third-party packet parsing (`}`) (spec C4, §4.3).
//!
//! A third-party packet carries an entire inner AX.25-monitor-format header
//! (`SRC>DST,PATH1,PATH2:info`) ahead of the inner info field. The outer frame's
//! source is the relaying station; [`aprs::classify`](super::classify) attaches it.
use crate::callsign::Callsign;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct ThirdPartyHeader {
    pub inner_source: Callsign,
    pub inner_destination: Callsign,
    pub inner_path: Vec<Callsign>,
    pub inner_info: Vec<u8>,
}

/// Parses the text header of a third-party packet. `rest` excludes the leading `}`
/// data-type byte.
pub fn parse_third_party(rest: &[u8]) -> Option<ThirdPartyHeader> {
    let text = std::str::from_utf8(rest).ok()?;
    let (header, info) = text.split_once(':')?;
    let (src, rest) = header.split_once('>')?;
    let mut parts = rest.split(',');
    let dest = parts.next()?;

    let inner_source = Callsign::from_str(src).ok()?;
    let inner_destination = Callsign::from_str(dest).ok()?;
    let inner_path = parts
        .map(Callsign::from_str)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    Some(ThirdPartyHeader {
        inner_source,
        inner_destination,
        inner_path,
        inner_info: info.as_bytes().to_vec(),
    })
}
