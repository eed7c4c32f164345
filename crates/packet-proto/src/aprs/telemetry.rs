//! APRS telemetry parsing (`T#`) (spec C4, §4.3).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub sequence: String,
    pub analog: Vec<f64>,
    pub digital_bits: Option<String>,
}

/// Parses a telemetry info field. `rest` excludes the leading `T#` data-type bytes.
///
/// Wire form: `SEQ,A1,A2,A3,A4,A5,BBBBBBBB` (comma-separated sequence id, five analog
/// channels, and an optional 8-bit digital-channel string).
pub fn parse_telemetry(rest: &[u8]) -> Option<TelemetryReport> {
    let text = std::str::from_utf8(rest).ok()?;
    let fields: Vec<&str> = text.trim().split(',').collect();
    if fields.len() < 6 {
        return None;
    }
    let sequence = fields[0].to_string();
    let analog = fields[1..6]
        .iter()
        .map(|f| f.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    let digital_bits = fields.get(6).map(|s| s.to_string());
    Some(TelemetryReport {
        sequence,
        analog,
        digital_bits,
    })
}
