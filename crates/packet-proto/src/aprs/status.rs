//! APRS status report parsing (`>`) (spec C4, §4.3).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub timestamp: Option<String>,
    pub text: String,
}

/// Parses a status info field. `rest` excludes the leading `>` data-type byte. A leading
/// 7-char DHM timestamp is optional and only recognized when followed by more text.
pub fn parse_status(rest: &[u8]) -> Option<StatusReport> {
    let text = std::str::from_utf8(rest).ok()?;
    if text.len() >= 7 && text.as_bytes()[6] == b'z' && text[0..6].bytes().all(|b| b.is_ascii_digit()) {
        return Some(StatusReport {
            timestamp: Some(text[0..7].to_string()),
            text: text[7..].to_string(),
        });
    }
    Some(StatusReport {
        timestamp: None,
        text: text.to_string(),
    })
}
