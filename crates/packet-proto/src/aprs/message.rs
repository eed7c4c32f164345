//! APRS message parsing (`:`) (spec C4, §4.3).
use serde::{Deserialize, Serialize};

/// A decoded APRS message packet: an addressed text payload, optionally an
/// acknowledgment or rejection of a previously sent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReport {
    /// Addressee, right-trimmed (the wire form pads to 9 chars).
    pub addressee: String,
    pub text: String,
    pub msg_id: Option<String>,
    pub is_ack: bool,
    pub is_rej: bool,
}

/// Parses a message info field. `rest` excludes the leading `:` data-type byte.
pub fn parse_message(rest: &[u8]) -> Option<MessageReport> {
    // 9-char addressee, ':', text (optionally "{msgid").
    if rest.len() < 10 || rest[9] != b':' {
        return None;
    }
    let addressee = std::str::from_utf8(&rest[0..9]).ok()?.trim_end().to_string();
    let body = std::str::from_utf8(&rest[10..]).ok()?;
    let (text, msg_id) = match body.rsplit_once('{') {
        Some((t, id)) => (t.to_string(), Some(id.to_string())),
        None => (body.to_string(), None),
    };
    let is_ack = text.starts_with("ack");
    let is_rej = text.starts_with("rej");
    // For ack/rej packets, the "text" is just the marker word plus the msgid they
    // acknowledge; APRS encodes that trailing id without a `{` separator.
    let (text, msg_id) = if (is_ack || is_rej) && msg_id.is_none() {
        let marker_len = 3;
        let acked_id = text[marker_len..].to_string();
        (text[..marker_len].to_string(), Some(acked_id))
    } else {
        (text, msg_id)
    };
    Some(MessageReport {
        addressee,
        text,
        msg_id,
        is_ack,
        is_rej,
    })
}

/// Builds the wire form of a message info field (without the leading `:`).
pub fn format_message(addressee: &str, text: &str, msg_id: Option<&str>) -> String {
    let padded = format!("{addressee:<9}");
    match msg_id {
        Some(id) => format!("{padded}:{text}{{{id}"),
        None => format!("{padded}:{text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_message_with_msgid() {
        let rest = b"N0CALL   :hello{7";
        let m = parse_message(rest).unwrap();
        assert_eq!(m.addressee, "N0CALL");
        assert_eq!(m.text, "hello");
        assert_eq!(m.msg_id.as_deref(), Some("7"));
        assert!(!m.is_ack);
    }

    #[test]
    fn parses_ack() {
        let rest = b"N0CALL   :ack7";
        let m = parse_message(rest).unwrap();
        assert!(m.is_ack);
        assert_eq!(m.msg_id.as_deref(), Some("7"));
    }

    #[test]
    fn parses_rejection() {
        let rest = b"N0CALL   :rej42";
        let m = parse_message(rest).unwrap();
        assert!(m.is_rej);
        assert_eq!(m.msg_id.as_deref(), Some("42"));
    }

    #[test]
    fn format_round_trips() {
        let formatted = format_message("N0CALL", "hello", Some("7"));
        let m = parse_message(formatted.as_bytes()).unwrap();
        assert_eq!(m.addressee, "N0CALL");
        assert_eq!(m.text, "hello");
        assert_eq!(m.msg_id.as_deref(), Some("7"));
    }

    #[test]
    fn missing_colon_is_rejected() {
        assert!(parse_message(b"N0CALL   xhello").is_none());
    }
}
