//! AX.25 address field encode/decode (spec C3, §4.2).
use crate::callsign::Callsign;
use crate::error::{Result, StationError};

const SSID_MASK: u8 = 0x1E;
const HAS_BEEN_REPEATED: u8 = 0x80;
const RESERVED_BITS: u8 = 0x60;
const EXTENSION_BIT: u8 = 0x01;

/// Encodes one 7-byte AX.25 address field.
///
/// `is_last` sets the extension bit marking this as the final address in the list.
pub fn encode_address(call: &Callsign, is_last: bool) -> [u8; 7] {
    let mut out = [0u8; 7];
    let base = call.base();
    let padded = format!("{base:<6}");
    for (i, ch) in padded.bytes().take(6).enumerate() {
        out[i] = ch << 1;
    }
    let mut ssid_byte = RESERVED_BITS | ((call.ssid << 1) & SSID_MASK);
    if call.repeated {
        ssid_byte |= HAS_BEEN_REPEATED;
    }
    if is_last {
        ssid_byte |= EXTENSION_BIT;
    }
    out[6] = ssid_byte;
    out
}

/// Decodes one 7-byte AX.25 address field. Returns `(callsign, is_last)`.
pub fn decode_address(field: &[u8; 7]) -> Result<(Callsign, bool)> {
    let mut base = String::with_capacity(6);
    for &b in &field[..6] {
        let ch = b >> 1;
        if !ch.is_ascii_graphic() && ch != b' ' {
            return Err(StationError::AddressInvalid(format!(
                "non-printable character 0x{ch:02x} in address field"
            )));
        }
        base.push(ch as char);
    }
    let trimmed = base.trim_end();
    let ssid_byte = field[6];
    let ssid = (ssid_byte & SSID_MASK) >> 1;
    let repeated = ssid_byte & HAS_BEEN_REPEATED != 0;
    let is_last = ssid_byte & EXTENSION_BIT != 0;
    let call = Callsign::new(trimmed, ssid)
        .ok_or_else(|| StationError::AddressInvalid(format!("bad callsign {trimmed:?}")))?
        .with_repeated(repeated);
    Ok((call, is_last))
}

/// Parses a variable-length address list (destination, source, 0-8 digipeaters) starting
/// at `buf[0]`. Stops at the first address with the extension bit set, or when `buf` is
/// exhausted. Returns `(addresses, offset_of_control_byte)`.
pub fn parse_address_list(buf: &[u8]) -> Result<(Vec<Callsign>, usize)> {
    let mut addresses = Vec::new();
    let mut offset = 0;
    loop {
        if offset + 7 > buf.len() {
            if addresses.len() < 2 {
                return Err(StationError::FrameMalformed(
                    "address list truncated before destination/source".into(),
                ));
            }
            break;
        }
        let mut field = [0u8; 7];
        field.copy_from_slice(&buf[offset..offset + 7]);
        let (call, is_last) = decode_address(&field)?;
        addresses.push(call);
        offset += 7;
        if is_last {
            break;
        }
        if addresses.len() > 10 {
            return Err(StationError::FrameMalformed(
                "address list exceeds destination+source+8 digipeaters".into(),
            ));
        }
    }
    Ok((addresses, offset))
}

/// Builds the address-field bytes for a full address list. The last entry in `addresses`
/// gets the extension bit.
pub fn build_address_list(addresses: &[Callsign]) -> Vec<u8> {
    let mut out = Vec::with_capacity(addresses.len() * 7);
    let last = addresses.len().saturating_sub(1);
    for (i, call) in addresses.iter().enumerate() {
        out.extend_from_slice(&encode_address(call, i == last));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn address_round_trips() {
        let call = Callsign::from_str("K1ABC-5").unwrap();
        let field = encode_address(&call, true);
        let (decoded, is_last) = decode_address(&field).unwrap();
        assert!(is_last);
        assert_eq!(decoded.to_string(), "K1ABC-5");
    }

    #[test]
    fn repeated_bit_round_trips() {
        let call = Callsign::from_str("WIDE1-1").unwrap().with_repeated(true);
        let field = encode_address(&call, false);
        let (decoded, is_last) = decode_address(&field).unwrap();
        assert!(!is_last);
        assert!(decoded.repeated);
    }

    #[test]
    fn list_round_trips() {
        let dest = Callsign::from_str("APRS").unwrap();
        let src = Callsign::from_str("K1ABC-9").unwrap();
        let digi = Callsign::from_str("WIDE2-1").unwrap();
        let bytes = build_address_list(&[dest, src, digi]);
        let (addrs, offset) = parse_address_list(&bytes).unwrap();
        assert_eq!(offset, 21);
        assert_eq!(addrs.len(), 3);
        assert_eq!(addrs[2].to_string(), "WIDE2-1");
    }

    #[test]
    fn rejects_non_printable() {
        let mut field = [0u8; 7];
        field[0] = 0x00; // shifts to control character
        field[6] = 0x61;
        assert!(decode_address(&field).is_err());
    }
}
