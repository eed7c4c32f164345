//! AX.25 control-byte decode/encode (spec C3, §3, §4.2).

/// Supervisory frame type, encoded in control-byte bits 2:3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SFrameType {
    RR,
    RNR,
    REJ,
    SREJ,
}

/// Unnumbered frame type, identified by the full control byte masked against the
/// known constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UFrameType {
    SABM,
    DISC,
    UA,
    DM,
    FRMR,
    UI,
}

const SABM: u8 = 0x2F;
const DISC: u8 = 0x43;
const UA: u8 = 0x63;
const DM: u8 = 0x0F;
const FRMR: u8 = 0x87;
const UI: u8 = 0x03;

/// A decoded control byte, classified into one of AX.25's three frame classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    IFrame { ns: u8, nr: u8, pf: bool },
    SFrame { kind: SFrameType, nr: u8, pf: bool },
    UFrame { kind: UFrameType, pf: bool },
}

/// Decodes a single AX.25 control byte (modulo-8 form).
pub fn decode_control(byte: u8) -> Option<Control> {
    if byte & 0x01 == 0 {
        return Some(Control::IFrame {
            ns: (byte >> 1) & 0x07,
            pf: (byte & 0x10) != 0,
            nr: (byte >> 5) & 0x07,
        });
    }
    if byte & 0x03 == 0x01 {
        let kind = match (byte >> 2) & 0x03 {
            0b00 => SFrameType::RR,
            0b01 => SFrameType::RNR,
            0b10 => SFrameType::REJ,
            0b11 => SFrameType::SREJ,
            _ => unreachable!(),
        };
        return Some(Control::SFrame {
            kind,
            pf: (byte & 0x10) != 0,
            nr: (byte >> 5) & 0x07,
        });
    }
    let pf = (byte & 0x10) != 0;
    let masked = byte & !0x10;
    let kind = match masked {
        SABM => UFrameType::SABM,
        DISC => UFrameType::DISC,
        UA => UFrameType::UA,
        DM => UFrameType::DM,
        FRMR => UFrameType::FRMR,
        UI => UFrameType::UI,
        _ => return None,
    };
    Some(Control::UFrame { kind, pf })
}

/// Encodes a [`Control`] value back to a single byte.
pub fn encode_control(control: &Control) -> u8 {
    match control {
        Control::IFrame { ns, nr, pf } => {
            ((nr & 0x07) << 5) | (if *pf { 0x10 } else { 0 }) | ((ns & 0x07) << 1)
        }
        Control::SFrame { kind, nr, pf } => {
            let type_bits = match kind {
                SFrameType::RR => 0b00,
                SFrameType::RNR => 0b01,
                SFrameType::REJ => 0b10,
                SFrameType::SREJ => 0b11,
            };
            ((nr & 0x07) << 5) | (if *pf { 0x10 } else { 0 }) | (type_bits << 2) | 0x01
        }
        Control::UFrame { kind, pf } => {
            let base = match kind {
                UFrameType::SABM => SABM,
                UFrameType::DISC => DISC,
                UFrameType::UA => UA,
                UFrameType::DM => DM,
                UFrameType::FRMR => FRMR,
                UFrameType::UI => UI,
            };
            if *pf {
                base | 0x10
            } else {
                base & !0x10
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iframe_round_trips() {
        let c = Control::IFrame {
            ns: 3,
            nr: 5,
            pf: true,
        };
        let byte = encode_control(&c);
        assert_eq!(decode_control(byte), Some(c));
    }

    #[test]
    fn sframe_round_trips_all_types() {
        for kind in [
            SFrameType::RR,
            SFrameType::RNR,
            SFrameType::REJ,
            SFrameType::SREJ,
        ] {
            let c = Control::SFrame {
                kind,
                nr: 2,
                pf: false,
            };
            assert_eq!(decode_control(encode_control(&c)), Some(c));
        }
    }

    #[test]
    fn uframe_round_trips_all_types() {
        for kind in [
            UFrameType::SABM,
            UFrameType::DISC,
            UFrameType::UA,
            UFrameType::DM,
            UFrameType::FRMR,
            UFrameType::UI,
        ] {
            let c = Control::UFrame { kind, pf: true };
            assert_eq!(decode_control(encode_control(&c)), Some(c));
        }
    }
}
