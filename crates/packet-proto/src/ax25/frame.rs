//! AX.25 frame construction and parsing (spec C3, §4.2).
use crate::ax25::address::{build_address_list, parse_address_list};
use crate::ax25::control::{decode_control, encode_control, Control, SFrameType, UFrameType};
use crate::callsign::Callsign;
use crate::error::{Result, StationError};

/// PID used for "no layer 3" (plain APRS/text traffic).
pub const PID_NO_L3: u8 = 0xF0;

/// A fully decoded AX.25 frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub destination: Callsign,
    pub source: Callsign,
    pub path: Vec<Callsign>,
    pub control: Control,
    /// Present for I-frames and UI-frames only.
    pub pid: Option<u8>,
    pub info: Vec<u8>,
}

impl Frame {
    /// Digipeater path excluding destination/source, for APRS-layer consumers.
    pub fn digipeater_path(&self) -> &[Callsign] {
        &self.path
    }
}

/// Parses a complete (unwrapped) AX.25 frame: address list, control byte, optional PID,
/// info field.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let (addresses, offset) = parse_address_list(bytes)?;
    if addresses.len() < 2 {
        return Err(StationError::FrameMalformed(
            "frame missing destination/source".into(),
        ));
    }
    let control_byte = *bytes
        .get(offset)
        .ok_or_else(|| StationError::FrameMalformed("frame truncated at control byte".into()))?;
    let control = decode_control(control_byte)
        .ok_or_else(|| StationError::FrameMalformed(format!("unknown control byte {control_byte:#x}")))?;

    let has_pid = matches!(
        control,
        Control::IFrame { .. } | Control::UFrame { kind: UFrameType::UI, .. }
    );
    let mut cursor = offset + 1;
    let pid = if has_pid {
        let p = *bytes
            .get(cursor)
            .ok_or_else(|| StationError::FrameMalformed("frame truncated at PID".into()))?;
        cursor += 1;
        Some(p)
    } else {
        None
    };
    let info = bytes[cursor.min(bytes.len())..].to_vec();

    let destination = addresses[0];
    let source = addresses[1];
    let path = addresses[2..].to_vec();

    Ok(Frame {
        destination,
        source,
        path,
        control,
        pid,
        info,
    })
}

/// Serializes a [`Frame`] back to on-air bytes (address list + control + optional PID + info).
/// Does not compute or append the FCS; the transport is responsible for that.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut addresses = Vec::with_capacity(2 + frame.path.len());
    addresses.push(frame.destination);
    addresses.push(frame.source);
    addresses.extend_from_slice(&frame.path);

    let mut out = build_address_list(&addresses);
    out.push(encode_control(&frame.control));
    if let Some(pid) = frame.pid {
        out.push(pid);
    }
    out.extend_from_slice(&frame.info);
    out
}

fn base_frame(
    dest: Callsign,
    src: Callsign,
    path: &[Callsign],
    control: Control,
    pid: Option<u8>,
    info: Vec<u8>,
) -> Frame {
    Frame {
        destination: dest,
        source: src,
        path: path.to_vec(),
        control,
        pid,
        info,
    }
}

pub fn build_sabm(dest: Callsign, src: Callsign, path: &[Callsign]) -> Frame {
    base_frame(
        dest,
        src,
        path,
        Control::UFrame {
            kind: UFrameType::SABM,
            pf: true,
        },
        None,
        Vec::new(),
    )
}

pub fn build_ua(dest: Callsign, src: Callsign, path: &[Callsign]) -> Frame {
    base_frame(
        dest,
        src,
        path,
        Control::UFrame {
            kind: UFrameType::UA,
            pf: true,
        },
        None,
        Vec::new(),
    )
}

pub fn build_disc(dest: Callsign, src: Callsign, path: &[Callsign]) -> Frame {
    base_frame(
        dest,
        src,
        path,
        Control::UFrame {
            kind: UFrameType::DISC,
            pf: true,
        },
        None,
        Vec::new(),
    )
}

pub fn build_dm(dest: Callsign, src: Callsign, path: &[Callsign]) -> Frame {
    base_frame(
        dest,
        src,
        path,
        Control::UFrame {
            kind: UFrameType::DM,
            pf: true,
        },
        None,
        Vec::new(),
    )
}

pub fn build_rr(dest: Callsign, src: Callsign, path: &[Callsign], nr: u8, pf: bool) -> Frame {
    base_frame(
        dest,
        src,
        path,
        Control::SFrame {
            kind: SFrameType::RR,
            nr,
            pf,
        },
        None,
        Vec::new(),
    )
}

pub fn build_rej(dest: Callsign, src: Callsign, path: &[Callsign], nr: u8, pf: bool) -> Frame {
    base_frame(
        dest,
        src,
        path,
        Control::SFrame {
            kind: SFrameType::REJ,
            nr,
            pf,
        },
        None,
        Vec::new(),
    )
}

pub fn build_ui(dest: Callsign, src: Callsign, path: &[Callsign], info: &[u8]) -> Frame {
    base_frame(
        dest,
        src,
        path,
        Control::UFrame {
            kind: UFrameType::UI,
            pf: false,
        },
        Some(PID_NO_L3),
        info.to_vec(),
    )
}

#[allow(clippy::too_many_arguments)]
pub fn build_iframe(
    dest: Callsign,
    src: Callsign,
    path: &[Callsign],
    ns: u8,
    nr: u8,
    pf: bool,
    info: &[u8],
) -> Frame {
    base_frame(
        dest,
        src,
        path,
        Control::IFrame { ns, nr, pf },
        Some(PID_NO_L3),
        info.to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn calls() -> (Callsign, Callsign) {
        (
            Callsign::from_str("APRS").unwrap(),
            Callsign::from_str("K1ABC-9").unwrap(),
        )
    }

    #[test]
    fn ui_frame_round_trips() {
        let (dest, src) = calls();
        let path = [Callsign::from_str("WIDE1-1").unwrap()];
        let frame = build_ui(dest, src, &path, b"!4741.90N/12219.18W>test");
        let bytes = encode_frame(&frame);
        let decoded = decode_frame(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn iframe_round_trips_with_pid() {
        let (dest, src) = calls();
        let frame = build_iframe(dest, src, &[], 3, 5, true, b"hello");
        let bytes = encode_frame(&frame);
        let decoded = decode_frame(&bytes).unwrap();
        assert_eq!(decoded.pid, Some(PID_NO_L3));
        assert_eq!(decoded.info, b"hello");
        match decoded.control {
            Control::IFrame { ns, nr, pf } => {
                assert_eq!((ns, nr, pf), (3, 5, true));
            }
            _ => panic!("expected I-frame"),
        }
    }

    #[test]
    fn sabm_has_no_pid_or_info() {
        let (dest, src) = calls();
        let frame = build_sabm(dest, src, &[]);
        let bytes = encode_frame(&frame);
        let decoded = decode_frame(&bytes).unwrap();
        assert_eq!(decoded.pid, None);
        assert!(decoded.info.is_empty());
    }
}
