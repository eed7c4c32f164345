//! KISS framing: frame <-> byte-stream, escape/unescape (spec C2).
//!
//! Grounded on `protocol.py`'s `kiss_escape`/`kiss_unescape`/`wrap_kiss`/`kiss_unwrap`: a bare
//! `0xDB` not followed by `0xDC`/`0xDD` is emitted verbatim rather than rejected, since the
//! underlying transport's FCS check is what actually guards frame integrity.
const FEND: u8 = 0xC0;
const FESC: u8 = 0xDB;
const TFEND: u8 = 0xDC;
const TFESC: u8 = 0xDD;

/// Escapes `payload` so it may be safely embedded between two `FEND` bytes.
pub fn escape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    for &b in payload {
        match b {
            FEND => {
                out.push(FESC);
                out.push(TFEND);
            }
            FESC => {
                out.push(FESC);
                out.push(TFESC);
            }
            _ => out.push(b),
        }
    }
    out
}

/// Inverse of [`escape`]. A dangling `FESC` at the end of `payload`, or a `FESC` followed
/// by a byte other than `TFEND`/`TFESC`, is not an unescape error: both bytes are emitted
/// verbatim and decoding continues.
pub fn unescape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        let b = payload[i];
        if b == FESC && i + 1 < payload.len() {
            match payload[i + 1] {
                TFEND => {
                    out.push(FEND);
                    i += 2;
                    continue;
                }
                TFESC => {
                    out.push(FESC);
                    i += 2;
                    continue;
                }
                _ => {
                    out.push(b);
                    i += 1;
                    continue;
                }
            }
        }
        out.push(b);
        i += 1;
    }
    out
}

/// Wraps `payload` into a complete KISS data frame on `port`.
pub fn wrap(payload: &[u8], port: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(FEND);
    out.push((port << 4) & 0xF0);
    out.extend(escape(payload));
    out.push(FEND);
    out
}

/// Unwraps a complete KISS frame (including both `FEND` delimiters) back into its payload.
///
/// Returns `None` if `frame` is too short to contain the delimiters and command byte.
pub fn unwrap(frame: &[u8]) -> Option<Vec<u8>> {
    let body = frame.strip_prefix(&[FEND])?;
    let body = body.strip_suffix(&[FEND])?;
    let (_command, rest) = body.split_first()?;
    Some(unescape(rest))
}

/// Runaway-input protection for [`FrameReassembler`]: a buffer that accumulates this many
/// bytes without finding a closing delimiter is dropped outright.
pub const MAX_PENDING_BYTES: usize = 2048;

/// Reassembles complete KISS frames out of a transport byte stream (spec §4.8/C9).
///
/// Owns one growing buffer; each [`push`](Self::push) call appends newly arrived bytes
/// and extracts every complete frame it can find, in order. A bare stream of bytes with
/// no leading `FEND` is discarded, and a run of `FEND FEND` mid-stream collapses to a
/// single delimiter, tolerating TNCs that emit both a close- and an open-delimiter back
/// to back.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buf: Vec<u8>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        FrameReassembler { buf: Vec::new() }
    }

    /// Feeds newly arrived transport bytes in and returns every complete, unwrapped
    /// frame payload extracted this call, oldest first.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            let Some(start) = self.buf.iter().position(|&b| b == FEND) else {
                self.buf.clear();
                break;
            };
            if start > 0 {
                self.buf.drain(..start);
            }

            // Collapse a run of adjacent FEND bytes (FEND FEND ...) to one.
            let mut body_start = 0;
            while body_start + 1 < self.buf.len() && self.buf[body_start + 1] == FEND {
                body_start += 1;
            }
            if body_start > 0 {
                self.buf.drain(..body_start);
            }

            match self.buf[1..].iter().position(|&b| b == FEND) {
                Some(rel_end) => {
                    let end = rel_end + 1;
                    let frame: Vec<u8> = self.buf.drain(..=end).collect();
                    if let Some(payload) = unwrap(&frame) {
                        frames.push(payload);
                    }
                }
                None => {
                    if self.buf.len() > MAX_PENDING_BYTES {
                        self.buf.clear();
                    }
                    break;
                }
            }
        }

        frames
    }
}
