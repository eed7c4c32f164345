//! Crate-wide error kinds, following the design in the project's error-handling notes.
use std::fmt;

/// Errors surfaced by the codec, link layer and persistence paths.
///
/// Parser-level failures (malformed APRS info fields) never reach this type — they are
/// folded into an "unknown" record instead, per the APRS parser's never-fail-hard contract.
#[derive(Debug, Clone, PartialEq)]
pub enum StationError {
    /// KISS unwrap found an invalid escape or a truncated frame.
    FrameMalformed(String),
    /// AX.25 address contained non-printable bytes once shifted back down.
    AddressInvalid(String),
    /// S- or I-frame received with N(R) outside the valid send window, or an I-frame
    /// with N(S) far out of order.
    ProtocolViolation(String),
    /// SABM unanswered after all retries, or an I-frame's retransmit budget exhausted.
    LinkTimeout(String),
    /// The transport reported a disconnect.
    TransportLost(String),
    /// A bridge server's listen-bind failed; the bridge is disabled, not the whole station.
    BridgePortUnavailable(String),
    /// A save or load of persisted state failed; in-memory state is unaffected.
    PersistenceError(String),
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::FrameMalformed(msg) => write!(f, "frame malformed: {msg}"),
            StationError::AddressInvalid(msg) => write!(f, "invalid AX.25 address: {msg}"),
            StationError::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            StationError::LinkTimeout(msg) => write!(f, "link timeout: {msg}"),
            StationError::TransportLost(msg) => write!(f, "transport lost: {msg}"),
            StationError::BridgePortUnavailable(msg) => {
                write!(f, "bridge port unavailable: {msg}")
            }
            StationError::PersistenceError(msg) => write!(f, "persistence error: {msg}"),
        }
    }
}

impl std::error::Error for StationError {}

pub type Result<T> = std::result::Result<T, StationError>;
