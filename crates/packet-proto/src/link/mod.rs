//! Connected-mode link layer (spec C7, §4.6): a pure, synchronously testable state
//! machine. Transport I/O — carrier sense, the retransmit worker's clock tick, writing
//! bytes to the radio — is driven by `packet-station`.
pub mod adapter;
pub mod state;

pub use adapter::{ack_delay, DisconnectReason, InboundEvent, LinkAdapter, Outcome};
pub use state::{LinkConfig, LinkState, RetransmitEntry};
