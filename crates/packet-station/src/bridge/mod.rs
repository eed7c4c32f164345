//! Bridge servers (spec C11): TCP-facing surfaces that expose RF traffic and accept
//! outbound frames from external client tooling.
pub mod agwpe;
pub mod kiss_tcp;
