//! AX.25 codec (spec C3): address fields, control bytes, and frame construction.
pub mod address;
pub mod control;
pub mod frame;

pub use control::{Control, SFrameType, UFrameType};
pub use frame::{decode_frame, encode_frame, Frame};
