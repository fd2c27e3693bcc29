//! Device protocol: frame types and the newline-delimited JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_frame, encode_frame, LineDecoder, ProtocolError, DEFAULT_MAX_LINE};
pub use messages::*;
