//! Wire protocol types
//!
//! The application-level envelope carried in WebSocket text frames, the
//! closed set of routable message kinds, and the decode path that turns a
//! raw frame into a well-formed envelope or a `DecodeError`, never a
//! partial envelope.

pub mod envelope;

pub use envelope::{decode, DecodeError, Envelope, ErrorBody, ErrorCode, MessageKind};
