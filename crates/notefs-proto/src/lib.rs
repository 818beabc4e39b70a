//! # notefs-proto
//!
//! 9P2000 wire protocol for notefs.
//!
//! - [`types`]: requests, responses, qids, stat entries and constants
//! - [`codec`]: encoding and decoding of complete frames
//! - [`frame`]: reading and writing size-prefixed frames on async streams
//! - [`client`]: a small sequential client used by the sync daemon and tests

pub mod client;
pub mod codec;
pub mod frame;
pub mod types;

pub use client::{Client, ClientError};
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, peek_tag,
};
pub use frame::{read_frame, write_frame};
pub use types::*;
