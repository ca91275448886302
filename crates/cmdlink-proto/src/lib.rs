//! Wire protocol for the cmdlink command channel.
//!
//! Everything the client and server must agree on byte-for-byte lives
//! here:
//! - A 6-byte handshake: 4 magic bytes ("CLNK") + a 2-byte little-endian
//!   protocol version. Client sends first, server echoes its own; any
//!   mismatch aborts the connection.
//! - Length-prefixed messages: a 4-byte little-endian `i32` length
//!   followed by that many bytes of UTF-8 JSON, capped at 1 MiB. The cap
//!   is checked against the raw header before any payload allocation.
//! - A single ACK byte (`0x01`) written by the server after accepting a
//!   request, strictly before the response frame.
//!
//! One handshake governs arbitrarily many request/response exchanges on
//! the same stream.

pub mod endpoint;
pub mod error;
pub mod frame;
pub mod types;
pub mod wire;

pub use endpoint::{socket_dir, socket_path, socket_path_in, validate_channel};
pub use error::{Result, WireError};
pub use frame::{
    read_handshake, read_message, write_ack, write_handshake, write_message, LENGTH_PREFIX_SIZE,
};
pub use types::{CommandRequest, CommandResponse, PayloadFormat};
pub use wire::{
    decode_handshake, decode_request, decode_response, encode_handshake, encode_request,
    encode_response, validate_length, ACK, HANDSHAKE_SIZE, MAGIC, MAX_MESSAGE_SIZE,
    PROTOCOL_VERSION,
};
