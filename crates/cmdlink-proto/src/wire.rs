use crate::error::{Result, WireError};
use crate::types::{CommandRequest, CommandResponse};

/// Magic bytes: "CLNK" (0x43 0x4C 0x4E 0x4B).
pub const MAGIC: [u8; 4] = *b"CLNK";

/// Protocol version. Mismatched versions abort the connection; there is no
/// negotiation or backward-compatibility path.
pub const PROTOCOL_VERSION: u16 = 1;

/// Handshake frame: magic (4) + version (2) = 6 bytes.
pub const HANDSHAKE_SIZE: usize = 6;

/// Maximum message payload size: 1 MiB. Length headers above this (or
/// zero/negative) are rejected before any payload buffer is allocated.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// The single acknowledgement byte the server writes after accepting a
/// request, strictly before the response frame.
pub const ACK: u8 = 0x01;

/// Encode our handshake frame.
///
/// Wire format:
/// ```text
/// ┌────────────────────┬──────────────┐
/// │ Magic (4B)         │ Version      │
/// │ 0x43 0x4C 0x4E 0x4B│ (2B LE u16)  │
/// │ "CLNK"             │              │
/// └────────────────────┴──────────────┘
/// ```
pub fn encode_handshake() -> [u8; HANDSHAKE_SIZE] {
    let mut buf = [0u8; HANDSHAKE_SIZE];
    buf[..4].copy_from_slice(&MAGIC);
    buf[4..].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    buf
}

/// Decode a peer's handshake frame, validating the magic bytes.
///
/// Returns the peer's protocol version; whether a mismatched version is an
/// error (and how it is reported) is role-specific, so the comparison is
/// left to the caller.
pub fn decode_handshake(raw: &[u8; HANDSHAKE_SIZE]) -> Result<u16> {
    if raw[..4] != MAGIC {
        let mut got = [0u8; 4];
        got.copy_from_slice(&raw[..4]);
        return Err(WireError::InvalidMagic {
            got,
            expected: MAGIC,
        });
    }
    let version = u16::from_le_bytes([raw[4], raw[5]]);
    Ok(version)
}

/// Validate a message length header before any payload read.
///
/// The header is a little-endian `i32`; valid declared lengths are
/// `1..=MAX_MESSAGE_SIZE`. Zero, negative, and oversized values are all
/// rejected with the raw header bytes preserved for diagnosis.
pub fn validate_length(raw: [u8; 4]) -> Result<usize> {
    let declared = i32::from_le_bytes(raw);
    if declared <= 0 || declared as usize > MAX_MESSAGE_SIZE {
        return Err(WireError::InvalidLength {
            declared: i64::from(declared),
            raw,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(declared as usize)
}

/// Serialize a request to its wire payload, enforcing the size cap.
///
/// The cap applies on the way out as well: a frame larger than
/// `MAX_MESSAGE_SIZE` would be rejected by every conforming peer, so it is
/// an encoding error here rather than an I/O failure there.
pub fn encode_request(request: &CommandRequest) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(request)?;
    check_outbound_size(payload.len())?;
    Ok(payload)
}

/// Deserialize a request payload.
pub fn decode_request(payload: &[u8]) -> Result<CommandRequest> {
    Ok(serde_json::from_slice(payload)?)
}

/// Serialize a response to its wire payload, enforcing the size cap.
pub fn encode_response(response: &CommandResponse) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(response)?;
    check_outbound_size(payload.len())?;
    Ok(payload)
}

/// Deserialize a response payload.
pub fn decode_response(payload: &[u8]) -> Result<CommandResponse> {
    Ok(serde_json::from_slice(payload)?)
}

fn check_outbound_size(len: usize) -> Result<()> {
    if len == 0 || len > MAX_MESSAGE_SIZE {
        return Err(WireError::InvalidLength {
            declared: len as i64,
            raw: i32::try_from(len).unwrap_or(i32::MAX).to_le_bytes(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}
