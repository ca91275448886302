//! Async read/write helpers for the wire structures.
//!
//! Both sides of the protocol go through these so the byte layout cannot
//! drift: handshake frames, length-prefixed messages, and the ACK byte.
//! Validation (magic, length bounds) happens here before any payload
//! allocation; policy (what a mismatch means) stays with the caller.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, WireError};
use crate::wire::{encode_handshake, validate_length, ACK, HANDSHAKE_SIZE};

/// Length prefix: 4-byte little-endian `i32`.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Write our handshake frame and flush.
pub async fn write_handshake<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&encode_handshake()).await?;
    stream.flush().await?;
    Ok(())
}

/// Read the peer's handshake frame and return its protocol version.
///
/// The magic bytes are validated here; version comparison is left to the
/// caller. EOF before a complete frame maps to [`WireError::ConnectionClosed`],
/// clean only if no byte had arrived yet.
pub async fn read_handshake<S>(stream: &mut S) -> Result<u16>
where
    S: AsyncRead + Unpin,
{
    let mut raw = [0u8; HANDSHAKE_SIZE];
    read_full(stream, &mut raw).await?;
    crate::wire::decode_handshake(&raw)
}

/// Write one length-prefixed message and flush.
///
/// Header and payload are assembled into a single buffer so they leave in
/// one write. The payload must already satisfy the size cap (the encoders
/// in [`crate::wire`] enforce it).
pub async fn write_message<S>(stream: &mut S, payload: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_i32_le(payload.len() as i32);
    buf.put_slice(payload);
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed message payload.
///
/// The 4-byte header is read first and validated against the size cap
/// before the payload buffer is allocated; a garbage or hostile header
/// therefore costs nothing. EOF on a message boundary (no header byte yet)
/// is a clean close; EOF anywhere else is not.
pub async fn read_message<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    read_full(stream, &mut header).await?;
    let len = validate_length(header)?;

    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .await
        .map_err(map_payload_eof)?;
    Ok(payload)
}

/// Write the single acknowledgement byte and flush.
pub async fn write_ack<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&[ACK]).await?;
    stream.flush().await?;
    Ok(())
}

/// Fill `buf` completely, distinguishing a clean close (EOF before the
/// first byte) from a mid-structure close.
async fn read_full<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(WireError::ConnectionClosed { clean: filled == 0 });
        }
        filled += n;
    }
    Ok(())
}

fn map_payload_eof(err: std::io::Error) -> WireError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::ConnectionClosed { clean: false }
    } else {
        WireError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{MAX_MESSAGE_SIZE, PROTOCOL_VERSION};

    #[tokio::test]
    async fn handshake_roundtrip_over_stream() {
        let (mut a, mut b) = tokio::io::duplex(64);

        write_handshake(&mut a).await.unwrap();
        let version = read_handshake(&mut b).await.unwrap();
        assert_eq!(version, PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn handshake_rejects_foreign_magic() {
        let (mut a, mut b) = tokio::io::duplex(64);

        a.write_all(b"GET /\x00").await.unwrap();
        let err = read_handshake(&mut b).await.unwrap_err();
        assert!(matches!(err, WireError::InvalidMagic { .. }));
    }

    #[tokio::test]
    async fn message_roundtrip_over_stream() {
        let (mut a, mut b) = tokio::io::duplex(256);
        let payload = br#"{"command":"Echo","data":"{\"x\":1}","format":"json","cwd":"/tmp"}"#;

        write_message(&mut a, payload).await.unwrap();
        let read = read_message(&mut b).await.unwrap();
        assert_eq!(read, payload);
    }

    #[tokio::test]
    async fn oversized_header_rejected_before_payload_read() {
        let (mut a, mut b) = tokio::io::duplex(64);

        // Header only: declares 2 MiB but no payload follows. The read must
        // fail from the header alone instead of waiting for payload bytes.
        let declared = (2 * MAX_MESSAGE_SIZE) as i32;
        a.write_all(&declared.to_le_bytes()).await.unwrap();

        let err = read_message(&mut b).await.unwrap_err();
        assert!(matches!(err, WireError::InvalidLength { .. }));
    }

    #[tokio::test]
    async fn zero_header_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&0i32.to_le_bytes()).await.unwrap();

        let err = read_message(&mut b).await.unwrap_err();
        assert!(matches!(err, WireError::InvalidLength { declared: 0, .. }));
    }

    #[tokio::test]
    async fn negative_header_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(-5i32).to_le_bytes()).await.unwrap();

        let err = read_message(&mut b).await.unwrap_err();
        assert!(matches!(err, WireError::InvalidLength { declared: -5, .. }));
    }

    #[tokio::test]
    async fn eof_on_boundary_is_clean() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);

        let err = read_message(&mut b).await.unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed { clean: true }));
    }

    #[tokio::test]
    async fn eof_mid_header_is_not_clean() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0x10, 0x00]).await.unwrap();
        drop(a);

        let err = read_message(&mut b).await.unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed { clean: false }));
    }

    #[tokio::test]
    async fn eof_mid_payload_is_not_clean() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&16i32.to_le_bytes()).await.unwrap();
        a.write_all(b"short").await.unwrap();
        drop(a);

        let err = read_message(&mut b).await.unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed { clean: false }));
    }

    #[tokio::test]
    async fn ack_is_single_byte() {
        let (mut a, mut b) = tokio::io::duplex(64);

        write_ack(&mut a).await.unwrap();
        drop(a);

        let mut buf = Vec::new();
        b.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, [ACK]);
    }
}
