//! # Frame Codec
//!
//! Length-prefixed framing over a byte stream.
//!
//! ## Format
//!
//! ```text
//! [4 bytes: payload length, big-endian]
//! [N bytes: payload]
//! ```
//!
//! Decoding reads exactly the declared length before returning. A stream
//! that closes cleanly between frames is end-of-stream, `Ok(None)`. A
//! stream that closes after any byte of a frame (header included) is a
//! fatal [`SyncError::ShortRead`].
//!
//! The codec imposes no payload size limit; callers may.

use crate::error::{SyncError, SyncResult};
use gemini_shared::Frame;
use std::io::{ErrorKind, Read, Write};

/// Length prefix size on the wire.
pub const HEADER_LEN: usize = 4;

/// Encodes a payload into one frame: 4-byte big-endian length, then bytes.
#[must_use]
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Writes one frame to the stream and flushes it.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> SyncResult<()> {
    w.write_all(&(payload.len() as u32).to_be_bytes())?;
    w.write_all(payload)?;
    w.flush()?;
    Ok(())
}

/// Reads one frame payload from the stream.
///
/// Returns `Ok(None)` on a clean close at a frame boundary. Returns
/// [`SyncError::ShortRead`] when the peer closes after a frame has
/// started.
pub fn read_frame<R: Read>(r: &mut R) -> SyncResult<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_LEN];
    if !fill_or_eof(r, &mut header)? {
        return Ok(None);
    }

    let len = u32::from_be_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match r.read(&mut payload[filled..]) {
            Ok(0) => return Err(SyncError::ShortRead { got: filled, expected: len }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(payload))
}

/// Serializes a frame payload as JSON and writes it length-prefixed.
pub fn send_frame<W: Write>(w: &mut W, frame: &Frame) -> SyncResult<()> {
    let payload = serde_json::to_vec(frame)?;
    write_frame(w, &payload)
}

/// Reads one frame and deserializes its payload.
///
/// `Ok(None)` is end-of-stream; a payload that does not parse is
/// [`SyncError::Malformed`] (the stream itself is still intact).
pub fn recv_frame<R: Read>(r: &mut R) -> SyncResult<Option<Frame>> {
    match read_frame(r)? {
        Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
        None => Ok(None),
    }
}

/// Fills the buffer completely, or reports a clean end-of-stream.
///
/// `Ok(false)` means the stream closed before the first byte. Closing
/// after a partial fill is a [`SyncError::ShortRead`].
fn fill_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> SyncResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(SyncError::ShortRead { got: filled, expected: buf.len() }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_round_trip() {
        let payloads: Vec<&[u8]> = vec![b"", b"x", b"hello frames", &[0u8; 1024]];

        for payload in payloads {
            let encoded = encode(payload);
            let mut cursor = Cursor::new(encoded);
            let decoded = read_frame(&mut cursor).unwrap().unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"first").unwrap();
        write_frame(&mut stream, b"second").unwrap();

        let mut cursor = Cursor::new(stream);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"first");
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"second");
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_clean_eof_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_truncated_header_is_short_read() {
        let mut cursor = Cursor::new(vec![0u8, 0u8]);
        match read_frame(&mut cursor) {
            Err(SyncError::ShortRead { got: 2, expected: 4 }) => {}
            other => panic!("expected short read, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_payload_is_short_read() {
        let mut frame = encode(b"truncated");
        frame.truncate(HEADER_LEN + 4);

        let mut cursor = Cursor::new(frame);
        match read_frame(&mut cursor) {
            Err(SyncError::ShortRead { got: 4, expected: 9 }) => {}
            other => panic!("expected short read, got {other:?}"),
        }
    }

    #[test]
    fn test_typed_frame_round_trip() {
        let mut stream = Vec::new();
        send_frame(&mut stream, &Frame::shutdown()).unwrap();

        let mut cursor = Cursor::new(stream);
        assert_eq!(recv_frame(&mut cursor).unwrap().unwrap(), Frame::shutdown());
    }

    #[test]
    fn test_garbage_payload_is_malformed() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"not json at all").unwrap();

        let mut cursor = Cursor::new(stream);
        assert!(matches!(recv_frame(&mut cursor), Err(SyncError::Malformed(_))));
    }
}
