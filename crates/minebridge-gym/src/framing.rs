//! Length-prefixed binary framing for the transport.
//!
//! Every message on the wire is a 4-byte **little-endian** `u32` length
//! prefix followed by that many payload bytes.
//!
//! # Wire format
//!
//! ```text
//! +----------------+------------------+
//! | Length (4B LE) | Payload          |
//! +----------------+------------------+
//! ```

use std::io::{ErrorKind, Read, Write};

use minebridge_core::error::TransportError;

/// Largest accepted frame (64 MiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Read one frame.
///
/// Returns `Ok(None)` if the stream reaches EOF before any bytes of the
/// length prefix are read (clean disconnect).
///
/// # Errors
///
/// [`TransportError::PayloadTooLarge`] if the prefix exceeds
/// [`MAX_FRAME_SIZE`]; [`TransportError::Io`] on read failure or a frame cut
/// short.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::PayloadTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Write one frame and flush.
///
/// # Errors
///
/// [`TransportError::PayloadTooLarge`] if `data` exceeds
/// [`MAX_FRAME_SIZE`]; [`TransportError::Io`] on write failure.
pub fn write_frame<W: Write>(writer: &mut W, data: &[u8]) -> Result<(), TransportError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(TransportError::PayloadTooLarge {
            size: data.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let len = u32::try_from(data.len()).map_err(|_| TransportError::PayloadTooLarge {
        size: data.len(),
        max: MAX_FRAME_SIZE,
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(data)?;
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn length_prefix_is_little_endian() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        assert_eq!(&buf[..4], &5u32.to_le_bytes());
        assert_eq!(&buf[4..], b"hello");
    }

    #[test]
    fn frames_read_back_in_sequence() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &[1, 2, 3]).unwrap();
        write_frame(&mut buf, &[]).unwrap();
        write_frame(&mut buf, &[9; 300]).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), [1, 2, 3]);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), Vec::<u8>::new());
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap().len(), 300);
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn eof_returns_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_payload_is_io_error() {
        let mut data = 10u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0; 4]);
        let mut cursor = Cursor::new(data);
        assert!(matches!(read_frame(&mut cursor), Err(TransportError::Io(_))));
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let fake_len = (u32::try_from(MAX_FRAME_SIZE).unwrap() + 1).to_le_bytes();
        let mut cursor = Cursor::new(fake_len.to_vec());
        assert!(matches!(
            read_frame(&mut cursor),
            Err(TransportError::PayloadTooLarge { .. })
        ));
    }
}
