//! Length-prefixed JSON framing over any `Read`/`Write` stream (§6.3).
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! UTF-8 JSON. Used over the Unix socket; tests exercise it directly over
//! an in-memory buffer.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Largest frame accepted from a peer, guarding against a malformed or
/// malicious length prefix causing an unbounded allocation.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Writes `value` as one length-prefixed JSON frame.
pub fn write_frame<W: Write, T: Serialize>(w: &mut W, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec(value)?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&bytes)?;
    w.flush()
}

/// Reads one length-prefixed JSON frame. Returns `Ok(None)` on clean EOF
/// before any bytes of the length prefix arrive (the peer closed the
/// connection between requests).
pub fn read_frame<R: Read, T: DeserializeOwned>(r: &mut R) -> io::Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    if !read_exact_or_eof(r, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame exceeds size limit"));
    }
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body)?;
    let value = serde_json::from_slice(&body)?;
    Ok(Some(value))
}

/// Like `read_exact`, but returns `Ok(false)` instead of erroring when zero
/// bytes were read before EOF (a genuine "nothing more to read" signal,
/// distinct from a truncated frame).
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_value() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &json!({"op": "health"})).unwrap();

        let mut cursor = &buf[..];
        let value: serde_json::Value = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(value["op"], "health");
    }

    #[test]
    fn clean_eof_before_any_frame_returns_none() {
        let mut cursor: &[u8] = &[];
        let value: Option<serde_json::Value> = read_frame(&mut cursor).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn truncated_frame_errors() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &json!({"op": "health"})).unwrap();
        buf.truncate(buf.len() - 2);

        let mut cursor = &buf[..];
        let result: io::Result<Option<serde_json::Value>> = read_frame(&mut cursor);
        assert!(result.is_err());
    }

    #[test]
    fn multiple_frames_read_sequentially() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &json!({"n": 1})).unwrap();
        write_frame(&mut buf, &json!({"n": 2})).unwrap();

        let mut cursor = &buf[..];
        let first: serde_json::Value = read_frame(&mut cursor).unwrap().unwrap();
        let second: serde_json::Value = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(first["n"], 1);
        assert_eq!(second["n"], 2);
    }
}
