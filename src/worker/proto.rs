//! Wire protocol between the pool and its worker processes.
//!
//! Frames are a 4-byte little-endian length followed by a JSON body.
//! The request body is a serialized [`ConversionRequest`] (content
//! base64-encoded so the JSON stays valid); the response is a
//! [`WorkerResponse`]. One request frame gets exactly one response
//! frame; a worker that violates that is treated as crashed.
//!
//! The child side reads synchronously (it owns its process and has
//! nothing else to do); the pool side uses the async halves so a slow
//! worker only suspends the task that dispatched to it.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::RawConversion;

/// Upper bound on a single frame. Large enough for the configured upload
/// limit after base64 expansion, small enough to reject garbage lengths
/// from a corrupted stream.
pub const MAX_FRAME_LEN: u32 = 512 * 1024 * 1024;

/// Worker's answer to one conversion request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerResponse {
    Success { result: RawConversion },
    Failure { message: String },
}

/// Write one frame, blocking. Used by the worker child.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> io::Result<()> {
    let len = frame_len(body)?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(body)?;
    writer.flush()
}

/// Read one frame, blocking. Returns `None` on clean EOF at a frame
/// boundary, which is how the pool tells a worker to exit.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = check_len(u32::from_le_bytes(len_buf))?;
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

/// Write one frame on the pool side.
pub async fn write_frame_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> io::Result<()> {
    let len = frame_len(body)?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}

/// Read one frame on the pool side. EOF is an error here: the pool only
/// reads when it expects a response, so a closed pipe means the worker
/// died mid-request.
pub async fn read_frame_async<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = check_len(u32::from_le_bytes(len_buf))?;
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

fn frame_len(body: &[u8]) -> io::Result<u32> {
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame body too large"))?;
    check_len(len)
}

fn check_len(len: u32) -> io::Result<u32> {
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds limit {MAX_FRAME_LEN}"),
        ));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn sync_frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        assert_eq!(&buf[..4], &5u32.to_le_bytes());

        let mut cursor = Cursor::new(buf);
        let frame = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(frame, b"hello");
        // Clean EOF at the boundary
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        buf.truncate(6);
        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[tokio::test]
    async fn async_frame_round_trip() {
        let mut buf = Vec::new();
        write_frame_async(&mut buf, b"ping").await.unwrap();

        let mut cursor = Cursor::new(buf);
        let frame = read_frame_async(&mut cursor).await.unwrap();
        assert_eq!(frame, b"ping");
    }

    #[tokio::test]
    async fn async_eof_is_an_error() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_frame_async(&mut cursor).await.is_err());
    }

    #[test]
    fn response_serializes_with_status_tag() {
        let response = WorkerResponse::Failure {
            message: "boom".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"failure\""));
        assert!(json.contains("\"message\":\"boom\""));
    }
}
