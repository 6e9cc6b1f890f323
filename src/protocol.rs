//! Line protocol spoken over the control socket.
//!
//! Request: one UTF-8 line terminated by `\n`.
//! Response: the command's output followed by [`ENDMARKER`].
//!
//! The marker is not escaped. Output that itself contains the marker bytes
//! will truncate the response at that point.

use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Terminates every response on the control socket.
pub const ENDMARKER: &[u8] = b"\x00END\x00";

const READ_CHUNK: usize = 4096;

/// Frame a response body.
pub fn encode_response(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + ENDMARKER.len());
    buf.put_slice(body);
    buf.put_slice(ENDMARKER);
    buf.freeze()
}

/// Position of the first complete marker in `buf`.
pub fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(ENDMARKER.len()).position(|w| w == ENDMARKER)
}

/// Split one complete response off the front of `buf`, dropping its marker.
pub fn take_response(buf: &mut BytesMut) -> Option<Bytes> {
    let pos = find_marker(buf)?;
    let body = buf.split_to(pos).freeze();
    let _ = buf.split_to(ENDMARKER.len());
    Some(body)
}

/// Send one request line. A trailing newline is added.
pub async fn write_request<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Write a framed response and flush.
pub async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> io::Result<()> {
    writer.write_all(&encode_response(body)).await?;
    writer.flush().await
}

/// Read until one full response is buffered.
///
/// Returns `Ok(None)` if the peer closes before the marker arrives.
/// Bytes past the marker stay in `buf` for the next call.
pub async fn read_response<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
) -> io::Result<Option<Bytes>> {
    loop {
        if let Some(body) = take_response(buf) {
            return Ok(Some(body));
        }
        buf.reserve(READ_CHUNK);
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Ok(None);
        }
    }
}
