//! Newline-delimited framing over a bidirectional stream.
//!
//! Reads are serialised by a single [`FrameReader`] per stream; writes must
//! go through a single writer task so that each [`write_frame`] call is
//! atomic with respect to other records on the same stream.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Byte separating consecutive records on a stream.
pub const DELIMITER: u8 = b'\n';

/// Produces complete frames from a continuous byte stream.
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a read half in a buffered frame reader.
    pub fn new(io: R) -> Self {
        Self {
            inner: BufReader::new(io),
        }
    }

    /// Returns the next complete frame, without its delimiter.
    ///
    /// Empty frames are skipped. A trailing record not terminated by the
    /// delimiter is still yielded when the stream ends. Returns `Ok(None)`
    /// on a clean end of stream and `Err` on a read failure; either way the
    /// frame sequence is over and the caller owns closing the stream.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, std::io::Error> {
        use tokio::io::AsyncBufReadExt;

        loop {
            let mut frame = Vec::new();
            let read = self.inner.read_until(DELIMITER, &mut frame).await?;
            if read == 0 {
                return Ok(None);
            }

            if frame.last() == Some(&DELIMITER) {
                frame.pop();
            }
            if frame.is_empty() {
                continue;
            }
            return Ok(Some(frame));
        }
    }
}

/// Writes one record followed by the delimiter in a single write call.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    io: &mut W,
    record: &[u8],
) -> Result<(), std::io::Error> {
    let mut buf = Vec::with_capacity(record.len() + 1);
    buf.extend_from_slice(record);
    buf.push(DELIMITER);

    io.write_all(&buf).await?;
    io.flush().await
}
