//! Line reader for the session channel

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec};

use super::MAX_LINE_LENGTH;
use super::error::FrameError;

/// Reads newline-terminated lines from an async reader
///
/// Partial lines stay in the codec's buffer, so a read that is cancelled
/// (for example by a deadline) loses no data.
pub struct LineReader<R> {
    lines: FramedRead<R, LinesCodec>,
}

impl<R: AsyncRead> LineReader<R> {
    /// Create a new line reader
    pub fn new(reader: R) -> Self {
        Self {
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
        }
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Read the next line, without its terminator
    ///
    /// Returns `Ok(None)` once the stream is closed. A final line without a
    /// terminator is still returned before that.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, on a line that is not UTF-8, or on a
    /// line longer than [`MAX_LINE_LENGTH`].
    pub async fn read_line(&mut self) -> Result<Option<String>, FrameError> {
        self.lines.next().await.transpose().map_err(FrameError::from)
    }
}
