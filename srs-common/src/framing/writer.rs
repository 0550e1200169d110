//! Line writer for the session channel

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::{FramedWrite, LinesCodec};

use super::MAX_LINE_LENGTH;
use super::error::FrameError;

/// Writes newline-terminated lines to an async writer
pub struct LineWriter<W> {
    lines: FramedWrite<W, LinesCodec>,
}

impl<W: AsyncWrite> LineWriter<W> {
    /// Create a new line writer
    pub fn new(writer: W) -> Self {
        Self {
            lines: FramedWrite::new(writer, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
        }
    }

    /// Get a mutable reference to the underlying writer
    pub fn get_mut(&mut self) -> &mut W {
        self.lines.get_mut()
    }
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    /// Write one line followed by the terminator and flush
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    pub async fn write_line(&mut self, line: &str) -> Result<(), FrameError> {
        self.lines.send(line).await.map_err(FrameError::from)
    }
}
