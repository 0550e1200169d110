//! Framing errors

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use super::MAX_LINE_LENGTH;

/// Transport-level failure on a framed stream
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying I/O failure, including lines that are not UTF-8
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// Line grew past [`MAX_LINE_LENGTH`]
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
    /// No complete line arrived within the read deadline
    #[error("no data within {0:?}")]
    ReadTimeout(Duration),
}

impl From<LinesCodecError> for FrameError {
    fn from(error: LinesCodecError) -> Self {
        match error {
            LinesCodecError::MaxLineLengthExceeded => FrameError::LineTooLong(MAX_LINE_LENGTH),
            LinesCodecError::Io(e) => FrameError::Io(e),
        }
    }
}
