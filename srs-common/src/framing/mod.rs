//! Newline-delimited framing for the session channel
//!
//! Every session message is one JSON object followed by `\n`. Both halves
//! are thin wrappers over `tokio_util`'s [`LinesCodec`](tokio_util::codec::LinesCodec)
//! capped at [`MAX_LINE_LENGTH`].

mod error;
mod reader;
mod writer;

pub use error::FrameError;
pub use reader::LineReader;
pub use writer::LineWriter;

/// Maximum accepted line length (1MB)
///
/// A full roster sync on a busy server is a few hundred kilobytes.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;
