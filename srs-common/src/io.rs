//! I/O utilities for sending and receiving session messages
//!
//! This module sits between the [`Message`] type and the newline framing.

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::framing::{FrameError, LineReader, LineWriter};
use crate::protocol::Message;

// =============================================================================
// Message Sending
// =============================================================================

/// Serialize and send one session message
///
/// # Errors
///
/// Returns an error if the message cannot be written. Serialization of
/// [`Message`] itself cannot fail.
pub async fn send_message<W>(writer: &mut LineWriter<W>, message: &Message) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_string(message).map_err(|e| FrameError::Io(std::io::Error::other(e)))?;
    writer.write_line(&line).await
}

// =============================================================================
// Message Receiving
// =============================================================================

/// Outcome of reading one line from the session channel
pub type Received = Result<Message, serde_json::Error>;

/// Read the next session message
///
/// Blank lines are skipped. A line that is not a valid message is returned
/// as the inner `Err` so the caller can log and discard it without tearing
/// down the connection.
///
/// Returns `Ok(None)` when the peer closes the stream cleanly.
pub async fn read_message<R>(reader: &mut LineReader<R>) -> Result<Option<Received>, FrameError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let Some(line) = reader.read_line().await? else {
            return Ok(None);
        };
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<Message>(&line);
        if let Err(e) = &parsed {
            debug!("unparseable session line ({} bytes): {e}", line.len());
        }
        return Ok(Some(parsed));
    }
}
