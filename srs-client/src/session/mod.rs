//! Session protocol (TCP data channel)
//!
//! The [`SessionHandler`] is a plain state machine: it is told about
//! connection changes and inbound messages and answers with the messages to
//! send back. [`run_session`] drives it from channels.

mod handler;
mod state;

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use srs_common::protocol::Message;

pub use handler::SessionHandler;
pub use state::SessionState;

/// Connection lifecycle and inbound traffic, as seen by the session task
#[derive(Debug)]
pub enum SessionEvent {
    /// Both sockets are up; the handshake should be sent
    Connected,
    /// A session message arrived
    Message(Box<Message>),
    /// The connection was lost; a reconnect is in progress
    Disconnected,
}

// =============================================================================
// Server Flags
// =============================================================================

/// Settings pushed by the server, readable from any task
#[derive(Debug, Default)]
pub struct ServerFlags {
    coalition_security: AtomicBool,
    awacs_mode: AtomicBool,
}

impl ServerFlags {
    /// Whether the server restricts audio to the listener's coalition
    pub fn coalition_security(&self) -> bool {
        self.coalition_security.load(Ordering::Relaxed)
    }

    /// Whether the server allows external AWACS clients
    pub fn awacs_mode(&self) -> bool {
        self.awacs_mode.load(Ordering::Relaxed)
    }

    pub(crate) fn set_coalition_security(&self, enabled: bool) {
        self.coalition_security.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_awacs_mode(&self, enabled: bool) {
        self.awacs_mode.store(enabled, Ordering::Relaxed);
    }
}

// =============================================================================
// Session Task
// =============================================================================

/// Drive a [`SessionHandler`] until cancelled or the event stream ends
///
/// Replies are queued on `outbound`; the connection task writes them to
/// whichever TCP stream is current.
pub async fn run_session(
    mut handler: SessionHandler,
    mut events: mpsc::Receiver<SessionEvent>,
    outbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let replies = match event {
            SessionEvent::Connected => handler.on_connected(),
            SessionEvent::Message(message) => handler.handle(*message).await,
            SessionEvent::Disconnected => {
                handler.on_disconnected().await;
                Vec::new()
            }
        };

        for reply in replies {
            if outbound.send(reply).await.is_err() {
                debug!("session outbound channel closed");
                return;
            }
        }
    }
    info!("session task stopped in state {:?}", handler.state());
}
