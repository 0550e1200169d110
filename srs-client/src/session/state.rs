//! Session state machine

use std::fmt;

/// Where the session is in its lifecycle
///
/// `Connecting → Syncing → Authenticating → Synced`, dropping to
/// `Reconnecting` whenever the connection is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection has been made yet
    #[default]
    Connecting,
    /// Handshake sent, waiting for the server's roster snapshot
    Syncing,
    /// Roster received, waiting for the AWACS password to be accepted
    Authenticating,
    /// Fully established
    Synced,
    /// Connection lost, redialing
    Reconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Syncing => "syncing",
            SessionState::Authenticating => "authenticating",
            SessionState::Synced => "synced",
            SessionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}
