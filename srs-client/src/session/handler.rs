//! Session message handling

use std::sync::Arc;

use log::{debug, info, trace, warn};

use srs_common::PROTOCOL_VERSION;
use srs_common::protocol::{
    ClientInfo, Message, MsgType, SETTING_COALITION_AUDIO_SECURITY, SETTING_EXTERNAL_AWACS_MODE,
};

use super::ServerFlags;
use super::state::SessionState;
use crate::roster::Roster;

/// Session protocol state machine for one client
///
/// Owns the local [`ClientInfo`]. Every method returns the messages that
/// must be sent to the server, in order.
pub struct SessionHandler {
    local: ClientInfo,
    password: Option<String>,
    roster: Roster,
    flags: Arc<ServerFlags>,
    state: SessionState,
}

impl SessionHandler {
    pub fn new(
        local: ClientInfo,
        password: Option<String>,
        roster: Roster,
        flags: Arc<ServerFlags>,
    ) -> Self {
        Self {
            local,
            password,
            roster,
            flags,
            state: SessionState::Connecting,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Local client as announced to the server
    pub fn local(&self) -> &ClientInfo {
        &self.local
    }

    /// Handshake for a fresh connection
    ///
    /// Sync, then RadioUpdate, then the AWACS password if one is configured.
    pub fn on_connected(&mut self) -> Vec<Message> {
        info!("session connected as {} ({})", self.local.name, self.local.guid);
        self.state = SessionState::Syncing;

        let mut messages = vec![
            Message::with_client(MsgType::Sync, self.local.clone()),
            self.radio_update(),
        ];
        if let Some(password) = &self.password {
            messages.push(Message::awacs_password(self.local.clone(), password.clone()));
        }
        messages
    }

    /// Connection lost; the roster is rebuilt by the next sync
    pub async fn on_disconnected(&mut self) {
        if self.state != SessionState::Reconnecting {
            info!("session lost in state {}, reconnecting", self.state);
        }
        self.state = SessionState::Reconnecting;
        self.roster.clear().await;
    }

    /// Liveness message sent on the ping timer
    pub fn ping(&self) -> Message {
        Message::with_client(MsgType::Ping, self.local.clone())
    }

    fn radio_update(&self) -> Message {
        Message::with_client(MsgType::RadioUpdate, self.local.clone())
    }

    fn apply_settings(&self, message: &Message) {
        if let Some(enabled) = message.setting_flag(SETTING_COALITION_AUDIO_SECURITY) {
            self.flags.set_coalition_security(enabled);
        }
        if let Some(enabled) = message.setting_flag(SETTING_EXTERNAL_AWACS_MODE) {
            self.flags.set_awacs_mode(enabled);
        }
        debug!(
            "server settings: coalition security {}, awacs mode {}",
            self.flags.coalition_security(),
            self.flags.awacs_mode()
        );
    }

    /// Handle one inbound message
    pub async fn handle(&mut self, message: Message) -> Vec<Message> {
        match message.msg_type {
            MsgType::Ping => {
                trace!("session ping");
                Vec::new()
            }
            MsgType::ServerSettings => {
                self.apply_settings(&message);
                Vec::new()
            }
            MsgType::VersionMismatch => {
                warn!(
                    "server reports version mismatch: server {}, client {}",
                    message.version, PROTOCOL_VERSION
                );
                Vec::new()
            }
            MsgType::Sync => {
                if message.server_settings.is_some() {
                    self.apply_settings(&message);
                }
                let mut kept = 0;
                for client in message.all_clients() {
                    if self.roster.upsert(client.clone()).await {
                        kept += 1;
                    }
                }
                info!(
                    "roster sync: {kept} of {} clients relevant",
                    message.all_clients().count()
                );
                if self.state == SessionState::Syncing {
                    self.state = if self.password.is_some() {
                        SessionState::Authenticating
                    } else {
                        SessionState::Synced
                    };
                }
                Vec::new()
            }
            MsgType::Update | MsgType::RadioUpdate => {
                for client in message.all_clients() {
                    self.roster.upsert(client.clone()).await;
                }
                Vec::new()
            }
            MsgType::ClientDisconnect => {
                for client in message.all_clients() {
                    if self.roster.remove(&client.guid).await.is_some() {
                        debug!("{} ({}) disconnected", client.name, client.guid);
                    }
                }
                Vec::new()
            }
            MsgType::ExternalAwacsModePassword => {
                info!("external AWACS mode accepted");
                self.state = SessionState::Synced;
                vec![self.radio_update()]
            }
            MsgType::ExternalAwacsModeDisconnect => {
                warn!("server revoked external AWACS mode");
                if self.password.is_some() && self.state == SessionState::Synced {
                    self.state = SessionState::Authenticating;
                }
                Vec::new()
            }
        }
    }
}
