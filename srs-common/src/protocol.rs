//! Session protocol messages
//!
//! All session messages are sent as newline-delimited JSON over TCP. Field
//! names follow the server's conventions (`PascalCase` for envelopes and
//! client records, `camelCase` inside radio info), so everything here is
//! renamed explicitly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PROTOCOL_VERSION;
use crate::guid::Guid;
use crate::radio::{Coalition, Radio};

/// Server setting that enables coalition audio security
pub const SETTING_COALITION_AUDIO_SECURITY: &str = "COALITION_AUDIO_SECURITY";

/// Server setting that enables external AWACS mode
pub const SETTING_EXTERNAL_AWACS_MODE: &str = "EXTERNAL_AWACS_MODE";

// =============================================================================
// Message type
// =============================================================================

/// Kind of a session message, encoded as an integer on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MsgType {
    /// Single client snapshot
    Update,
    /// Liveness only
    Ping,
    /// Full roster snapshot (server) or initial registration (client)
    Sync,
    /// Single client radio snapshot
    RadioUpdate,
    /// Server configuration flags
    ServerSettings,
    /// A client left
    ClientDisconnect,
    /// Client and server versions are incompatible
    VersionMismatch,
    /// External AWACS mode authentication
    ExternalAwacsModePassword,
    /// External AWACS mode revoked
    ExternalAwacsModeDisconnect,
}

/// Unknown message type on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown message type {0}")]
pub struct UnknownMsgType(pub u8);

impl TryFrom<u8> for MsgType {
    type Error = UnknownMsgType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MsgType::Update),
            1 => Ok(MsgType::Ping),
            2 => Ok(MsgType::Sync),
            3 => Ok(MsgType::RadioUpdate),
            4 => Ok(MsgType::ServerSettings),
            5 => Ok(MsgType::ClientDisconnect),
            6 => Ok(MsgType::VersionMismatch),
            7 => Ok(MsgType::ExternalAwacsModePassword),
            8 => Ok(MsgType::ExternalAwacsModeDisconnect),
            other => Err(UnknownMsgType(other)),
        }
    }
}

impl From<MsgType> for u8 {
    fn from(msg_type: MsgType) -> Self {
        match msg_type {
            MsgType::Update => 0,
            MsgType::Ping => 1,
            MsgType::Sync => 2,
            MsgType::RadioUpdate => 3,
            MsgType::ServerSettings => 4,
            MsgType::ClientDisconnect => 5,
            MsgType::VersionMismatch => 6,
            MsgType::ExternalAwacsModePassword => 7,
            MsgType::ExternalAwacsModeDisconnect => 8,
        }
    }
}

// =============================================================================
// Client records
// =============================================================================

/// Geographic position of a client
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lng: f64,
    #[serde(default)]
    pub alt: f64,
}

/// Transponder state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Iff {
    #[serde(default)]
    pub control: i32,
    #[serde(default)]
    pub mode1: i32,
    #[serde(default)]
    pub mode2: i32,
    #[serde(default)]
    pub mode3: i32,
    #[serde(default)]
    pub mode4: bool,
    #[serde(default)]
    pub mic: i32,
    #[serde(default)]
    pub status: i32,
}

/// Cockpit ambient sound state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ambient {
    #[serde(default)]
    pub vol: f32,
    #[serde(rename = "abType", default)]
    pub ab_type: String,
}

/// Radio set of a client
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RadioInfo {
    #[serde(default)]
    pub radios: Vec<Radio>,
    #[serde(default)]
    pub unit: String,
    #[serde(rename = "unitId", default)]
    pub unit_id: u32,
    #[serde(default)]
    pub iff: Iff,
    #[serde(default)]
    pub ambient: Ambient,
}

/// A client as described by the session protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(rename = "ClientGuid")]
    pub guid: Guid,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Seat", default)]
    pub seat: i32,
    #[serde(rename = "Coalition", default)]
    pub coalition: Coalition,
    #[serde(rename = "AllowRecord", default)]
    pub allow_record: bool,
    #[serde(rename = "RadioInfo", default, skip_serializing_if = "Option::is_none")]
    pub radio_info: Option<RadioInfo>,
    #[serde(
        rename = "LatLngPosition",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<Position>,
}

impl ClientInfo {
    /// Radios of this client (empty when no radio info was sent)
    pub fn radios(&self) -> &[Radio] {
        self.radio_info
            .as_ref()
            .map(|info| info.radios.as_slice())
            .unwrap_or_default()
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// A single session message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "MsgType")]
    pub msg_type: MsgType,
    #[serde(rename = "Client", default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientInfo>,
    #[serde(rename = "Clients", default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<ClientInfo>>,
    #[serde(
        rename = "ServerSettings",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_settings: Option<HashMap<String, String>>,
    #[serde(
        rename = "ExternalAWACSModePassword",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<String>,
}

impl Message {
    /// Create an empty message of the given type
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            msg_type,
            client: None,
            clients: None,
            server_settings: None,
            password: None,
        }
    }

    /// Create a message carrying a single client
    pub fn with_client(msg_type: MsgType, client: ClientInfo) -> Self {
        Self {
            client: Some(client),
            ..Self::new(msg_type)
        }
    }

    /// External AWACS mode login
    pub fn awacs_password(client: ClientInfo, password: String) -> Self {
        Self {
            password: Some(password),
            ..Self::with_client(MsgType::ExternalAwacsModePassword, client)
        }
    }

    /// Clients carried by this message, single or bulk
    pub fn all_clients(&self) -> impl Iterator<Item = &ClientInfo> {
        self.client
            .iter()
            .chain(self.clients.iter().flat_map(|clients| clients.iter()))
    }

    /// Look up a boolean server setting (`"true"`/`"false"`, any case)
    pub fn setting_flag(&self, key: &str) -> Option<bool> {
        let value = self.server_settings.as_ref()?.get(key)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}
