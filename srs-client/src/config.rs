//! Client configuration
//!
//! A [`ClientConfig`] is immutable once handed to
//! [`RadioClient::new`](crate::RadioClient::new). It can be built in code or
//! loaded from a JSON document:
//!
//! ```json
//! {
//!     "address": "srs.example.org:5002",
//!     "name": "Magic",
//!     "radios": ["251.0AM", "133.0AM"],
//!     "awacs_password": "secret"
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use srs_common::guid::Guid;
use srs_common::radio::{Coalition, Radio, parse_frequency};

use crate::error::ConfigError;

// =============================================================================
// Defaults
// =============================================================================

/// Default connection timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Unit id reported by external AWACS clients
pub const DEFAULT_UNIT_ID: u32 = 100_000_001;

/// Unit name reported alongside [`DEFAULT_UNIT_ID`]
pub const DEFAULT_UNIT_NAME: &str = "External AWACS";

/// Default coalition
pub const DEFAULT_COALITION: Coalition = Coalition::Blue;

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT.as_secs_f64()
}

fn default_unit_id() -> u32 {
    DEFAULT_UNIT_ID
}

fn default_coalition() -> Coalition {
    DEFAULT_COALITION
}

// =============================================================================
// Client Config
// =============================================================================

/// Settings for one radio client
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    /// Server address as `host:port`, resolved at dial time
    pub address: String,
    /// Bound on each connect attempt; reads time out after twice this
    pub timeout: Duration,
    /// Display name shown to other clients
    pub name: String,
    /// Identity of this client on the network
    pub guid: Guid,
    pub coalition: Coalition,
    /// Radios to listen and transmit on, frequencies in Hz
    pub radios: Vec<Radio>,
    /// External AWACS mode password, if any
    pub awacs_password: Option<String>,
    pub unit_id: u32,
    /// Start with transmissions muted
    pub muted: bool,
}

impl ClientConfig {
    /// Create a config with defaults and a freshly generated identity
    pub fn new(address: impl Into<String>, name: impl Into<String>, radios: Vec<Radio>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_TIMEOUT,
            name: name.into(),
            guid: Guid::generate(),
            coalition: DEFAULT_COALITION,
            radios,
            awacs_password: None,
            unit_id: DEFAULT_UNIT_ID,
            muted: false,
        }
    }

    /// Parse a config from a JSON document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed, a radio string does
    /// not parse, or the resulting config fails [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument = serde_json::from_str(json)?;
        let config = Self::try_from(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check that the config can be used to connect
    pub fn validate(&self) -> Result<(), ConfigError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        let valid_address = match address.rsplit_once(':') {
            Some((host, port)) => {
                !host.is_empty() && port.parse::<u16>().is_ok_and(|port| port != 0)
            }
            None => false,
        };
        if !valid_address {
            return Err(ConfigError::InvalidAddress(self.address.clone()));
        }
        if self.radios.is_empty() {
            return Err(ConfigError::NoRadios);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("name", &self.name)
            .field("guid", &self.guid)
            .field("coalition", &self.coalition)
            .field("radios", &self.radios)
            .field(
                "awacs_password",
                &self.awacs_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("unit_id", &self.unit_id)
            .field("muted", &self.muted)
            .finish()
    }
}

// =============================================================================
// JSON Document
// =============================================================================

/// On-disk shape of a [`ClientConfig`]
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    address: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: f64,
    name: String,
    #[serde(default)]
    guid: Option<Guid>,
    #[serde(default = "default_coalition")]
    coalition: Coalition,
    radios: Vec<String>,
    #[serde(default)]
    awacs_password: Option<String>,
    #[serde(default = "default_unit_id")]
    unit_id: u32,
    #[serde(default)]
    muted: bool,
}

impl TryFrom<ConfigDocument> for ClientConfig {
    type Error = ConfigError;

    fn try_from(document: ConfigDocument) -> Result<Self, Self::Error> {
        let radios = document
            .radios
            .iter()
            .map(|radio| parse_frequency(radio))
            .collect::<Result<Vec<_>, _>>()?;

        let timeout = Duration::try_from_secs_f64(document.timeout_secs)
            .map_err(|_| ConfigError::ZeroTimeout)?;

        Ok(Self {
            address: document.address,
            timeout,
            name: document.name,
            guid: document.guid.unwrap_or_else(Guid::generate),
            coalition: document.coalition,
            radios,
            awacs_password: document.awacs_password.filter(|p| !p.is_empty()),
            unit_id: document.unit_id,
            muted: document.muted,
        })
    }
}
