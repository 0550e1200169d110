//! Radios, modulations and coalitions
//!
//! Frequencies are always carried in Hz as `f64`, both on the voice wire and
//! in session messages. MHz only appears in human-facing strings such as the
//! `"251.0AM"` form accepted by [`parse_frequency`] and in log output.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hz per MHz
pub const HZ_PER_MHZ: f64 = 1_000_000.0;

// =============================================================================
// Modulation
// =============================================================================

/// Transmission mode of a radio channel
///
/// Session JSON may carry modes this client does not know (reserved digital
/// modes); those parse as [`Modulation::Other`] and never match a local
/// radio. Voice packets are strict, see [`Modulation::from_wire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Modulation {
    #[default]
    Am,
    Fm,
    Intercom,
    Disabled,
    HaveQuick,
    Satcom,
    Mids,
    Other(u8),
}

/// Unknown modulation value on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown modulation {0}")]
pub struct UnknownModulation(pub u8);

impl Modulation {
    /// Parse a modulation byte from a voice packet, rejecting unknown modes
    pub fn from_wire(value: u8) -> Result<Self, UnknownModulation> {
        match Modulation::from(value) {
            Modulation::Other(other) => Err(UnknownModulation(other)),
            known => Ok(known),
        }
    }

    /// Whether this is a mode this client understands
    pub fn is_known(self) -> bool {
        !matches!(self, Modulation::Other(_))
    }
}

impl From<u8> for Modulation {
    fn from(value: u8) -> Self {
        match value {
            0 => Modulation::Am,
            1 => Modulation::Fm,
            2 => Modulation::Intercom,
            3 => Modulation::Disabled,
            4 => Modulation::HaveQuick,
            5 => Modulation::Satcom,
            6 => Modulation::Mids,
            other => Modulation::Other(other),
        }
    }
}

impl From<Modulation> for u8 {
    fn from(modulation: Modulation) -> Self {
        match modulation {
            Modulation::Am => 0,
            Modulation::Fm => 1,
            Modulation::Intercom => 2,
            Modulation::Disabled => 3,
            Modulation::HaveQuick => 4,
            Modulation::Satcom => 5,
            Modulation::Mids => 6,
            Modulation::Other(value) => value,
        }
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modulation::Am => "AM",
            Modulation::Fm => "FM",
            Modulation::Intercom => "INTERCOM",
            Modulation::Disabled => "DISABLED",
            Modulation::HaveQuick => "HAVEQUICK",
            Modulation::Satcom => "SATCOM",
            Modulation::Mids => "MIDS",
            Modulation::Other(value) => return write!(f, "MOD{value}"),
        };
        f.write_str(name)
    }
}

// =============================================================================
// Coalition
// =============================================================================

/// Side a client belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Coalition {
    #[default]
    Spectator,
    Red,
    Blue,
    /// Values this client does not know about; treated like spectators
    Other(i32),
}

impl Coalition {
    /// Spectators (and unknown sides) hear every coalition
    pub fn is_spectator(self) -> bool {
        !matches!(self, Coalition::Red | Coalition::Blue)
    }
}

impl From<i32> for Coalition {
    fn from(value: i32) -> Self {
        match value {
            0 => Coalition::Spectator,
            1 => Coalition::Red,
            2 => Coalition::Blue,
            other => Coalition::Other(other),
        }
    }
}

impl From<Coalition> for i32 {
    fn from(coalition: Coalition) -> Self {
        match coalition {
            Coalition::Spectator => 0,
            Coalition::Red => 1,
            Coalition::Blue => 2,
            Coalition::Other(value) => value,
        }
    }
}

// =============================================================================
// Radio
// =============================================================================

/// A single radio as reported in session messages
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Radio {
    /// Tuned frequency in Hz
    #[serde(rename = "freq")]
    pub frequency: f64,
    pub modulation: Modulation,
    #[serde(rename = "enc", default)]
    pub encrypted: bool,
    #[serde(rename = "encKey", default)]
    pub encryption_key: u8,
    /// Guard (secondary) frequency in Hz, 0 when absent
    #[serde(rename = "secFreq", default)]
    pub guard_frequency: f64,
    #[serde(default)]
    pub retransmit: bool,
}

impl Radio {
    /// Create a clear (unencrypted) radio without a guard frequency
    pub fn new(frequency: f64, modulation: Modulation) -> Self {
        Self {
            frequency,
            modulation,
            ..Default::default()
        }
    }

    /// Guard frequency, if one is set
    pub fn guard(&self) -> Option<f64> {
        (self.guard_frequency > 0.0).then_some(self.guard_frequency)
    }

    /// Whether this radio, listening, hears `transmitter`
    ///
    /// The primary channel matches by [`same_frequency`]. The guard frequency
    /// is monitored in the clear on the radio's own modulation.
    pub fn hears(&self, transmitter: &Radio) -> bool {
        if same_frequency(self, transmitter) {
            return true;
        }
        !transmitter.encrypted
            && transmitter.modulation == self.modulation
            && self.guard() == Some(transmitter.frequency)
    }

    /// Frequency in MHz, for display
    pub fn frequency_mhz(&self) -> f64 {
        self.frequency / HZ_PER_MHZ
    }
}

impl fmt::Display for Radio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}{}", self.frequency_mhz(), self.modulation)
    }
}

/// Whether two radios can hear each other
///
/// Frequencies are compared exactly; both sides must already be in Hz.
/// Keys are only compared when both radios are encrypted. Unknown
/// modulations never match.
pub fn same_frequency(a: &Radio, b: &Radio) -> bool {
    if !a.modulation.is_known() || !b.modulation.is_known() {
        return false;
    }
    if a.frequency != b.frequency || a.modulation != b.modulation {
        return false;
    }
    if a.encrypted != b.encrypted {
        return false;
    }
    !a.encrypted || a.encryption_key == b.encryption_key
}

// =============================================================================
// Frequency strings
// =============================================================================

/// Error parsing a frequency string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrequencyError {
    /// Missing or unsupported modulation suffix
    #[error("frequency '{0}' must end in AM or FM")]
    Modulation(String),
    /// Numeric part is not a positive number
    #[error("frequency '{0}' is not a valid MHz value")]
    Number(String),
}

/// Parse a `"<MHz><AM|FM>"` string such as `"251.0AM"` into a clear radio
pub fn parse_frequency(input: &str) -> Result<Radio, FrequencyError> {
    let trimmed = input.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (number, modulation) = if let Some(number) = upper.strip_suffix("AM") {
        (number, Modulation::Am)
    } else if let Some(number) = upper.strip_suffix("FM") {
        (number, Modulation::Fm)
    } else {
        return Err(FrequencyError::Modulation(trimmed.to_string()));
    };

    let mhz: f64 = number
        .trim()
        .parse()
        .map_err(|_| FrequencyError::Number(trimmed.to_string()))?;
    if !mhz.is_finite() || mhz <= 0.0 {
        return Err(FrequencyError::Number(trimmed.to_string()));
    }

    Ok(Radio::new(mhz_to_hz(mhz), modulation))
}

/// Convert MHz to whole Hz
pub fn mhz_to_hz(mhz: f64) -> f64 {
    (mhz * HZ_PER_MHZ).round()
}
