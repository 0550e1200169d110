//! Client identifiers
//!
//! Every participant on the network is identified by a 22-character GUID:
//! the URL-safe, unpadded base64 rendering of a random UUID. The same bytes
//! appear in JSON session messages, in the voice packet trailer and as the
//! UDP ping datagram.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Length of a GUID in bytes
pub const GUID_LENGTH: usize = 22;

/// Error returned when a GUID is malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuidError {
    /// Wrong number of bytes
    #[error("guid must be {GUID_LENGTH} bytes, got {0}")]
    Length(usize),
    /// Contains bytes that are not printable ASCII
    #[error("guid contains non-ASCII bytes")]
    NotAscii,
}

/// Fixed-length client identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid([u8; GUID_LENGTH]);

impl Guid {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        let encoded = URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes());
        let mut bytes = [0u8; GUID_LENGTH];
        // 16 bytes of UUID always encode to exactly 22 base64 characters
        bytes.copy_from_slice(&encoded.as_bytes()[..GUID_LENGTH]);
        Self(bytes)
    }

    /// Parse a GUID from raw bytes (as found in packets and pings)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GuidError> {
        if bytes.len() != GUID_LENGTH {
            return Err(GuidError::Length(bytes.len()));
        }
        if !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(GuidError::NotAscii);
        }
        let mut out = [0u8; GUID_LENGTH];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Raw bytes of the identifier
    pub fn as_bytes(&self) -> &[u8; GUID_LENGTH] {
        &self.0
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        // Construction guarantees printable ASCII
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self.as_str())
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_length() {
        for _ in 0..64 {
            let guid = Guid::generate();
            assert_eq!(guid.as_bytes().len(), GUID_LENGTH);
            assert_eq!(guid.as_str().len(), GUID_LENGTH);
        }
    }

    #[test]
    fn test_generate_unique() {
        assert_ne!(Guid::generate(), Guid::generate());
    }

    #[test]
    fn test_parse_wrong_length() {
        assert_eq!("short".parse::<Guid>(), Err(GuidError::Length(5)));
        assert_eq!(
            Guid::from_bytes(&[b'a'; GUID_LENGTH + 1]),
            Err(GuidError::Length(GUID_LENGTH + 1))
        );
    }

    #[test]
    fn test_parse_non_ascii() {
        let mut bytes = [b'a'; GUID_LENGTH];
        bytes[3] = 0xFF;
        assert_eq!(Guid::from_bytes(&bytes), Err(GuidError::NotAscii));
    }

    #[test]
    fn test_json_roundtrip() {
        let guid: Guid = "abcdefghijklmnopqrstuv".parse().unwrap();
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, "\"abcdefghijklmnopqrstuv\"");
        let back: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, guid);
    }

    #[test]
    fn test_json_rejects_bad_length() {
        assert!(serde_json::from_str::<Guid>("\"abc\"").is_err());
    }
}
