//! SRS Common Library
//!
//! Wire formats shared by the radio client: voice packets, session
//! messages, client identifiers and radios.

pub mod framing;
pub mod guid;
pub mod io;
pub mod protocol;
pub mod radio;
pub mod voice;

/// Session protocol version announced in every message
pub const PROTOCOL_VERSION: &str = "2.1.0.10";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_shape() {
        // Four dot-separated numeric components
        let parts: Vec<_> = PROTOCOL_VERSION.split('.').collect();
        assert_eq!(parts.len(), 4);
        assert!(parts.iter().all(|p| p.parse::<u32>().is_ok()));
    }
}
