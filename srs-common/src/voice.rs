//! Voice packet format for the UDP voice channel
//!
//! Every datagram on the voice socket is either a 22-byte ping (the sender's
//! GUID) or a voice packet carrying one Opus frame. Voice packets are sent at
//! 25 packets/second (40ms frames).
//!
//! Wire format (little-endian):
//! ```text
//! +-----------+-----------+-----------+------------------+--------------------+
//! | total (2) | audio (2) | freqs (2) | opus audio (var) | freq records (var) |
//! +-----------+-----------+-----------+------------------+--------------------+
//! | unit id (4) | sequence (8) | hops (1) | relay GUID (22) | origin GUID (22)  |
//! +-------------+--------------+----------+-----------------+-------------------+
//! ```
//!
//! Each frequency record is 10 bytes: frequency in Hz (f64), modulation (u8)
//! and encryption (u8, 0 for clear, otherwise the key). The trailer is read
//! backwards from the declared total length.

use std::time::Duration;

use thiserror::Error;

use crate::guid::{GUID_LENGTH, Guid, GuidError};
use crate::radio::{Modulation, Radio, UnknownModulation};

/// Sample rate for voice audio
pub const VOICE_SAMPLE_RATE: u32 = 16000;

/// Number of audio channels (mono)
pub const VOICE_CHANNELS: u16 = 1;

/// Frame duration in milliseconds
pub const VOICE_FRAME_DURATION_MS: u32 = 40;

/// Frame duration as a `Duration`
pub const VOICE_FRAME_DURATION: Duration = Duration::from_millis(VOICE_FRAME_DURATION_MS as u64);

/// Number of samples per frame at 16kHz with 40ms frames
pub const VOICE_SAMPLES_PER_FRAME: usize =
    (VOICE_SAMPLE_RATE * VOICE_FRAME_DURATION_MS / 1000) as usize;

/// Header size: total length + audio length + frequency segment length
pub const VOICE_HEADER_SIZE: usize = 2 + 2 + 2;

/// Size of a single frequency record
pub const FREQUENCY_RECORD_SIZE: usize = 8 + 1 + 1;

/// Trailer size: unit id + sequence + hops + relay GUID + origin GUID
pub const VOICE_TRAILER_SIZE: usize = 4 + 8 + 1 + GUID_LENGTH + GUID_LENGTH;

/// Length of a ping datagram
pub const PING_PACKET_SIZE: usize = GUID_LENGTH;

/// Whether a datagram is a ping rather than a voice packet
pub fn is_ping(datagram: &[u8]) -> bool {
    datagram.len() == PING_PACKET_SIZE
}

// =============================================================================
// Errors
// =============================================================================

/// Reasons a datagram cannot be decoded as a voice packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the fixed header and trailer need
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    /// Declared total length runs past the datagram
    #[error("declared length {declared} exceeds datagram length {actual}")]
    LengthExceedsBuffer { declared: usize, actual: usize },
    /// Segment lengths do not add up to the declared total
    #[error("segments ({audio} audio + {frequencies} frequency) do not fit declared length {declared}")]
    SegmentMismatch {
        declared: usize,
        audio: usize,
        frequencies: usize,
    },
    /// Frequency segment is not a whole number of records
    #[error("frequency segment of {0} bytes is not a multiple of {FREQUENCY_RECORD_SIZE}")]
    FrequencyRecordSize(usize),
    /// Read ran past the end of a segment
    #[error("unexpected end of segment")]
    Truncated,
    #[error(transparent)]
    Modulation(#[from] UnknownModulation),
    #[error("invalid guid: {0}")]
    Guid(#[from] GuidError),
}

/// Reasons a packet cannot be encoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("packet of {0} bytes does not fit a 16-bit length")]
    TooLarge(usize),
}

// =============================================================================
// Packet types
// =============================================================================

/// One (frequency, modulation, encryption) tuple a packet is transmitted on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRecord {
    /// Frequency in Hz
    pub frequency: f64,
    pub modulation: Modulation,
    /// 0 when clear, otherwise the encryption key
    pub encryption: u8,
}

impl FrequencyRecord {
    /// View this record as a radio so it can be matched against local radios
    pub fn to_radio(&self) -> Radio {
        Radio {
            frequency: self.frequency,
            modulation: self.modulation,
            encrypted: self.encryption != 0,
            encryption_key: self.encryption,
            ..Default::default()
        }
    }
}

impl From<&Radio> for FrequencyRecord {
    fn from(radio: &Radio) -> Self {
        Self {
            frequency: radio.frequency,
            modulation: radio.modulation,
            encryption: if radio.encrypted {
                radio.encryption_key
            } else {
                0
            },
        }
    }
}

/// A decoded voice packet
///
/// Segment lengths are not stored; they are derived from the content
/// (see [`VoicePacket::total_len`]) so an encoded packet is always consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePacket {
    /// Opus-encoded audio for one frame
    pub audio: Vec<u8>,
    /// Frequencies this audio is transmitted on
    pub frequencies: Vec<FrequencyRecord>,
    /// In-game unit of the sender
    pub unit_id: u32,
    /// Per-sender packet counter
    pub sequence: u64,
    /// Retransmission hop count (passed through, never acted on)
    pub hops: u8,
    /// Client that put this packet on the wire
    pub relay: Guid,
    /// Client that originally spoke
    pub origin: Guid,
}

impl VoicePacket {
    /// Packet spoken and sent by `origin` itself (no relay, zero hops)
    pub fn new(
        audio: Vec<u8>,
        frequencies: Vec<FrequencyRecord>,
        unit_id: u32,
        sequence: u64,
        origin: Guid,
    ) -> Self {
        Self {
            audio,
            frequencies,
            unit_id,
            sequence,
            hops: 0,
            relay: origin,
            origin,
        }
    }

    /// Length of the Opus audio segment
    pub fn audio_len(&self) -> usize {
        self.audio.len()
    }

    /// Length of the frequency segment
    pub fn frequencies_len(&self) -> usize {
        self.frequencies.len() * FREQUENCY_RECORD_SIZE
    }

    /// Total encoded length
    pub fn total_len(&self) -> usize {
        VOICE_HEADER_SIZE + self.audio_len() + self.frequencies_len() + VOICE_TRAILER_SIZE
    }

    /// Whether this packet is transmitted on a frequency `radio` can hear
    ///
    /// Includes the radio's guard frequency.
    pub fn is_on(&self, radio: &Radio) -> bool {
        self.frequencies
            .iter()
            .any(|record| radio.hears(&record.to_radio()))
    }

    /// Serialize the packet to bytes for transmission
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let total = self.total_len();
        let total_u16 = u16::try_from(total).map_err(|_| EncodeError::TooLarge(total))?;

        let mut bytes = Vec::with_capacity(total);

        // Header
        bytes.extend_from_slice(&total_u16.to_le_bytes());
        bytes.extend_from_slice(&(self.audio_len() as u16).to_le_bytes());
        bytes.extend_from_slice(&(self.frequencies_len() as u16).to_le_bytes());

        // Audio segment
        bytes.extend_from_slice(&self.audio);

        // Frequency segment
        for record in &self.frequencies {
            bytes.extend_from_slice(&record.frequency.to_le_bytes());
            bytes.push(record.modulation.into());
            bytes.push(record.encryption);
        }

        // Trailer
        bytes.extend_from_slice(&self.unit_id.to_le_bytes());
        bytes.extend_from_slice(&self.sequence.to_le_bytes());
        bytes.push(self.hops);
        bytes.extend_from_slice(self.relay.as_bytes());
        bytes.extend_from_slice(self.origin.as_bytes());

        Ok(bytes)
    }

    /// Deserialize a packet from a datagram
    ///
    /// Never reads past `bytes`; any inconsistency is reported as an error.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < VOICE_HEADER_SIZE + VOICE_TRAILER_SIZE {
            return Err(DecodeError::TooShort(bytes.len()));
        }

        let mut header = Cursor::new(&bytes[..VOICE_HEADER_SIZE]);
        let declared = header.u16()? as usize;
        let audio_len = header.u16()? as usize;
        let frequencies_len = header.u16()? as usize;

        if declared > bytes.len() {
            return Err(DecodeError::LengthExceedsBuffer {
                declared,
                actual: bytes.len(),
            });
        }
        if declared < VOICE_HEADER_SIZE + VOICE_TRAILER_SIZE
            || VOICE_HEADER_SIZE + audio_len + frequencies_len + VOICE_TRAILER_SIZE != declared
        {
            return Err(DecodeError::SegmentMismatch {
                declared,
                audio: audio_len,
                frequencies: frequencies_len,
            });
        }
        if frequencies_len % FREQUENCY_RECORD_SIZE != 0 {
            return Err(DecodeError::FrequencyRecordSize(frequencies_len));
        }

        // Trailer, indexed backwards from the declared length
        let mut trailer = Cursor::new(&bytes[declared - VOICE_TRAILER_SIZE..declared]);
        let unit_id = trailer.u32()?;
        let sequence = trailer.u64()?;
        let hops = trailer.u8()?;
        let relay = Guid::from_bytes(trailer.take(GUID_LENGTH)?)?;
        let origin = Guid::from_bytes(trailer.take(GUID_LENGTH)?)?;

        // Audio and frequency segments
        let mut body = Cursor::new(&bytes[VOICE_HEADER_SIZE..declared - VOICE_TRAILER_SIZE]);
        let audio = body.take(audio_len)?.to_vec();

        let mut frequencies = Vec::with_capacity(frequencies_len / FREQUENCY_RECORD_SIZE);
        for _ in 0..frequencies_len / FREQUENCY_RECORD_SIZE {
            let frequency = body.f64()?;
            let modulation = Modulation::from_wire(body.u8()?)?;
            let encryption = body.u8()?;
            frequencies.push(FrequencyRecord {
                frequency,
                modulation,
                encryption,
            });
        }

        Ok(Self {
            audio,
            frequencies,
            unit_id,
            sequence,
            hops,
            relay,
            origin,
        })
    }
}

// =============================================================================
// Bounds-checked reader
// =============================================================================

/// Forward-only reader over a byte slice that fails instead of panicking
struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecodeError::Truncated)?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        self.array().map(u64::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        self.array().map(f64::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guid(fill: u8) -> Guid {
        Guid::from_bytes(&[fill; GUID_LENGTH]).unwrap()
    }

    fn sample_packet() -> VoicePacket {
        VoicePacket {
            audio: vec![0xF8, 0xFF, 0xFE, 0x01, 0x02],
            frequencies: vec![
                FrequencyRecord {
                    frequency: 251_000_000.0,
                    modulation: Modulation::Am,
                    encryption: 0,
                },
                FrequencyRecord {
                    frequency: 30_000_000.0,
                    modulation: Modulation::Fm,
                    encryption: 4,
                },
            ],
            unit_id: 100_000_001,
            sequence: 42,
            hops: 1,
            relay: guid(b'r'),
            origin: guid(b'o'),
        }
    }

    #[test]
    fn test_constants() {
        assert_eq!(VOICE_SAMPLES_PER_FRAME, 640);
        assert_eq!(VOICE_TRAILER_SIZE, 57);
        assert_eq!(VOICE_FRAME_DURATION, Duration::from_millis(40));
    }

    #[test]
    fn test_voice_packet_roundtrip() {
        let packet = sample_packet();
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), packet.total_len());

        let decoded = VoicePacket::decode(&bytes).expect("should decode");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_voice_packet_layout() {
        let packet = sample_packet();
        let bytes = packet.encode().unwrap();
        let total = bytes.len();

        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]) as usize, total);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 5);
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 20);
        assert_eq!(&bytes[6..11], &[0xF8, 0xFF, 0xFE, 0x01, 0x02]);
        assert_eq!(
            f64::from_le_bytes(bytes[11..19].try_into().unwrap()),
            251_000_000.0
        );
        assert_eq!(bytes[19], 0);
        assert_eq!(bytes[29], 1); // FM
        assert_eq!(bytes[30], 4); // key
        assert_eq!(
            u32::from_le_bytes(bytes[31..35].try_into().unwrap()),
            100_000_001
        );
        assert_eq!(u64::from_le_bytes(bytes[35..43].try_into().unwrap()), 42);
        assert_eq!(bytes[43], 1);
        assert_eq!(&bytes[44..66], &[b'r'; GUID_LENGTH]);
        assert_eq!(&bytes[66..88], &[b'o'; GUID_LENGTH]);
        assert_eq!(total, 88);
    }

    #[test]
    fn test_voice_packet_empty_segments() {
        let packet = VoicePacket {
            audio: vec![],
            frequencies: vec![],
            ..sample_packet()
        };
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), VOICE_HEADER_SIZE + VOICE_TRAILER_SIZE);
        assert_eq!(VoicePacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_voice_packet_truncated() {
        let bytes = sample_packet().encode().unwrap();
        for len in 0..bytes.len() {
            assert!(
                VoicePacket::decode(&bytes[..len]).is_err(),
                "truncated to {} bytes should fail",
                len
            );
        }
    }

    #[test]
    fn test_voice_packet_trailing_bytes_ignored() {
        let packet = sample_packet();
        let mut bytes = packet.encode().unwrap();
        bytes.extend_from_slice(&[0xAA; 8]);
        assert_eq!(VoicePacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_voice_packet_declared_length_too_long() {
        let mut bytes = sample_packet().encode().unwrap();
        let bogus = (bytes.len() + 1) as u16;
        bytes[0..2].copy_from_slice(&bogus.to_le_bytes());
        assert!(matches!(
            VoicePacket::decode(&bytes),
            Err(DecodeError::LengthExceedsBuffer { .. })
        ));
    }

    #[test]
    fn test_voice_packet_audio_length_overruns() {
        let mut bytes = sample_packet().encode().unwrap();
        bytes[2..4].copy_from_slice(&u16::MAX.to_le_bytes());
        assert!(matches!(
            VoicePacket::decode(&bytes),
            Err(DecodeError::SegmentMismatch { .. })
        ));
    }

    #[test]
    fn test_voice_packet_partial_frequency_record() {
        let mut bytes = sample_packet().encode().unwrap();
        // Move one byte from the frequency segment to the audio segment
        bytes[2..4].copy_from_slice(&6u16.to_le_bytes());
        bytes[4..6].copy_from_slice(&19u16.to_le_bytes());
        assert_eq!(
            VoicePacket::decode(&bytes),
            Err(DecodeError::FrequencyRecordSize(19))
        );
    }

    #[test]
    fn test_voice_packet_unknown_modulation() {
        let mut bytes = sample_packet().encode().unwrap();
        bytes[19] = 0x7F;
        assert_eq!(
            VoicePacket::decode(&bytes),
            Err(DecodeError::Modulation(UnknownModulation(0x7F)))
        );
    }

    #[test]
    fn test_voice_packet_bad_guid() {
        let mut bytes = sample_packet().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0x00;
        assert!(matches!(
            VoicePacket::decode(&bytes),
            Err(DecodeError::Guid(_))
        ));
    }

    #[test]
    fn test_voice_packet_too_large() {
        let packet = VoicePacket {
            audio: vec![0u8; u16::MAX as usize],
            ..sample_packet()
        };
        assert!(matches!(packet.encode(), Err(EncodeError::TooLarge(_))));
    }

    #[test]
    fn test_is_ping() {
        assert!(is_ping(&[b'a'; GUID_LENGTH]));
        assert!(!is_ping(&sample_packet().encode().unwrap()));
    }

    #[test]
    fn test_is_on() {
        let packet = sample_packet();
        assert!(packet.is_on(&Radio::new(251_000_000.0, Modulation::Am)));
        assert!(!packet.is_on(&Radio::new(251_000_000.0, Modulation::Fm)));

        let mut encrypted = Radio::new(30_000_000.0, Modulation::Fm);
        assert!(!packet.is_on(&encrypted));
        encrypted.encrypted = true;
        encrypted.encryption_key = 4;
        assert!(packet.is_on(&encrypted));
    }

    #[test]
    fn test_is_on_guard_frequency() {
        let packet = sample_packet();
        let mut radio = Radio::new(133_000_000.0, Modulation::Am);
        assert!(!packet.is_on(&radio));
        radio.guard_frequency = 251_000_000.0;
        assert!(packet.is_on(&radio));
    }
}
