//! Opus codec wrapper for voice encoding/decoding
//!
//! Thin layer over the `opus` crate fixed to the network's format: 16 kHz
//! mono, 40 ms frames, f32 samples normalized to [-1.0, 1.0].

use opus::{Application, Channels, Decoder, Encoder};

use srs_common::voice::{VOICE_CHANNELS, VOICE_SAMPLE_RATE, VOICE_SAMPLES_PER_FRAME};

use crate::error::CodecError;

// =============================================================================
// Constants
// =============================================================================

/// Maximum encoded frame size in bytes
/// Opus never needs more than ~1275 bytes for a single frame; voice at
/// 16 kHz stays far below this
const MAX_ENCODED_FRAME_SIZE: usize = 1275;

/// Largest frame a peer may send (120 ms at 16 kHz)
const MAX_DECODED_FRAME_SAMPLES: usize = VOICE_SAMPLES_PER_FRAME * 3;

fn channels() -> Channels {
    if VOICE_CHANNELS == 1 {
        Channels::Mono
    } else {
        Channels::Stereo
    }
}

// =============================================================================
// Voice Encoder
// =============================================================================

/// Opus encoder for outgoing voice audio
pub struct VoiceEncoder {
    encoder: Encoder,
}

impl VoiceEncoder {
    /// Create a new voice encoder
    ///
    /// # Returns
    /// * `Ok(VoiceEncoder)` - Encoder ready for use
    /// * `Err(CodecError)` - If opus rejected the configuration
    pub fn new() -> Result<Self, CodecError> {
        let encoder = Encoder::new(VOICE_SAMPLE_RATE, channels(), Application::Voip)
            .map_err(|source| CodecError::Create {
                what: "encoder",
                source,
            })?;
        Ok(Self { encoder })
    }

    /// Encode one frame of audio samples
    ///
    /// # Arguments
    /// * `samples` - Exactly `VOICE_SAMPLES_PER_FRAME` samples
    ///
    /// # Returns
    /// * `Ok(Vec<u8>)` - Encoded Opus frame
    /// * `Err(CodecError)` - Wrong frame size or encoder failure
    pub fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>, CodecError> {
        if samples.len() != VOICE_SAMPLES_PER_FRAME {
            return Err(CodecError::FrameSize {
                expected: VOICE_SAMPLES_PER_FRAME,
                actual: samples.len(),
            });
        }

        let mut output = vec![0u8; MAX_ENCODED_FRAME_SIZE];
        let len = self
            .encoder
            .encode_float(samples, &mut output)
            .map_err(CodecError::Encode)?;

        output.truncate(len);
        Ok(output)
    }
}

// =============================================================================
// Voice Decoder
// =============================================================================

/// Opus decoder for incoming voice audio
pub struct VoiceDecoder {
    decoder: Decoder,
}

impl VoiceDecoder {
    /// Create a new voice decoder
    pub fn new() -> Result<Self, CodecError> {
        let decoder =
            Decoder::new(VOICE_SAMPLE_RATE, channels()).map_err(|source| CodecError::Create {
                what: "decoder",
                source,
            })?;
        Ok(Self { decoder })
    }

    /// Decode one Opus frame to samples
    ///
    /// # Returns
    /// * `Ok(Vec<f32>)` - Decoded samples, normally `VOICE_SAMPLES_PER_FRAME`
    /// * `Err(CodecError)` - Corrupt frame
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        let mut output = vec![0f32; MAX_DECODED_FRAME_SAMPLES];
        let len = self
            .decoder
            .decode_float(data, &mut output, false)
            .map_err(CodecError::Decode)?;

        output.truncate(len);
        Ok(output)
    }
}

// =============================================================================
// Tests
// =============================================================================
