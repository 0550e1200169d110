//! Voice receive and transmit path
//!
//! Incoming: UDP → [`receiver`] (one jitter buffer per radio) →
//! [`pipeline::decode_batch`] → [`Transmission`].
//! Outgoing: [`OutgoingAudio`] → [`pipeline::PacketEncoder`] →
//! [`transmitter`] → UDP.

pub mod codec;
pub mod pipeline;
pub mod receiver;
pub mod transmitter;

use srs_common::guid::Guid;
use srs_common::radio::Radio;
use srs_common::voice::VOICE_SAMPLE_RATE;

use crate::trace::Trace;

/// A complete transmission heard on one of our radios
#[derive(Debug, Clone)]
pub struct Transmission {
    pub trace: Trace,
    /// Local radio it was heard on
    pub radio: Radio,
    /// Client that spoke
    pub origin: Guid,
    /// 16 kHz mono samples
    pub samples: Vec<f32>,
}

impl Transmission {
    /// Audio length
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / VOICE_SAMPLE_RATE as f64)
    }
}

/// Audio to transmit on every configured radio
#[derive(Debug, Clone)]
pub struct OutgoingAudio {
    pub trace: Trace,
    /// 16 kHz mono samples
    pub samples: Vec<f32>,
}

impl OutgoingAudio {
    /// Wrap samples, starting a new trace
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            trace: Trace::start(),
            samples,
        }
    }
}
