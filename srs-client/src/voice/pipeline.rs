//! Audio encode/decode stages
//!
//! Decoding turns a finished [`VoiceBatch`] into one [`Transmission`].
//! Encoding turns [`OutgoingAudio`] into a paced-ready [`OutgoingBatch`] of
//! voice datagrams. Each transmission gets a fresh Opus state.

use log::{debug, trace, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use srs_common::guid::Guid;
use srs_common::radio::Radio;
use srs_common::voice::{FrequencyRecord, VOICE_SAMPLES_PER_FRAME, VoicePacket};

use super::codec::{VoiceDecoder, VoiceEncoder};
use super::receiver::VoiceBatch;
use super::{OutgoingAudio, Transmission};
use crate::error::CodecError;
use crate::trace::Trace;

// =============================================================================
// Decode
// =============================================================================

/// Decode a finished transmission
///
/// Frames that fail to decode are skipped. Returns `None` if nothing could
/// be decoded.
pub fn decode_batch(batch: VoiceBatch) -> Option<Transmission> {
    let mut decoder = match VoiceDecoder::new() {
        Ok(decoder) => decoder,
        Err(e) => {
            warn!("{} {e}", batch.trace);
            return None;
        }
    };

    let mut samples = Vec::with_capacity(batch.packets.len() * VOICE_SAMPLES_PER_FRAME);
    for packet in &batch.packets {
        match decoder.decode(&packet.audio) {
            Ok(frame) => samples.extend_from_slice(&frame),
            Err(e) => debug!(
                "{} skipping packet {}: {e}",
                batch.trace, packet.sequence
            ),
        }
    }

    if samples.is_empty() {
        debug!("{} transmission decoded to nothing", batch.trace);
        return None;
    }

    Some(Transmission {
        trace: batch.trace,
        radio: batch.radio,
        origin: batch.origin,
        samples,
    })
}

/// Decode batches as they finish and publish the transmissions
///
/// Keeps draining `batches` after the consumer is gone so the receive path
/// never backs up.
pub async fn run_decoder(
    mut batches: mpsc::Receiver<VoiceBatch>,
    transmissions: mpsc::Sender<Transmission>,
    cancel: CancellationToken,
) {
    let mut consumer_gone = false;
    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            batch = batches.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        if consumer_gone {
            trace!("{} no consumer, dropping transmission", batch.trace);
            continue;
        }
        let Some(transmission) = decode_batch(batch) else {
            continue;
        };
        trace!(
            "{} publishing {} samples from {}",
            transmission.trace,
            transmission.samples.len(),
            transmission.origin
        );
        if transmissions.send(transmission).await.is_err() {
            debug!("transmission consumer went away");
            consumer_gone = true;
        }
    }
}

// =============================================================================
// Encode
// =============================================================================

/// Voice datagrams for one outgoing transmission
#[derive(Debug, Clone)]
pub struct OutgoingBatch {
    pub trace: Trace,
    /// Encoded voice packets, one per frame, in send order
    pub datagrams: Vec<Vec<u8>>,
}

/// Packetizer for this client's outgoing audio
///
/// Owns the sequence counter, which starts at 1 and keeps counting across
/// transmissions.
pub struct PacketEncoder {
    guid: Guid,
    unit_id: u32,
    frequencies: Vec<FrequencyRecord>,
    next_sequence: u64,
}

impl PacketEncoder {
    pub fn new(guid: Guid, unit_id: u32, radios: &[Radio]) -> Self {
        Self {
            guid,
            unit_id,
            frequencies: radios.iter().map(FrequencyRecord::from).collect(),
            next_sequence: 1,
        }
    }

    /// Sequence number the next packet will carry
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Encode audio into voice datagrams
    ///
    /// The last frame is zero-padded. Any failure drops the whole
    /// transmission and leaves the sequence counter untouched.
    pub fn encode(&mut self, audio: &OutgoingAudio) -> Result<OutgoingBatch, CodecError> {
        let mut encoder = VoiceEncoder::new()?;

        let mut frames = Vec::with_capacity(audio.samples.len().div_ceil(VOICE_SAMPLES_PER_FRAME));
        for chunk in audio.samples.chunks(VOICE_SAMPLES_PER_FRAME) {
            let frame = if chunk.len() == VOICE_SAMPLES_PER_FRAME {
                encoder.encode(chunk)?
            } else {
                let mut padded = chunk.to_vec();
                padded.resize(VOICE_SAMPLES_PER_FRAME, 0.0);
                encoder.encode(&padded)?
            };
            frames.push(frame);
        }

        let mut datagrams = Vec::with_capacity(frames.len());
        for (i, audio_frame) in frames.into_iter().enumerate() {
            let packet = VoicePacket::new(
                audio_frame,
                self.frequencies.clone(),
                self.unit_id,
                self.next_sequence + i as u64,
                self.guid,
            );
            datagrams.push(packet.encode()?);
        }
        self.next_sequence += datagrams.len() as u64;

        Ok(OutgoingBatch {
            trace: audio.trace,
            datagrams,
        })
    }
}

/// Encode outgoing audio and hand it to the transmitter
pub async fn run_encoder(
    mut audio: mpsc::Receiver<OutgoingAudio>,
    mut encoder: PacketEncoder,
    batches: mpsc::Sender<OutgoingBatch>,
    cancel: CancellationToken,
) {
    loop {
        let outgoing = tokio::select! {
            _ = cancel.cancelled() => break,
            outgoing = audio.recv() => match outgoing {
                Some(outgoing) => outgoing,
                None => break,
            },
        };

        match encoder.encode(&outgoing) {
            Ok(batch) if batch.datagrams.is_empty() => {
                debug!("{} nothing to transmit", outgoing.trace);
            }
            Ok(batch) => {
                debug!(
                    "{} encoded {} packets in {:?}",
                    batch.trace,
                    batch.datagrams.len(),
                    batch.trace.elapsed()
                );
                if batches.send(batch).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("{} dropping transmission: {e}", outgoing.trace),
        }
    }
}
