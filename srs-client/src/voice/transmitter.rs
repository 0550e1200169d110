//! Paced voice transmitter
//!
//! Writes one packet per frame slot, in the middle of the slot, and never
//! talks over a transmission we are still receiving.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;

use srs_common::voice::VOICE_FRAME_DURATION;

use super::pipeline::OutgoingBatch;
use super::receiver::SharedReceivers;

// =============================================================================
// Constants
// =============================================================================

/// Extra wait after an incoming transmission's deadline
pub const SAFETY_MARGIN: Duration = Duration::from_millis(100);

/// Pause after each transmission, in milliseconds (upper bound exclusive)
pub const PAUSE_RANGE_MS: std::ops::Range<u64> = 400..800;

// =============================================================================
// Transmitter
// =============================================================================

/// Serializes outgoing transmissions onto the UDP channel
pub struct Transmitter {
    receivers: SharedReceivers,
    udp_out: mpsc::Sender<Vec<u8>>,
    muted: Arc<AtomicBool>,
}

impl Transmitter {
    pub fn new(
        receivers: SharedReceivers,
        udp_out: mpsc::Sender<Vec<u8>>,
        muted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            receivers,
            udp_out,
            muted,
        }
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Wait until no receiver has been busy for [`SAFETY_MARGIN`]
    ///
    /// Returns `false` if cancelled.
    async fn wait_for_clear_channel(&self, batch: &OutgoingBatch, cancel: &CancellationToken) -> bool {
        loop {
            let latest = self.receivers.lock().await.latest_deadline();
            let clear_at = match latest {
                Some(deadline) if deadline + SAFETY_MARGIN > Instant::now() => {
                    deadline + SAFETY_MARGIN
                }
                _ => return true,
            };
            debug!(
                "{} channel busy, holding for {:?}",
                batch.trace,
                clear_at.saturating_duration_since(Instant::now())
            );
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = sleep_until(clear_at) => {}
            }
        }
    }

    /// Send one transmission
    ///
    /// Returns the number of packets written.
    pub async fn transmit(&self, batch: OutgoingBatch, cancel: &CancellationToken) -> usize {
        if self.is_muted() {
            debug!("{} muted, discarding transmission", batch.trace);
            return 0;
        }
        if !self.wait_for_clear_channel(&batch, cancel).await {
            return 0;
        }

        let start = Instant::now();
        let mut sent = 0;
        for (i, datagram) in batch.datagrams.into_iter().enumerate() {
            if self.is_muted() {
                debug!("{} muted mid-transmission after {sent} packets", batch.trace);
                break;
            }
            let slot = start + VOICE_FRAME_DURATION * i as u32 + VOICE_FRAME_DURATION / 2;
            tokio::select! {
                _ = cancel.cancelled() => return sent,
                _ = sleep_until(slot) => {}
            }
            if self.udp_out.send(datagram).await.is_err() {
                return sent;
            }
            sent += 1;
        }

        info!(
            "{} transmitted {sent} packets, {:?} after audio arrived",
            batch.trace,
            batch.trace.elapsed()
        );
        sent
    }
}

/// Random pause between transmissions
fn pause() -> Duration {
    Duration::from_millis(rand::rng().random_range(PAUSE_RANGE_MS))
}

/// Transmit batches one at a time until cancelled
pub async fn run_transmitter(
    mut batches: mpsc::Receiver<OutgoingBatch>,
    transmitter: Transmitter,
    cancel: CancellationToken,
) {
    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            batch = batches.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        if transmitter.transmit(batch, &cancel).await == 0 {
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(pause()) => {}
        }
    }
}
