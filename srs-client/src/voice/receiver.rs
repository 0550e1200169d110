//! Per-radio jitter buffers
//!
//! The voice protocol has no explicit start or end of transmission. Each
//! local radio gets a [`Receiver`] that latches onto the first talker it
//! hears, collects that talker's packets in sequence order, and declares the
//! transmission over once nothing has arrived for [`MAX_GAP`].

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use srs_common::guid::Guid;
use srs_common::radio::Radio;
use srs_common::voice::{VOICE_FRAME_DURATION, VoicePacket};

use crate::roster::Roster;
use crate::session::ServerFlags;
use crate::trace::Trace;

// =============================================================================
// Constants
// =============================================================================

/// Silence after which a transmission is considered finished
pub const MAX_GAP: Duration = Duration::from_millis(300);

/// Transmissions this short or shorter are discarded (key clicks)
pub const MIN_TRANSMISSION: Duration = Duration::from_millis(100);

/// How often receivers are checked for finished transmissions
pub const CHECK_INTERVAL: Duration = VOICE_FRAME_DURATION;

// =============================================================================
// Completed Buffer
// =============================================================================

/// Packets of one finished transmission, ready to decode
#[derive(Debug, Clone)]
pub struct VoiceBatch {
    pub trace: Trace,
    /// Local radio the transmission was heard on
    pub radio: Radio,
    pub origin: Guid,
    /// Packets in sequence order
    pub packets: Vec<VoicePacket>,
}

impl VoiceBatch {
    /// Audio duration, one frame per packet
    pub fn duration(&self) -> Duration {
        VOICE_FRAME_DURATION * self.packets.len() as u32
    }
}

// =============================================================================
// Receiver
// =============================================================================

/// Jitter buffer for a single local radio
#[derive(Debug)]
pub struct Receiver {
    radio: Radio,
    origin: Option<Guid>,
    packets: Vec<VoicePacket>,
    trace: Option<Trace>,
    deadline: Option<Instant>,
    last_sequence: u64,
}

impl Receiver {
    pub fn new(radio: Radio) -> Self {
        Self {
            radio,
            origin: None,
            packets: Vec::new(),
            trace: None,
            deadline: None,
            last_sequence: 0,
        }
    }

    /// Radio this receiver listens on
    pub fn radio(&self) -> &Radio {
        &self.radio
    }

    /// Talker currently latched, if any
    pub fn origin(&self) -> Option<Guid> {
        self.origin
    }

    /// Whether a transmission is being collected
    pub fn is_filling(&self) -> bool {
        !self.packets.is_empty()
    }

    /// When the current transmission ends if nothing else arrives
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Offer a packet to this receiver
    ///
    /// An idle receiver takes any packet and latches onto its origin. A
    /// filling receiver only takes newer packets from the same origin.
    pub fn accept(&mut self, packet: VoicePacket, now: Instant) -> bool {
        let idle = self.origin.is_none() && self.last_sequence == 0;
        let continues = self.origin == Some(packet.origin) && packet.sequence > self.last_sequence;
        if !idle && !continues {
            return false;
        }

        if idle {
            let trace = Trace::new(now);
            debug!(
                "{trace} {} started talking on {}",
                packet.origin, self.radio
            );
            self.trace = Some(trace);
            self.origin = Some(packet.origin);
        }
        self.last_sequence = packet.sequence;
        self.deadline = Some(now + MAX_GAP);
        self.packets.push(packet);
        true
    }

    /// Hand over the buffered transmission if it has ended
    ///
    /// Nothing happens while packets may still be queued upstream
    /// (`queue_empty == false`) or before the deadline. Once it has ended
    /// the receiver resets; the packets are returned only if they add up to
    /// more than [`MIN_TRANSMISSION`].
    pub fn complete(&mut self, now: Instant, queue_empty: bool) -> Option<VoiceBatch> {
        if self.packets.is_empty() || !queue_empty {
            return None;
        }
        match self.deadline {
            Some(deadline) if now > deadline => {}
            _ => return None,
        }

        let packets = std::mem::take(&mut self.packets);
        let trace = self.trace.take().unwrap_or_else(|| Trace::new(now));
        let origin = self.origin.take();
        self.deadline = None;
        self.last_sequence = 0;

        let batch = VoiceBatch {
            trace,
            radio: self.radio,
            origin: origin?,
            packets,
        };
        if batch.duration() > MIN_TRANSMISSION {
            debug!(
                "{} transmission from {} on {} complete: {} packets",
                batch.trace,
                batch.origin,
                self.radio,
                batch.packets.len()
            );
            Some(batch)
        } else {
            debug!(
                "{} discarding {:?} transmission from {}",
                batch.trace,
                batch.duration(),
                batch.origin
            );
            None
        }
    }
}

// =============================================================================
// Receiver Set
// =============================================================================

/// One receiver per configured radio
#[derive(Debug)]
pub struct ReceiverSet {
    receivers: Vec<Receiver>,
}

/// Receiver set shared between the voice task and the transmitter
pub type SharedReceivers = Arc<Mutex<ReceiverSet>>;

impl ReceiverSet {
    pub fn new(radios: &[Radio]) -> Self {
        Self {
            receivers: radios.iter().copied().map(Receiver::new).collect(),
        }
    }

    /// Create a shared handle
    pub fn shared(radios: &[Radio]) -> SharedReceivers {
        Arc::new(Mutex::new(Self::new(radios)))
    }

    /// Offer a packet to every receiver whose radio it is transmitted on
    ///
    /// Returns the number of receivers that accepted it.
    pub fn route(&mut self, packet: &VoicePacket, now: Instant) -> usize {
        self.receivers
            .iter_mut()
            .filter(|receiver| packet.is_on(&receiver.radio))
            .map(|receiver| receiver.accept(packet.clone(), now))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Collect every transmission that has ended
    pub fn complete(&mut self, now: Instant, queue_empty: bool) -> Vec<VoiceBatch> {
        self.receivers
            .iter_mut()
            .filter_map(|receiver| receiver.complete(now, queue_empty))
            .collect()
    }

    /// Latest deadline among receivers currently collecting audio
    pub fn latest_deadline(&self) -> Option<Instant> {
        self.receivers
            .iter()
            .filter(|receiver| receiver.is_filling())
            .filter_map(Receiver::deadline)
            .max()
    }

    pub fn receivers(&self) -> &[Receiver] {
        &self.receivers
    }
}

// =============================================================================
// Voice Receive Task
// =============================================================================

/// Packet admission rules applied before any receiver sees a packet
pub struct Admission {
    pub local_guid: Guid,
    pub roster: Roster,
    pub flags: Arc<ServerFlags>,
}

impl Admission {
    /// Whether a packet may be buffered
    pub async fn admits(&self, packet: &VoicePacket) -> bool {
        if packet.origin == self.local_guid {
            trace!("dropping echo of our own packet {}", packet.sequence);
            return false;
        }
        if self.flags.coalition_security() && !self.roster.contains(&packet.origin).await {
            trace!("dropping packet from {} (not in roster)", packet.origin);
            return false;
        }
        true
    }
}

/// Buffer incoming packets and emit finished transmissions
///
/// Checks for finished transmissions every [`CHECK_INTERVAL`].
pub async fn run_voice_receiver(
    mut packets: mpsc::Receiver<VoicePacket>,
    receivers: SharedReceivers,
    admission: Admission,
    batches: mpsc::Sender<VoiceBatch>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            packet = packets.recv() => {
                let Some(packet) = packet else { break };
                if !admission.admits(&packet).await {
                    continue;
                }
                let accepted = receivers.lock().await.route(&packet, Instant::now());
                if accepted == 0 {
                    trace!("packet {} from {} not accepted", packet.sequence, packet.origin);
                }
            }

            _ = ticker.tick() => {
                let finished = receivers
                    .lock()
                    .await
                    .complete(Instant::now(), packets.is_empty());
                for batch in finished {
                    if batches.send(batch).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
    debug!("voice receiver stopped");
}

#[cfg(test)]
mod tests {
    use srs_common::protocol::{ClientInfo, RadioInfo};
    use srs_common::radio::{Coalition, Modulation};
    use srs_common::voice::FrequencyRecord;

    use super::*;

    const UHF: f64 = 251_000_000.0;

    fn radio() -> Radio {
        Radio::new(UHF, Modulation::Am)
    }

    fn packet(origin: Guid, sequence: u64) -> VoicePacket {
        VoicePacket {
            audio: vec![0xAB; 8],
            frequencies: vec![FrequencyRecord::from(&radio())],
            unit_id: 7,
            sequence,
            hops: 0,
            relay: origin,
            origin,
        }
    }

    #[test]
    fn test_accept_latches_origin() {
        let now = Instant::now();
        let mut receiver = Receiver::new(radio());
        let x = Guid::generate();
        let y = Guid::generate();

        assert!(receiver.accept(packet(x, 1), now));
        assert_eq!(receiver.origin(), Some(x));
        assert!(!receiver.accept(packet(y, 5), now));
        assert!(receiver.accept(packet(x, 2), now));
    }

    #[test]
    fn test_accept_rejects_old_sequences() {
        let now = Instant::now();
        let mut receiver = Receiver::new(radio());
        let x = Guid::generate();

        assert!(receiver.accept(packet(x, 5), now));
        assert!(!receiver.accept(packet(x, 5), now));
        assert!(!receiver.accept(packet(x, 4), now));
        assert!(receiver.accept(packet(x, 9), now));
    }

    #[test]
    fn test_deadline_moves_with_each_packet() {
        let start = Instant::now();
        let mut receiver = Receiver::new(radio());
        let x = Guid::generate();

        receiver.accept(packet(x, 1), start);
        assert_eq!(receiver.deadline(), Some(start + MAX_GAP));

        let later = start + Duration::from_millis(40);
        receiver.accept(packet(x, 2), later);
        assert_eq!(receiver.deadline(), Some(later + MAX_GAP));
    }

    #[test]
    fn test_complete_after_gap() {
        let start = Instant::now();
        let mut receiver = Receiver::new(radio());
        let x = Guid::generate();
        for sequence in 1..=3 {
            receiver.accept(packet(x, sequence), start);
        }

        // Not before the deadline, not while packets are queued
        assert!(receiver.complete(start + MAX_GAP, true).is_none());
        assert!(receiver.complete(start + Duration::from_millis(350), false).is_none());
        assert!(receiver.is_filling());

        let batch = receiver
            .complete(start + Duration::from_millis(350), true)
            .unwrap();
        assert_eq!(batch.origin, x);
        let sequences: Vec<_> = batch.packets.iter().map(|p| p.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(batch.duration(), Duration::from_millis(120));

        assert!(!receiver.is_filling());
        assert_eq!(receiver.origin(), None);
        assert_eq!(receiver.deadline(), None);
    }

    #[test]
    fn test_short_transmission_discarded() {
        let start = Instant::now();
        let mut receiver = Receiver::new(radio());
        let x = Guid::generate();
        receiver.accept(packet(x, 1), start);
        receiver.accept(packet(x, 2), start);

        // 80 ms is under the minimum
        assert!(receiver.complete(start + Duration::from_secs(1), true).is_none());
        assert!(!receiver.is_filling());

        // Reset lets a new talker in
        let y = Guid::generate();
        assert!(receiver.accept(packet(y, 1), start + Duration::from_secs(1)));
    }

    #[test]
    fn test_new_talker_after_reset() {
        let start = Instant::now();
        let mut receiver = Receiver::new(radio());
        let x = Guid::generate();
        for sequence in 10..14 {
            receiver.accept(packet(x, sequence), start);
        }
        receiver.complete(start + Duration::from_secs(1), true).unwrap();

        // Same talker with a restarted counter is accepted again
        assert!(receiver.accept(packet(x, 1), start + Duration::from_secs(2)));
    }

    #[test]
    fn test_set_routes_by_frequency() {
        let now = Instant::now();
        let vhf = Radio::new(133_000_000.0, Modulation::Am);
        let mut set = ReceiverSet::new(&[radio(), vhf]);
        let x = Guid::generate();

        assert_eq!(set.route(&packet(x, 1), now), 1);
        assert!(set.receivers()[0].is_filling());
        assert!(!set.receivers()[1].is_filling());

        let mut both = packet(x, 2);
        both.frequencies.push(FrequencyRecord::from(&vhf));
        assert_eq!(set.route(&both, now), 2);
    }

    #[test]
    fn test_set_routes_guard_frequency() {
        let now = Instant::now();
        let mut vhf = Radio::new(133_000_000.0, Modulation::Am);
        vhf.guard_frequency = UHF;
        let mut set = ReceiverSet::new(&[vhf]);

        assert_eq!(set.route(&packet(Guid::generate(), 1), now), 1);
        assert!(set.receivers()[0].is_filling());
    }

    #[test]
    fn test_set_latest_deadline() {
        let start = Instant::now();
        let vhf = Radio::new(133_000_000.0, Modulation::Am);
        let mut set = ReceiverSet::new(&[radio(), vhf]);
        assert_eq!(set.latest_deadline(), None);

        let x = Guid::generate();
        set.route(&packet(x, 1), start);

        let mut on_vhf = packet(Guid::generate(), 1);
        on_vhf.frequencies = vec![FrequencyRecord::from(&vhf)];
        let later = start + Duration::from_millis(100);
        set.route(&on_vhf, later);

        assert_eq!(set.latest_deadline(), Some(later + MAX_GAP));
    }

    fn admission(coalition_security: bool) -> (Admission, Guid) {
        let local = Guid::generate();
        let flags = Arc::new(ServerFlags::default());
        flags.set_coalition_security(coalition_security);
        let admission = Admission {
            local_guid: local,
            roster: Roster::new(local, Coalition::Blue, vec![radio()]),
            flags,
        };
        (admission, local)
    }

    #[tokio::test]
    async fn test_admission_rejects_echo() {
        let (admission, local) = admission(false);
        assert!(!admission.admits(&packet(local, 1)).await);
        assert!(admission.admits(&packet(Guid::generate(), 1)).await);
    }

    #[tokio::test]
    async fn test_admission_coalition_security() {
        let (admission, _) = admission(true);
        let friend = Guid::generate();
        assert!(!admission.admits(&packet(friend, 1)).await);

        admission
            .roster
            .upsert(ClientInfo {
                guid: friend,
                name: "Viper 1-1".to_string(),
                seat: 0,
                coalition: Coalition::Blue,
                allow_record: false,
                radio_info: Some(RadioInfo {
                    radios: vec![radio()],
                    ..Default::default()
                }),
                position: None,
            })
            .await;
        assert!(admission.admits(&packet(friend, 1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receiver_task_emits_once() {
        let (packet_tx, packet_rx) = mpsc::channel(16);
        let (batch_tx, mut batch_rx) = mpsc::channel(4);
        let receivers = ReceiverSet::shared(&[radio()]);
        let (admission, _) = admission(false);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_voice_receiver(
            packet_rx,
            receivers.clone(),
            admission,
            batch_tx,
            cancel.clone(),
        ));

        let x = Guid::generate();
        for sequence in 1..=3 {
            packet_tx.send(packet(x, sequence)).await.unwrap();
            tokio::time::sleep(VOICE_FRAME_DURATION).await;
        }
        tokio::time::sleep(Duration::from_millis(350)).await;

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.packets.len(), 3);
        assert!(batch_rx.try_recv().is_err());
        assert!(!receivers.lock().await.receivers()[0].is_filling());

        cancel.cancel();
        task.await.unwrap();
    }
}
