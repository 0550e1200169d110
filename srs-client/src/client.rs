//! Radio client façade
//!
//! [`RadioClient`] wires the session, connection and voice tasks together.
//! Build it from a [`ClientConfig`], grab the audio intake and the
//! transmission stream, then hand it to [`RadioClient::run`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use srs_common::guid::Guid;
use srs_common::protocol::{ClientInfo, RadioInfo};

use crate::config::{ClientConfig, DEFAULT_UNIT_NAME};
use crate::error::{ClientError, ConfigError};
use crate::network::constants::{SESSION_CHANNEL_SIZE, VOICE_CHANNEL_SIZE};
use crate::network::{ConnectionChannels, ping_interval, run_connection, run_pinger};
use crate::roster::Roster;
use crate::session::{ServerFlags, SessionHandler, run_session};
use crate::voice::pipeline::{PacketEncoder, run_decoder, run_encoder};
use crate::voice::receiver::{Admission, ReceiverSet, SharedReceivers, run_voice_receiver};
use crate::voice::transmitter::{Transmitter, run_transmitter};
use crate::voice::{OutgoingAudio, Transmission};

/// Capacity of the audio intake and transmission output
const AUDIO_CHANNEL_SIZE: usize = 16;

/// A voice radio client
pub struct RadioClient {
    config: ClientConfig,
    roster: Roster,
    flags: Arc<ServerFlags>,
    muted: Arc<AtomicBool>,
    receivers: SharedReceivers,
    audio_tx: mpsc::Sender<OutgoingAudio>,
    audio_rx: mpsc::Receiver<OutgoingAudio>,
    transmissions_tx: mpsc::Sender<Transmission>,
    transmissions_rx: Option<mpsc::Receiver<Transmission>>,
}

impl RadioClient {
    /// Validate `config` and build a client
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_SIZE);
        let (transmissions_tx, transmissions_rx) = mpsc::channel(AUDIO_CHANNEL_SIZE);

        Ok(Self {
            roster: Roster::new(config.guid, config.coalition, config.radios.clone()),
            flags: Arc::new(ServerFlags::default()),
            muted: Arc::new(AtomicBool::new(config.muted)),
            receivers: ReceiverSet::shared(&config.radios),
            audio_tx,
            audio_rx,
            transmissions_tx,
            transmissions_rx: Some(transmissions_rx),
            config,
        })
    }

    /// Identity of this client
    pub fn guid(&self) -> Guid {
        self.config.guid
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Intake for audio to transmit; may be cloned freely
    pub fn audio_sender(&self) -> mpsc::Sender<OutgoingAudio> {
        self.audio_tx.clone()
    }

    /// Stream of received transmissions
    ///
    /// Returns `None` after the first call.
    pub fn take_transmissions(&mut self) -> Option<mpsc::Receiver<Transmission>> {
        self.transmissions_rx.take()
    }

    /// Mute or unmute outgoing audio
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Handle to a mute flag that outlives [`run`](Self::run)
    pub fn mute_handle(&self) -> Arc<AtomicBool> {
        self.muted.clone()
    }

    /// Peer roster handle
    pub fn roster(&self) -> Roster {
        self.roster.clone()
    }

    /// Settings last pushed by the server
    pub fn server_flags(&self) -> Arc<ServerFlags> {
        self.flags.clone()
    }

    /// This client as announced to the server
    fn local_client(&self) -> ClientInfo {
        ClientInfo {
            guid: self.config.guid,
            name: self.config.name.clone(),
            seat: 0,
            coalition: self.config.coalition,
            allow_record: false,
            radio_info: Some(RadioInfo {
                radios: self.config.radios.clone(),
                unit: DEFAULT_UNIT_NAME.to_string(),
                unit_id: self.config.unit_id,
                ..Default::default()
            }),
            position: None,
        }
    }

    /// Own the connection until `cancel` fires
    ///
    /// Reconnects on every transport error. Returns once every task has
    /// stopped; cancellation is not an error.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ClientError> {
        let tasks_cancel = cancel.child_token();
        let local = self.local_client();
        info!(
            "starting radio client {} ({}) on {} radio(s)",
            local.name,
            local.guid,
            self.config.radios.len()
        );

        let (session_out_tx, session_out_rx) = mpsc::channel(SESSION_CHANNEL_SIZE);
        let (session_in_tx, session_in_rx) = mpsc::channel(SESSION_CHANNEL_SIZE);
        let (udp_out_tx, udp_out_rx) = mpsc::channel(VOICE_CHANNEL_SIZE);
        let (voice_in_tx, voice_in_rx) = mpsc::channel(VOICE_CHANNEL_SIZE);
        let (voice_batch_tx, voice_batch_rx) = mpsc::channel(AUDIO_CHANNEL_SIZE);
        let (outgoing_batch_tx, outgoing_batch_rx) = mpsc::channel(AUDIO_CHANNEL_SIZE);

        // Nobody will read transmissions that were never taken
        drop(self.transmissions_rx);

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let handler = SessionHandler::new(
            local,
            self.config.awacs_password.clone(),
            self.roster.clone(),
            self.flags.clone(),
        );
        let ping = handler.ping();
        tasks.push((
            "session",
            tokio::spawn(run_session(
                handler,
                session_in_rx,
                session_out_tx.clone(),
                tasks_cancel.clone(),
            )),
        ));

        tasks.push((
            "pinger",
            tokio::spawn(run_pinger(
                ping_interval(self.config.timeout),
                ping,
                self.config.guid.as_bytes().to_vec(),
                session_out_tx,
                udp_out_tx.clone(),
                tasks_cancel.clone(),
            )),
        ));

        let admission = Admission {
            local_guid: self.config.guid,
            roster: self.roster.clone(),
            flags: self.flags.clone(),
        };
        tasks.push((
            "voice receiver",
            tokio::spawn(run_voice_receiver(
                voice_in_rx,
                self.receivers.clone(),
                admission,
                voice_batch_tx,
                tasks_cancel.clone(),
            )),
        ));

        tasks.push((
            "decoder",
            tokio::spawn(run_decoder(
                voice_batch_rx,
                self.transmissions_tx,
                tasks_cancel.clone(),
            )),
        ));

        let encoder = PacketEncoder::new(self.config.guid, self.config.unit_id, &self.config.radios);
        tasks.push((
            "encoder",
            tokio::spawn(run_encoder(
                self.audio_rx,
                encoder,
                outgoing_batch_tx,
                tasks_cancel.clone(),
            )),
        ));

        let transmitter = Transmitter::new(self.receivers.clone(), udp_out_tx, self.muted.clone());
        tasks.push((
            "transmitter",
            tokio::spawn(run_transmitter(
                outgoing_batch_rx,
                transmitter,
                tasks_cancel.clone(),
            )),
        ));

        let channels = ConnectionChannels {
            session_out: session_out_rx,
            udp_out: udp_out_rx,
            session_in: session_in_tx,
            voice_in: voice_in_tx,
        };
        run_connection(
            self.config.address.clone(),
            self.config.timeout,
            self.config.guid,
            channels,
            tasks_cancel.clone(),
        )
        .await;

        tasks_cancel.cancel();
        let mut first_error = None;
        for (name, handle) in tasks {
            if let Err(source) = handle.await {
                error!("task {name} failed: {source}");
                first_error.get_or_insert(ClientError::Task { name, source });
            }
        }
        info!("radio client stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use srs_common::radio::{Modulation, Radio};

    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new(
            "127.0.0.1:1",
            "Magic",
            vec![Radio::new(251_000_000.0, Modulation::Am)],
        )
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut bad = config();
        bad.radios.clear();
        assert!(matches!(RadioClient::new(bad), Err(ConfigError::NoRadios)));
    }

    #[test]
    fn test_take_transmissions_once() {
        let mut client = RadioClient::new(config()).unwrap();
        assert!(client.take_transmissions().is_some());
        assert!(client.take_transmissions().is_none());
    }

    #[test]
    fn test_mute() {
        let mut muted = config();
        muted.muted = true;
        let client = RadioClient::new(muted).unwrap();
        assert!(client.is_muted());

        let handle = client.mute_handle();
        client.set_muted(false);
        assert!(!client.is_muted());
        assert!(!handle.load(Ordering::Relaxed));
    }

    #[test]
    fn test_local_client() {
        let client = RadioClient::new(config()).unwrap();
        let local = client.local_client();
        assert_eq!(local.guid, client.guid());
        assert_eq!(local.radios().len(), 1);
        assert_eq!(local.radio_info.unwrap().unit_id, crate::config::DEFAULT_UNIT_ID);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_without_server() {
        let mut cfg = config();
        cfg.timeout = Duration::from_millis(200);
        let client = RadioClient::new(cfg).unwrap();
        let cancel = CancellationToken::new();

        let run = tokio::spawn(client.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run should stop promptly")
            .unwrap();
        assert!(result.is_ok());
    }
}
