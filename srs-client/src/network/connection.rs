//! TCP + UDP connection pair
//!
//! A [`Connection`] owns one TCP stream (session channel) and one connected
//! UDP socket (voice and pings). Other tasks only ever see channels; the
//! sockets live and die inside [`Connection::serve`].

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

use srs_common::framing::{FrameError, LineReader, LineWriter};
use srs_common::guid::{GUID_LENGTH, Guid};
use srs_common::io::{read_message, send_message};
use srs_common::protocol::Message;
use srs_common::voice::{VoicePacket, is_ping};

use super::backoff::{Backoff, retry};
use super::constants::{READ_DEADLINE_FACTOR, STABLE_CONNECTION, UDP_BUFFER_SIZE};
use crate::error::ConnectionError;
use crate::session::SessionEvent;

// =============================================================================
// Channels
// =============================================================================

/// Channels connecting the socket tasks to the rest of the client
///
/// These outlive any single connection: the same queues are served by every
/// reconnect.
pub struct ConnectionChannels {
    /// Session messages to write to the TCP stream
    pub session_out: mpsc::Receiver<Message>,
    /// Raw datagrams to write to the UDP socket
    pub udp_out: mpsc::Receiver<Vec<u8>>,
    /// Session events (connect, inbound messages, disconnect)
    pub session_in: mpsc::Sender<SessionEvent>,
    /// Decoded voice packets
    pub voice_in: mpsc::Sender<VoicePacket>,
}

impl ConnectionChannels {
    /// Drop anything queued for a connection that no longer exists
    fn discard_stale(&mut self) {
        let mut dropped = 0;
        while self.session_out.try_recv().is_ok() {
            dropped += 1;
        }
        while self.udp_out.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("discarded {dropped} messages queued while disconnected");
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// An established connection pair
pub struct Connection {
    tcp: TcpStream,
    udp: UdpSocket,
    peer: SocketAddr,
}

impl Connection {
    /// Resolve `address` and open both sockets
    ///
    /// Resolution, the TCP connect and the UDP setup are each bounded by
    /// `connect_timeout`.
    pub async fn dial(address: &str, connect_timeout: Duration) -> Result<Self, ConnectionError> {
        let timed_out = || ConnectionError::ConnectTimeout {
            addr: address.to_string(),
            timeout: connect_timeout,
        };

        let peer = timeout(connect_timeout, lookup_host(address))
            .await
            .map_err(|_| timed_out())??
            .next()
            .ok_or_else(|| ConnectionError::Resolve(address.to_string()))?;

        let tcp = timeout(connect_timeout, TcpStream::connect(peer))
            .await
            .map_err(|_| timed_out())??;
        tcp.set_nodelay(true)?;

        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let udp = timeout(connect_timeout, async {
            let udp = UdpSocket::bind(local).await?;
            udp.connect(peer).await?;
            Ok::<_, std::io::Error>(udp)
        })
        .await
        .map_err(|_| timed_out())??;

        Ok(Self { tcp, udp, peer })
    }

    /// Address of the server
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Pump both sockets until a transport error or cancellation
    ///
    /// Returns `Ok(())` only when `cancel` fires. Both sockets are closed
    /// and both reader tasks have exited by the time this returns.
    pub async fn serve(
        self,
        channels: &mut ConnectionChannels,
        read_deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectionError> {
        let epoch = cancel.child_token();
        let (tcp_read, tcp_write) = self.tcp.into_split();
        let mut writer = LineWriter::new(tcp_write);
        let udp = Arc::new(self.udp);

        let mut tcp_task = tokio::spawn(read_session(
            LineReader::new(tcp_read),
            channels.session_in.clone(),
            read_deadline,
            epoch.clone(),
        ));
        let mut udp_task = tokio::spawn(read_datagrams(
            udp.clone(),
            channels.voice_in.clone(),
            read_deadline,
            epoch.clone(),
        ));

        let mut tcp_done = false;
        let mut udp_done = false;
        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),

                result = &mut tcp_task, if !tcp_done => {
                    tcp_done = true;
                    break flatten(result);
                }
                result = &mut udp_task, if !udp_done => {
                    udp_done = true;
                    break flatten(result);
                }

                Some(message) = channels.session_out.recv() => {
                    trace!("session -> {:?}", message.msg_type);
                    if let Err(e) = send_message(&mut writer, &message).await {
                        break Err(e.into());
                    }
                }

                Some(datagram) = channels.udp_out.recv() => {
                    if let Err(e) = udp.send(&datagram).await {
                        break Err(e.into());
                    }
                }
            }
        };

        // Stop the readers before the sockets go away
        epoch.cancel();
        if !tcp_done {
            let _ = tcp_task.await;
        }
        if !udp_done {
            let _ = udp_task.await;
        }
        let _ = writer.get_mut().shutdown().await;

        result
    }
}

/// Collapse a reader task's join result
fn flatten(
    result: Result<Result<(), ConnectionError>, tokio::task::JoinError>,
) -> Result<(), ConnectionError> {
    match result {
        Ok(result) => result,
        Err(e) => Err(ConnectionError::Io(std::io::Error::other(e))),
    }
}

// =============================================================================
// Reader Tasks
// =============================================================================

/// Read session messages until the stream fails or the epoch ends
async fn read_session(
    mut reader: LineReader<OwnedReadHalf>,
    session_in: mpsc::Sender<SessionEvent>,
    read_deadline: Duration,
    epoch: CancellationToken,
) -> Result<(), ConnectionError> {
    loop {
        let read = tokio::select! {
            _ = epoch.cancelled() => return Ok(()),
            read = timeout(read_deadline, read_message(&mut reader)) => read,
        };

        match read {
            Err(_) => return Err(FrameError::ReadTimeout(read_deadline).into()),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(None)) => return Err(ConnectionError::Closed),
            Ok(Ok(Some(Err(e)))) => {
                warn!("discarding malformed session message: {e}");
            }
            Ok(Ok(Some(Ok(message)))) => {
                if session_in
                    .send(SessionEvent::Message(Box::new(message)))
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }
        }
    }
}

/// Read datagrams, split pings from voice and forward decoded packets
async fn read_datagrams(
    udp: Arc<UdpSocket>,
    voice_in: mpsc::Sender<VoicePacket>,
    read_deadline: Duration,
    epoch: CancellationToken,
) -> Result<(), ConnectionError> {
    let mut buf = vec![0u8; UDP_BUFFER_SIZE];
    loop {
        let read = tokio::select! {
            _ = epoch.cancelled() => return Ok(()),
            read = timeout(read_deadline, udp.recv(&mut buf)) => read,
        };

        let len = match read {
            Err(_) => return Err(ConnectionError::UdpReadTimeout(read_deadline)),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(len)) => len,
        };

        let datagram = &buf[..len];
        if is_ping(datagram) {
            trace!("udp ping from server");
            continue;
        }
        if len < GUID_LENGTH {
            debug!("dropping {len}-byte datagram");
            continue;
        }

        match VoicePacket::decode(datagram) {
            Ok(packet) => {
                trace!(
                    "voice packet {} from {} ({} bytes audio)",
                    packet.sequence,
                    packet.origin,
                    packet.audio_len()
                );
                if voice_in.send(packet).await.is_err() {
                    return Ok(());
                }
            }
            Err(e) => debug!("dropping malformed voice packet: {e}"),
        }
    }
}

// =============================================================================
// Connection Loop
// =============================================================================

/// Keep a connection to `address` alive until `cancel` fires
///
/// Dials with backoff, greets the server on UDP with `guid`, announces each
/// new connection to the session task, serves it, and redials on any
/// transport error. Redials wait on the same backoff schedule as failed
/// dials; it only starts over after a connection lasted
/// [`STABLE_CONNECTION`].
pub async fn run_connection(
    address: String,
    connect_timeout: Duration,
    guid: Guid,
    mut channels: ConnectionChannels,
    cancel: CancellationToken,
) {
    let read_deadline = connect_timeout * READ_DEADLINE_FACTOR;
    let mut backoff = Backoff::default();
    let target = address.as_str();

    loop {
        let Some(connection) = retry(&mut backoff, &cancel, move || {
            Connection::dial(target, connect_timeout)
        })
        .await
        else {
            break;
        };
        info!("connected to {} ({})", address, connection.peer());
        let connected_at = Instant::now();

        channels.discard_stale();
        if let Err(e) = connection.udp.send(guid.as_bytes()).await {
            warn!("udp hello to {address} failed: {e}");
        }
        if channels.session_in.send(SessionEvent::Connected).await.is_err() {
            break;
        }

        let result = connection
            .serve(&mut channels, read_deadline, &cancel)
            .await;
        let _ = channels.session_in.send(SessionEvent::Disconnected).await;

        match result {
            Ok(()) => break,
            Err(e) => warn!("connection to {address} lost: {e}"),
        }

        if connected_at.elapsed() >= STABLE_CONNECTION {
            backoff.reset();
        }
        let delay = backoff.next_delay();
        debug!("redialing {address} in {delay:?}");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }
    info!("connection loop stopped");
}
