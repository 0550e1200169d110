//! Shared helpers for radio client integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::timeout;

use srs_common::framing::{LineReader, LineWriter};
use srs_common::guid::GUID_LENGTH;
use srs_common::io::{read_message, send_message};
use srs_common::protocol::Message;
use srs_common::voice::VoicePacket;

/// Upper bound on any single wait in these tests
pub const WAIT: Duration = Duration::from_secs(5);

/// Install a test logger once; `RUST_LOG=debug` shows client logs
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Fake Server
// ============================================================================

/// A local server speaking just enough of the protocol to drive a client
pub struct FakeServer {
    pub listener: TcpListener,
    pub udp: UdpSocket,
    pub address: String,
}

/// One accepted session
pub struct FakeSession {
    pub reader: LineReader<OwnedReadHalf>,
    pub writer: LineWriter<OwnedWriteHalf>,
}

impl FakeServer {
    /// Bind TCP and UDP on the same local port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let udp = UdpSocket::bind(addr).await.unwrap();
        Self {
            listener,
            udp,
            address: addr.to_string(),
        }
    }

    /// Accept the next session connection
    pub async fn accept(&self) -> FakeSession {
        let (stream, _) = timeout(WAIT, self.listener.accept())
            .await
            .expect("client should connect")
            .unwrap();
        let (read, write) = stream.into_split();
        FakeSession {
            reader: LineReader::new(read),
            writer: LineWriter::new(write),
        }
    }

    /// Wait for the client's UDP hello and return its address
    pub async fn udp_hello(&self) -> (SocketAddr, Vec<u8>) {
        let mut buf = [0u8; 2048];
        loop {
            let (len, from) = timeout(WAIT, self.udp.recv_from(&mut buf))
                .await
                .expect("client should say hello on udp")
                .unwrap();
            if len == GUID_LENGTH {
                return (from, buf[..len].to_vec());
            }
        }
    }

    /// Next voice packet sent by the client, skipping pings
    pub async fn next_voice(&self) -> VoicePacket {
        let mut buf = [0u8; 4096];
        loop {
            let (len, _) = timeout(WAIT, self.udp.recv_from(&mut buf))
                .await
                .expect("client should transmit")
                .unwrap();
            if len > GUID_LENGTH {
                return VoicePacket::decode(&buf[..len]).unwrap();
            }
        }
    }

    pub async fn send_voice(&self, to: SocketAddr, packet: &VoicePacket) {
        self.udp.send_to(&packet.encode().unwrap(), to).await.unwrap();
    }
}

impl FakeSession {
    /// Next message from the client
    pub async fn recv(&mut self) -> Message {
        timeout(WAIT, read_message(&mut self.reader))
            .await
            .expect("client should send a message")
            .unwrap()
            .expect("session open")
            .expect("valid json")
    }

    pub async fn send(&mut self, message: &Message) {
        send_message(&mut self.writer, message).await.unwrap();
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.writer.write_line(line).await.unwrap();
    }
}

/// Poll `check` until it holds or [`WAIT`] passes
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
