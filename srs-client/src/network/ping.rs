//! Keepalive pings
//!
//! The server only forwards voice to clients it has recently heard from on
//! UDP, so every ping goes out twice: as a session message and as the bare
//! GUID datagram.

use std::time::Duration;

use log::trace;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use srs_common::protocol::Message;

use super::constants::{PING_INTERVAL, READ_DEADLINE_FACTOR};

/// Ping interval for a given connection timeout
///
/// [`PING_INTERVAL`], shortened to half the read deadline when the timeout
/// is small, so a quiet but healthy server is heard from in time.
pub fn ping_interval(connect_timeout: Duration) -> Duration {
    PING_INTERVAL.min(connect_timeout * READ_DEADLINE_FACTOR / 2)
}

/// Send pings every `period` until cancelled
///
/// Pings are best effort: if a queue is full the ping is skipped.
pub async fn run_pinger(
    period: Duration,
    ping: Message,
    udp_ping: Vec<u8>,
    session_out: mpsc::Sender<Message>,
    udp_out: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick is immediate; the connection sends its own hello
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                trace!("ping");
                let _ = session_out.try_send(ping.clone());
                let _ = udp_out.try_send(udp_ping.clone());
            }
        }
    }
}
