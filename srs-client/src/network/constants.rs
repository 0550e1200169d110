//! Network module constants

use std::time::Duration;

use srs_common::voice::VOICE_FRAME_DURATION;

/// Read deadline as a multiple of the connection timeout
pub const READ_DEADLINE_FACTOR: u32 = 2;

/// Interval between session and UDP pings
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// First reconnect delay (one audio frame)
pub const BACKOFF_INITIAL: Duration = VOICE_FRAME_DURATION;

/// Longest reconnect delay
pub const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// A connection that stayed up this long resets the reconnect backoff
pub const STABLE_CONNECTION: Duration = Duration::from_secs(10);

/// Receive buffer for UDP datagrams (largest encodable voice packet)
pub const UDP_BUFFER_SIZE: usize = u16::MAX as usize;

/// Capacity of the outbound session message queue
pub const SESSION_CHANNEL_SIZE: usize = 64;

/// Capacity of the UDP datagram and voice packet queues
pub const VOICE_CHANNEL_SIZE: usize = 256;
