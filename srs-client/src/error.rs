//! Error types for the radio client

use std::io;
use std::time::Duration;

use thiserror::Error;

use srs_common::framing::FrameError;
use srs_common::guid::GuidError;
use srs_common::radio::FrequencyError;
use srs_common::voice::EncodeError;

/// Invalid client configuration
///
/// Only returned while building a client; a running client never sees it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("server address must not be empty")]
    EmptyAddress,

    #[error("server address '{0}' must be host:port with a valid port")]
    InvalidAddress(String),

    #[error("at least one radio must be configured")]
    NoRadios,

    #[error("connection timeout must be greater than zero")]
    ZeroTimeout,

    #[error(transparent)]
    Frequency(#[from] FrequencyError),

    #[error("invalid client guid: {0}")]
    Guid(#[from] GuidError),

    #[error("invalid config document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
}

/// Transport failure on either socket
///
/// Always recovered by reconnecting.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to resolve {0}")]
    Resolve(String),

    #[error("connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("session channel: {0}")]
    Frame(#[from] FrameError),

    #[error("no voice data within {0:?}")]
    UdpReadTimeout(Duration),

    #[error("server closed the session channel")]
    Closed,
}

/// Opus encoder or decoder failure
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to create opus {what}: {source}")]
    Create {
        what: &'static str,
        #[source]
        source: opus::Error,
    },

    #[error("expected {expected} samples, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("opus encode error: {0}")]
    Encode(#[source] opus::Error),

    #[error("opus decode error: {0}")]
    Decode(#[source] opus::Error),

    #[error(transparent)]
    Packet(#[from] EncodeError),
}

/// Top-level error from [`RadioClient::run`](crate::RadioClient::run)
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("background task '{name}' failed: {source}")]
    Task {
        name: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}
