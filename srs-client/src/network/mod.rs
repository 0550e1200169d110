//! Connection management
//!
//! Dialing, serving and redialing the TCP + UDP connection pair.

mod backoff;
mod connection;
pub mod constants;
mod ping;

pub use backoff::{Backoff, retry};
pub use connection::{Connection, ConnectionChannels, run_connection};
pub use ping::{ping_interval, run_pinger};
