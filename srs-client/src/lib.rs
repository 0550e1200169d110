//! SRS radio client
//!
//! Joins an SRS voice-radio server as a bot client: keeps the TCP session
//! and UDP voice channels alive, tracks which peers are relevant, turns the
//! UDP packet stream back into discrete transmissions and paces outgoing
//! audio around incoming traffic.
//!
//! ```no_run
//! use srs_client::{ClientConfig, RadioClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_file("radio.json")?;
//! let mut client = RadioClient::new(config)?;
//! let mut transmissions = client.take_transmissions().unwrap();
//! let roster = client.roster();
//! let cancel = CancellationToken::new();
//! tokio::spawn(client.run(cancel.clone()));
//!
//! while let Some(transmission) = transmissions.recv().await {
//!     let name = roster.get(&transmission.origin).await.map(|peer| peer.name);
//!     println!("{name:?} spoke for {:?}", transmission.duration());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod roster;
pub mod session;
pub mod trace;
pub mod voice;

pub use client::RadioClient;
pub use config::ClientConfig;
pub use error::{ClientError, CodecError, ConfigError, ConnectionError};
pub use roster::Roster;
pub use trace::Trace;
pub use voice::{OutgoingAudio, Transmission};
