//! WHIP/WHEP client sessions
//!
//! - [`WhipPublisher`]: ingest, publishes caller streams
//! - [`WhepPlayer`]: egress, receives one video and one audio stream
//!
//! [`open`] picks the role at runtime.

pub mod config;
pub mod player;
pub mod publisher;

pub use config::ClientConfig;
pub use player::{WhepPlayer, AUDIO_STREAM, VIDEO_STREAM};
pub use publisher::WhipPublisher;

use crate::error::Result;
use crate::media::{Packet, StreamParams};
use crate::session::state::ConnectionState;
use crate::session::Backend;
use crate::stats::SessionStats;

/// Session role
#[derive(Debug, Clone)]
pub enum Role {
    /// Publish the given streams (WHIP)
    Ingest(Vec<StreamParams>),
    /// Receive video and audio (WHEP)
    Egress,
}

/// An open session of either role
pub enum ClientSession {
    Publisher(WhipPublisher),
    Player(WhepPlayer),
}

impl ClientSession {
    /// Parameters of the session's streams, in stream index order
    pub fn streams(&self) -> &[StreamParams] {
        match self {
            ClientSession::Publisher(p) => p.streams(),
            ClientSession::Player(p) => p.streams(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self {
            ClientSession::Publisher(p) => p.state(),
            ClientSession::Player(p) => p.state(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        match self {
            ClientSession::Publisher(p) => p.stats(),
            ClientSession::Player(p) => p.stats(),
        }
    }

    pub fn as_publisher(&mut self) -> Option<&mut WhipPublisher> {
        match self {
            ClientSession::Publisher(p) => Some(p),
            ClientSession::Player(_) => None,
        }
    }

    pub fn as_player(&mut self) -> Option<&mut WhepPlayer> {
        match self {
            ClientSession::Player(p) => Some(p),
            ClientSession::Publisher(_) => None,
        }
    }

    /// Close the session. Idempotent.
    pub async fn close(&mut self) {
        match self {
            ClientSession::Publisher(p) => p.close().await,
            ClientSession::Player(p) => p.close().await,
        }
    }
}

/// Open a session in the given role
pub async fn open(role: Role, config: ClientConfig, backend: &Backend) -> Result<ClientSession> {
    match role {
        Role::Ingest(streams) => Ok(ClientSession::Publisher(
            WhipPublisher::open(config, backend, streams).await?,
        )),
        Role::Egress => Ok(ClientSession::Player(WhepPlayer::open(config, backend).await?)),
    }
}

/// Forward a packet to an ingest session
pub fn write_packet(session: &mut ClientSession, packet: &Packet) -> Result<()> {
    match session.as_publisher() {
        Some(publisher) => publisher.write_packet(packet),
        None => Err(crate::error::Error::Internal("write on an egress session")),
    }
}
