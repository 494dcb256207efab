//! WHIP/WHEP client sessions over an injected WebRTC engine
//!
//! A session publishes caller streams to a WHIP endpoint (ingest) or
//! receives one video and one audio stream from a WHEP endpoint (egress).
//! This crate orchestrates the peer connection, the HTTP offer/answer
//! exchange and the per-track RTP codec sessions; ICE, DTLS, SRTP and RTP
//! packetization are provided by the [`engine::PeerConnectionEngine`] and
//! [`rtp::RtpCodecLayer`] implementations handed in through a
//! [`Backend`].
//!
//! ```no_run
//! # async fn run(backend: whip_rs::Backend) -> whip_rs::Result<()> {
//! use whip_rs::media::{CodecId, Packet, StreamParams};
//! use whip_rs::{ClientConfig, WhipPublisher};
//!
//! let config = ClientConfig::new("https://example.com/whip/live").bearer_token("token");
//! let streams = vec![StreamParams::audio(CodecId::Opus, 48_000, 2)];
//!
//! let mut publisher = WhipPublisher::open(config, &backend, streams).await?;
//! publisher.write_packet(&Packet::new(0, 0, vec![0xFC, 0xFF, 0xFE]))?;
//! publisher.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod engine;
pub mod error;
pub mod media;
pub mod rtp;
pub mod sdp;
pub mod session;
pub mod signaling;
pub mod stats;

#[cfg(test)]
mod testing;

pub use client::{open, write_packet, ClientConfig, ClientSession, Role, WhepPlayer, WhipPublisher};
pub use error::{Error, Result};
pub use session::{Backend, ConnectionState};
pub use stats::SessionStats;
