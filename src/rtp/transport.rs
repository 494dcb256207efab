//! Per-track transport binding
//!
//! Adapts one engine track to the message transport the RTP codec layer
//! reads from and writes to. A binding may be created before its track
//! exists (ingest writers are opened first so the track can advertise
//! their payload type and SSRC) and is attached to the track once the
//! engine hands out a handle. Result mapping:
//!
//! | engine result  | recv                    | send             |
//! |----------------|-------------------------|------------------|
//! | success        | bytes read              | bytes written    |
//! | not available  | `Error::WouldBlock`     | `Error::Engine`  |
//! | too small      | `Error::BufferTooSmall` | `Error::Engine`  |
//! | other          | `Error::Eof`            | `Error::Engine`  |
//!
//! I/O on a binding that is not attached yet fails with
//! `EngineError::Invalid`.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::{PeerConnection, TrackId};
use crate::error::{EngineError, Error, Result};
use crate::stats::TrackStats;

use super::{PacketTransport, RTP_MAX_PACKET_SIZE};

/// Byte-stream endpoint for one track
pub struct TrackTransport {
    peer: Arc<dyn PeerConnection>,
    track: OnceLock<TrackId>,
    index: usize,
    rw_timeout: Duration,
    cancel: CancellationToken,
    stats: Arc<TrackStats>,
}

impl TrackTransport {
    /// Create an unattached binding for the track at `index`
    pub fn new(
        peer: Arc<dyn PeerConnection>,
        index: usize,
        rw_timeout: Duration,
        cancel: CancellationToken,
        stats: Arc<TrackStats>,
    ) -> Self {
        Self {
            peer,
            track: OnceLock::new(),
            index,
            rw_timeout,
            cancel,
            stats,
        }
    }

    /// Attach the engine track this binding talks to
    pub fn attach(&self, track: TrackId) -> Result<()> {
        self.track
            .set(track)
            .map_err(|_| Error::Internal("transport binding attached twice"))
    }

    /// Engine track this binding talks to, once attached
    pub fn track(&self) -> Option<TrackId> {
        self.track.get().copied()
    }

    fn attached(&self) -> Result<TrackId> {
        self.track().ok_or(Error::Engine(EngineError::Invalid))
    }
}

impl PacketTransport for TrackTransport {
    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match self.peer.receive(self.attached()?, buf) {
            Ok(n) => {
                self.stats.on_received(n);
                Ok(n)
            }
            Err(EngineError::NotAvailable) => {
                self.stats.on_would_block();
                Err(Error::WouldBlock)
            }
            Err(EngineError::TooSmall) => Err(Error::BufferTooSmall),
            Err(e) => {
                tracing::error!(track = self.index, error = %e, "Receive failed");
                Err(Error::Eof)
            }
        }
    }

    fn send(&self, buf: &[u8]) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match self.peer.send(self.attached()?, buf) {
            Ok(()) => {
                self.stats.on_sent(buf.len());
                Ok(buf.len())
            }
            Err(e) => {
                tracing::error!(track = self.index, error = %e, "Send failed");
                Err(Error::Engine(e))
            }
        }
    }

    fn max_packet_size(&self) -> usize {
        RTP_MAX_PACKET_SIZE
    }

    fn rw_timeout(&self) -> Duration {
        self.rw_timeout
    }
}
