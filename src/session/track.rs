//! Track registry
//!
//! A session owns a fixed-length list of tracks. The index of a track is
//! the caller's stream index and never changes. Each track owns up to
//! three engine-side resources, released in this order:
//!
//! 1. codec session (RTP writer or reader)
//! 2. transport binding
//! 3. engine track handle

use std::sync::Arc;

use crate::engine::{PeerConnection, TrackId, TrackInit};
use crate::error::{Error, Result};
use crate::media::StreamParams;
use crate::rtp::{RtpReader, RtpWriter, TrackTransport};
use crate::stats::{TrackStats, TrackStatsSnapshot};

/// Opened RTP codec context of a track
pub enum CodecSession {
    Writer(Box<dyn RtpWriter>),
    Reader(Box<dyn RtpReader>),
}

impl std::fmt::Debug for CodecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecSession::Writer(_) => f.write_str("Writer"),
            CodecSession::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// One negotiated media line
pub struct Track {
    index: usize,
    /// Set iff the track was added to the peer connection
    handle: Option<TrackId>,
    binding: Option<Arc<TrackTransport>>,
    codec: Option<CodecSession>,
    /// Parameters of the stream carried by this track
    params: Option<StreamParams>,
    stats: Arc<TrackStats>,
}

impl Track {
    fn new(index: usize) -> Self {
        Self {
            index,
            handle: None,
            binding: None,
            codec: None,
            params: None,
            stats: Arc::new(TrackStats::default()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn handle(&self) -> Option<TrackId> {
        self.handle
    }

    pub fn params(&self) -> Option<&StreamParams> {
        self.params.as_ref()
    }

    pub fn set_params(&mut self, params: StreamParams) {
        self.params = Some(params);
    }

    pub fn stats(&self) -> &Arc<TrackStats> {
        &self.stats
    }

    pub fn binding(&self) -> Option<&Arc<TrackTransport>> {
        self.binding.as_ref()
    }

    /// Install the transport binding; attaches it to the track handle if
    /// the track already exists
    pub fn set_binding(&mut self, binding: Arc<TrackTransport>) -> Result<()> {
        if self.binding.is_some() {
            return Err(Error::Internal("transport binding opened twice"));
        }
        if let Some(handle) = self.handle {
            binding.attach(handle)?;
        }
        self.binding = Some(binding);
        Ok(())
    }

    pub fn set_codec(&mut self, codec: CodecSession) -> Result<()> {
        if self.codec.is_some() {
            return Err(Error::Internal("codec session opened twice"));
        }
        self.codec = Some(codec);
        Ok(())
    }

    /// RTP writer of an ingest track
    pub fn writer_mut(&mut self) -> Option<&mut (dyn RtpWriter + 'static)> {
        match self.codec {
            Some(CodecSession::Writer(ref mut writer)) => Some(writer.as_mut()),
            _ => None,
        }
    }

    /// RTP reader of an egress track
    pub fn reader_mut(&mut self) -> Option<&mut (dyn RtpReader + 'static)> {
        match self.codec {
            Some(CodecSession::Reader(ref mut reader)) => Some(reader.as_mut()),
            _ => None,
        }
    }

    /// Whether any engine-side resource is still held
    pub fn is_allocated(&self) -> bool {
        self.handle.is_some() || self.binding.is_some() || self.codec.is_some()
    }

    fn release(&mut self, peer: Option<&dyn PeerConnection>) {
        if self.codec.take().is_some() {
            tracing::trace!(track = self.index, "Codec session closed");
        }
        if self.binding.take().is_some() {
            tracing::trace!(track = self.index, "Transport binding released");
        }
        if let Some(handle) = self.handle.take() {
            match peer {
                Some(peer) => peer.delete_track(handle),
                None => tracing::warn!(
                    track = self.index,
                    handle = %handle,
                    "Track handle outlived its peer connection"
                ),
            }
        }
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("index", &self.index)
            .field("handle", &self.handle)
            .field("bound", &self.binding.is_some())
            .field("codec", &self.codec)
            .finish()
    }
}

/// Fixed-length, index-stable list of tracks
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: Vec<Track>,
}

impl TrackRegistry {
    /// Reserve `n` empty tracks
    pub fn allocate(n: usize) -> Self {
        Self {
            tracks: (0..n).map(Track::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Track> {
        self.tracks.get(index).ok_or(Error::InvalidStream(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Track> {
        self.tracks.get_mut(index).ok_or(Error::InvalidStream(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Add the track at `index` to the peer connection.
    ///
    /// Adding the same track twice is a programming error.
    pub fn add_to_peer(
        &mut self,
        index: usize,
        peer: &dyn PeerConnection,
        init: &TrackInit,
    ) -> Result<TrackId> {
        let track = self.get_mut(index)?;
        if track.handle.is_some() {
            return Err(Error::Internal("track added to peer connection twice"));
        }

        let handle = peer.add_track(init)?;
        track.handle = Some(handle);
        if let Some(ref binding) = track.binding {
            binding.attach(handle)?;
        }

        tracing::debug!(
            track = index,
            handle = %handle,
            direction = init.direction.as_str(),
            codec = ?init.codec,
            payload_type = init.payload_type,
            ssrc = init.ssrc,
            "Track added"
        );
        Ok(handle)
    }

    /// Number of tracks still holding engine-side resources
    pub fn allocated(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_allocated()).count()
    }

    /// Release every track's resources. Safe on a partially built
    /// registry and safe to call repeatedly.
    pub fn release(&mut self, peer: Option<&dyn PeerConnection>) {
        for track in &mut self.tracks {
            track.release(peer);
        }
    }

    pub fn stats(&self) -> Vec<TrackStatsSnapshot> {
        self.tracks.iter().map(|t| t.stats.snapshot()).collect()
    }
}
