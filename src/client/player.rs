//! WHEP player
//!
//! Receives one video and one audio stream from a WHEP endpoint. The two
//! receive-only tracks are offered with fixed codec defaults; the codec
//! parameters actually negotiated are read back from each track's
//! description once the transport is connected.

use std::sync::Arc;
use std::time::Instant;

use crate::engine::{Direction, RtcCodec, TrackInit};
use crate::error::{Error, Result};
use crate::media::{MediaKind, Packet, StreamParams};
use crate::sdp::{self, MediaDescription};
use crate::session::state::{ConnectionState, POLL_INTERVAL};
use crate::session::{Backend, CodecSession, SessionContext, TRACK_NAME};
use crate::stats::SessionStats;

use super::config::ClientConfig;

/// Stream index of the received video
pub const VIDEO_STREAM: usize = 0;

/// Stream index of the received audio
pub const AUDIO_STREAM: usize = 1;

/// Receive-only track offered for each stream
struct EgressTrack {
    kind: MediaKind,
    codec: RtcCodec,
    payload_type: u8,
    profile: &'static str,
}

const EGRESS_TRACKS: [EgressTrack; 2] = [
    EgressTrack {
        kind: MediaKind::Video,
        codec: RtcCodec::H264,
        payload_type: 96,
        profile: "profile-level-id=42e01f;packetization-mode=1;level-asymmetry-allowed=1",
    },
    EgressTrack {
        kind: MediaKind::Audio,
        codec: RtcCodec::Opus,
        payload_type: 97,
        profile: "minptime=10;maxaveragebitrate=96000;stereo=1;sprop-stereo=1;useinbandfec=1",
    },
];

/// WHEP egress session
///
/// Always exposes exactly two streams: video at [`VIDEO_STREAM`], audio
/// at [`AUDIO_STREAM`].
pub struct WhepPlayer {
    ctx: SessionContext,
    streams: Vec<StreamParams>,
    /// Track polled first by the next read
    next: usize,
}

impl WhepPlayer {
    /// Open a WHEP session
    pub async fn open(config: ClientConfig, backend: &Backend) -> Result<Self> {
        let ctx = SessionContext::init(config, backend, EGRESS_TRACKS.len())?;
        let mut player = Self {
            ctx,
            streams: Vec::with_capacity(EGRESS_TRACKS.len()),
            next: 0,
        };

        if let Err(e) = player.setup().await {
            tracing::error!(error = %e, "WHEP session setup failed");
            player.ctx.close().await;
            return Err(e);
        }

        tracing::info!(
            url = %player.ctx.config().url,
            video = %player.streams[VIDEO_STREAM].codec,
            audio = %player.streams[AUDIO_STREAM].codec,
            "WHEP session established"
        );
        Ok(player)
    }

    async fn setup(&mut self) -> Result<()> {
        let msid = self.ctx.msid().to_owned();
        for (index, track) in EGRESS_TRACKS.iter().enumerate() {
            let init = TrackInit {
                direction: Direction::RecvOnly,
                codec: track.codec,
                payload_type: track.payload_type,
                ssrc: fastrand::u32(..),
                mid: index.to_string(),
                name: TRACK_NAME.to_owned(),
                msid: msid.clone(),
                track_id: format!("{}-{}", msid, track.kind),
                profile: Some(track.profile.to_owned()),
            };
            self.ctx.add_track(index, &init)?;
        }

        self.ctx.create_resource().await?;
        self.ctx.wait_connected().await?;

        for index in 0..EGRESS_TRACKS.len() {
            let params = self.open_reader(index)?;
            self.streams.push(params);
        }
        Ok(())
    }

    /// Open the RTP reader of one track from its negotiated description
    fn open_reader(&mut self, index: usize) -> Result<StreamParams> {
        let description = self.ctx.track_description(index)?;
        sdp::check_size(description.len())?;
        tracing::debug!(track = index, description = %description, "Negotiated track");

        let media = MediaDescription::parse(&description)?;
        let binding = self.ctx.bind_track(index)?;
        let rtp = Arc::clone(self.ctx.rtp());
        let reader = rtp.open_reader(&media, binding)?;
        let params = reader.params().clone();

        let track = self.ctx.tracks_mut().get_mut(index)?;
        track.set_codec(CodecSession::Reader(reader))?;
        track.set_params(params.clone());
        Ok(params)
    }

    /// Parameters of the received streams, video first
    pub fn streams(&self) -> &[StreamParams] {
        &self.streams
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.ctx.state()
    }

    /// Read one packet from stream `index` without waiting.
    ///
    /// `Error::WouldBlock` when nothing is pending.
    pub fn try_read_stream(&mut self, index: usize) -> Result<Packet> {
        self.ctx.ensure_connected()?;

        let track = self.ctx.tracks_mut().get_mut(index)?;
        let stats = Arc::clone(track.stats());
        let reader = track
            .reader_mut()
            .ok_or(Error::Internal("egress track without reader"))?;

        let mut packet = reader.read_packet()?;
        packet.stream_index = index;
        stats.on_frame(packet.keyframe);
        Ok(packet)
    }

    /// Read one packet from whichever stream has data, without waiting.
    ///
    /// Streams are polled round-robin starting after the last stream that
    /// produced a packet, so neither stream starves the other.
    pub fn try_read(&mut self) -> Result<Packet> {
        let count = self.ctx.tracks().len();
        for attempt in 0..count {
            let index = (self.next + attempt) % count;
            match self.try_read_stream(index) {
                Ok(packet) => {
                    self.next = (index + 1) % count;
                    return Ok(packet);
                }
                Err(Error::WouldBlock) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::WouldBlock)
    }

    /// Read the next packet from any stream.
    ///
    /// Waits up to the configured read/write timeout, then returns
    /// `Error::WouldBlock`.
    pub async fn read(&mut self) -> Result<Packet> {
        let deadline = Instant::now() + self.ctx.config().rw_timeout;
        loop {
            match self.try_read() {
                Err(Error::WouldBlock) => {}
                other => return other,
            }

            if self.ctx.config().cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(Error::WouldBlock);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.ctx.stats()
    }

    /// Delete the remote resource and release the session. Idempotent.
    pub async fn close(&mut self) {
        if !self.ctx.is_closed() {
            tracing::info!(url = %self.ctx.config().url, "Closing WHEP session");
        }
        self.ctx.close().await;
    }
}
