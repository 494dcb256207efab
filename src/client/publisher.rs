//! WHIP publisher
//!
//! Publishes caller-encoded audio/video streams to a WHIP endpoint.
//!
//! Setup order per stream: time base, transport binding, RTP writer,
//! format parameters, send-only track. Once every track is on the peer
//! connection the offer is posted and the session waits for the
//! transport to connect. Any setup failure tears everything down.

use std::sync::Arc;

use bytes::Bytes;

use crate::engine::{Direction, RtcCodec, TrackInit};
use crate::error::{ConfigError, Error, Result};
use crate::media::h264::{avcc_to_annexb, insert_parameter_sets, AvcConfig};
use crate::media::{CodecId, MediaKind, Packet, StreamParams, TimeBase};
use crate::sdp;
use crate::session::state::ConnectionState;
use crate::session::{Backend, CodecSession, SessionContext, TRACK_NAME};
use crate::stats::SessionStats;

use super::config::ClientConfig;

/// The only audio sample rate WebRTC audio tracks are published at
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// The only audio channel layout accepted for publishing
pub const AUDIO_CHANNELS: u8 = 2;

/// Appended to H.264 format parameters so receivers may decode a higher
/// level than the one offered
const H264_LEVEL_ASYMMETRY: &str = "level-asymmetry-allowed=1";

/// WHIP ingest session
///
/// # Example
/// ```no_run
/// use whip_rs::client::{ClientConfig, WhipPublisher};
/// use whip_rs::media::{CodecId, Packet, StreamParams};
/// use whip_rs::session::Backend;
///
/// # async fn example(backend: Backend) -> whip_rs::error::Result<()> {
/// let config = ClientConfig::new("https://example.com/whip/live").bearer_token("secret");
/// let streams = vec![
///     StreamParams::video(CodecId::H264, 1280, 720),
///     StreamParams::audio(CodecId::Opus, 48_000, 2),
/// ];
///
/// let mut publisher = WhipPublisher::open(config, &backend, streams).await?;
/// publisher.write_packet(&Packet::new(1, 0, vec![0xFC, 0xFF, 0xFE]))?;
/// publisher.close().await;
/// # Ok(())
/// # }
/// ```
pub struct WhipPublisher {
    ctx: SessionContext,
    streams: Vec<StreamParams>,
    /// Per stream, set for H.264 streams with extradata
    h264: Vec<Option<H264Framing>>,
}

/// How an H.264 stream's access units are rewritten before packetization
struct H264Framing {
    /// Annex B SPS/PPS prepended to keyframes
    parameter_sets: Bytes,
    /// NALU length prefix size when access units are AVCC
    nalu_length_size: Option<u8>,
}

impl H264Framing {
    fn new(config: &AvcConfig) -> Self {
        Self {
            parameter_sets: config.annexb_parameter_sets(),
            nalu_length_size: config.nalu_length_size,
        }
    }

    /// Annex B access unit, with parameter sets on keyframes
    fn to_annexb(&self, packet: &Packet) -> Result<Bytes> {
        let access_unit = match self.nalu_length_size {
            Some(size) => avcc_to_annexb(&packet.data, size)?,
            None => packet.data.clone(),
        };
        if packet.keyframe {
            Ok(insert_parameter_sets(&access_unit, &self.parameter_sets))
        } else {
            Ok(access_unit)
        }
    }
}

impl WhipPublisher {
    /// Whether streams of this codec can be published
    pub fn supports_codec(codec: CodecId) -> bool {
        matches!(
            codec,
            CodecId::Opus
                | CodecId::Aac
                | CodecId::PcmMulaw
                | CodecId::PcmAlaw
                | CodecId::H264
                | CodecId::Hevc
                | CodecId::Av1
                | CodecId::Vp9
        )
    }

    /// Open a WHIP session publishing `streams`.
    ///
    /// Stream `i` is carried by track `i` for the lifetime of the session.
    pub async fn open(
        config: ClientConfig,
        backend: &Backend,
        streams: Vec<StreamParams>,
    ) -> Result<Self> {
        validate_streams(&streams)?;

        let ctx = SessionContext::init(config, backend, streams.len())?;
        let mut publisher = Self {
            ctx,
            h264: streams.iter().map(|_| None).collect(),
            streams,
        };

        if let Err(e) = publisher.setup().await {
            tracing::error!(error = %e, "WHIP session setup failed");
            publisher.ctx.close().await;
            return Err(e);
        }

        tracing::info!(
            url = %publisher.ctx.config().url,
            streams = publisher.streams.len(),
            "WHIP session established"
        );
        Ok(publisher)
    }

    async fn setup(&mut self) -> Result<()> {
        for index in 0..self.streams.len() {
            self.add_stream(index)?;
        }

        self.ctx.create_resource().await?;
        self.ctx.wait_connected().await
    }

    fn add_stream(&mut self, index: usize) -> Result<()> {
        let params = &mut self.streams[index];
        params.time_base = match params.kind {
            MediaKind::Video => TimeBase::from_clock_rate(90_000),
            MediaKind::Audio => TimeBase::from_clock_rate(params.sample_rate),
        };
        let params = params.clone();

        let binding = self.ctx.bind_track(index)?;
        let rtp = Arc::clone(self.ctx.rtp());
        let writer = rtp.open_writer(&params, index, binding)?;
        let payload_type = writer.payload_type();
        let ssrc = writer.ssrc();
        self.ctx
            .tracks_mut()
            .get_mut(index)?
            .set_codec(CodecSession::Writer(writer))?;

        let profile = format_parameters(&params, payload_type)?;
        if params.codec == CodecId::H264 && !params.extradata.is_empty() {
            let config = AvcConfig::from_extradata(&params.extradata)?;
            self.h264[index] = Some(H264Framing::new(&config));
        }

        let msid = self.ctx.msid().to_owned();
        let init = TrackInit {
            direction: Direction::SendOnly,
            codec: RtcCodec::try_from(params.codec)?,
            payload_type,
            ssrc,
            mid: index.to_string(),
            name: TRACK_NAME.to_owned(),
            track_id: format!("{}-{}-{}", msid, params.kind, index),
            msid,
            profile,
        };
        self.ctx.add_track(index, &init)?;
        self.ctx.tracks_mut().get_mut(index)?.set_params(params);
        Ok(())
    }

    /// Streams being published, with their time bases set
    pub fn streams(&self) -> &[StreamParams] {
        &self.streams
    }

    /// Time base packets of stream `index` must be stamped in
    pub fn time_base(&self, index: usize) -> Result<TimeBase> {
        self.streams
            .get(index)
            .map(|s| s.time_base)
            .ok_or(Error::InvalidStream(index))
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.ctx.state()
    }

    /// Send one packet on stream `packet.stream_index`.
    ///
    /// Fails with `Error::NotConnected` unless the connection is open;
    /// nothing is queued. H.264 access units must be framed the way the
    /// stream's extradata is: length-prefixed for avcC, Annex B otherwise.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.ctx.ensure_connected()?;

        let index = packet.stream_index;
        let framing = self.h264.get(index).ok_or(Error::InvalidStream(index))?;

        let track = self.ctx.tracks_mut().get_mut(index)?;
        let stats = Arc::clone(track.stats());
        let writer = track
            .writer_mut()
            .ok_or(Error::Internal("ingest track without writer"))?;

        match framing {
            Some(framing) => writer.write_packet(&Packet {
                data: framing.to_annexb(packet)?,
                ..packet.clone()
            })?,
            None => writer.write_packet(packet)?,
        }

        stats.on_frame(packet.keyframe);
        Ok(())
    }

    pub fn stats(&self) -> SessionStats {
        self.ctx.stats()
    }

    /// Delete the remote resource and release the session. Idempotent.
    pub async fn close(&mut self) {
        if !self.ctx.is_closed() {
            tracing::info!(url = %self.ctx.config().url, "Closing WHIP session");
        }
        self.ctx.close().await;
    }
}

/// Check every stream can be published before touching the engine
fn validate_streams(streams: &[StreamParams]) -> std::result::Result<(), ConfigError> {
    if streams.is_empty() {
        return Err(ConfigError::NoStreams);
    }

    for (index, params) in streams.iter().enumerate() {
        if params.codec.kind() != params.kind {
            return Err(ConfigError::MediaKindMismatch {
                index,
                declared: params.kind.as_str(),
                codec: params.codec.to_string(),
            });
        }
        if !WhipPublisher::supports_codec(params.codec) {
            tracing::error!(stream = index, codec = %params.codec, "Unsupported codec");
            return Err(ConfigError::UnsupportedCodec(params.codec.to_string()));
        }
        if params.kind == MediaKind::Audio {
            if params.sample_rate != AUDIO_SAMPLE_RATE {
                return Err(ConfigError::UnsupportedSampleRate(params.sample_rate));
            }
            if params.channels != AUDIO_CHANNELS {
                return Err(ConfigError::UnsupportedChannelLayout(params.channels));
            }
        }
    }
    Ok(())
}

/// fmtp the engine should advertise for a stream, taken from a locally
/// rendered media section
fn format_parameters(params: &StreamParams, payload_type: u8) -> Result<Option<String>> {
    let section = sdp::write_media(params, payload_type)?;
    let fmtp = sdp::extract_fmtp(&section);

    if params.codec != CodecId::H264 {
        return Ok(fmtp);
    }
    Ok(Some(match fmtp {
        Some(fmtp) => format!("{};{}", fmtp, H264_LEVEL_ASYMMETRY),
        None => H264_LEVEL_ASYMMETRY.to_owned(),
    }))
}
