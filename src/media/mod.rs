//! Media stream description
//!
//! This module provides:
//! - Codec identifiers and stream parameters exchanged with the caller
//! - Elementary-stream packets
//! - H.264 decoder configuration parsing (profile-level-id, parameter sets)
//! - AAC AudioSpecificConfig parsing

pub mod aac;
pub mod h264;

use std::fmt;

use bytes::Bytes;

pub use aac::AudioSpecificConfig;
pub use h264::{AvcConfig, NaluType};

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elementary-stream codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264,
    Hevc,
    Av1,
    Vp8,
    Vp9,
    Opus,
    Aac,
    PcmAlaw,
    PcmMulaw,
    Mp3,
    Mpeg4,
}

impl CodecId {
    /// Kind of stream this codec carries
    pub fn kind(&self) -> MediaKind {
        match self {
            CodecId::H264 | CodecId::Hevc | CodecId::Av1 | CodecId::Vp8 | CodecId::Vp9
            | CodecId::Mpeg4 => MediaKind::Video,
            CodecId::Opus | CodecId::Aac | CodecId::PcmAlaw | CodecId::PcmMulaw | CodecId::Mp3 => {
                MediaKind::Audio
            }
        }
    }

    /// RTP encoding name as it appears in `a=rtpmap`
    pub fn encoding_name(&self) -> &'static str {
        match self {
            CodecId::H264 => "H264",
            CodecId::Hevc => "H265",
            CodecId::Av1 => "AV1",
            CodecId::Vp8 => "VP8",
            CodecId::Vp9 => "VP9",
            CodecId::Opus => "opus",
            CodecId::Aac => "mpeg4-generic",
            CodecId::PcmAlaw => "PCMA",
            CodecId::PcmMulaw => "PCMU",
            CodecId::Mp3 => "MPA",
            CodecId::Mpeg4 => "MP4V-ES",
        }
    }

    /// Look up a codec by RTP encoding name (case-insensitive)
    pub fn from_encoding_name(name: &str) -> Option<Self> {
        const ALL: [CodecId; 11] = [
            CodecId::H264,
            CodecId::Hevc,
            CodecId::Av1,
            CodecId::Vp8,
            CodecId::Vp9,
            CodecId::Opus,
            CodecId::Aac,
            CodecId::PcmAlaw,
            CodecId::PcmMulaw,
            CodecId::Mp3,
            CodecId::Mpeg4,
        ];
        ALL.into_iter()
            .find(|codec| codec.encoding_name().eq_ignore_ascii_case(name))
    }

    /// RTP clock rate for this codec at the given sample rate
    pub fn clock_rate(&self, sample_rate: u32) -> u32 {
        match self.kind() {
            MediaKind::Video => 90_000,
            MediaKind::Audio => match self {
                CodecId::Opus => 48_000,
                CodecId::PcmAlaw | CodecId::PcmMulaw => 8_000,
                CodecId::Mp3 => 90_000,
                _ => sample_rate,
            },
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Rational time base (`num / den` seconds per tick)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Time base of an RTP clock
    pub const fn from_clock_rate(rate: u32) -> Self {
        Self { num: 1, den: rate }
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(1, 90_000)
    }
}

/// Parameters of one elementary stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    /// Stream kind
    pub kind: MediaKind,
    /// Codec
    pub codec: CodecId,
    /// Audio sample rate in Hz (0 for video)
    pub sample_rate: u32,
    /// Audio channel count (0 for video)
    pub channels: u8,
    /// Video width in pixels (0 if unknown)
    pub width: u32,
    /// Video height in pixels (0 if unknown)
    pub height: u32,
    /// Codec global header (avcC, AudioSpecificConfig, ...)
    pub extradata: Bytes,
    /// Timestamp unit of packets on this stream
    pub time_base: TimeBase,
}

impl StreamParams {
    /// Video stream parameters
    pub fn video(codec: CodecId, width: u32, height: u32) -> Self {
        Self {
            kind: MediaKind::Video,
            codec,
            sample_rate: 0,
            channels: 0,
            width,
            height,
            extradata: Bytes::new(),
            time_base: TimeBase::default(),
        }
    }

    /// Audio stream parameters
    pub fn audio(codec: CodecId, sample_rate: u32, channels: u8) -> Self {
        Self {
            kind: MediaKind::Audio,
            codec,
            sample_rate,
            channels,
            width: 0,
            height: 0,
            extradata: Bytes::new(),
            time_base: TimeBase::from_clock_rate(sample_rate.max(1)),
        }
    }

    /// Attach a codec global header
    pub fn with_extradata(mut self, extradata: impl Into<Bytes>) -> Self {
        self.extradata = extradata.into();
        self
    }
}

/// One elementary-stream packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Index of the stream this packet belongs to
    pub stream_index: usize,
    /// Presentation timestamp in the stream's time base
    pub pts: i64,
    /// Decode timestamp in the stream's time base
    pub dts: i64,
    /// Whether the packet starts a keyframe
    pub keyframe: bool,
    /// Payload (zero-copy via reference counting)
    pub data: Bytes,
}

impl Packet {
    pub fn new(stream_index: usize, pts: i64, data: impl Into<Bytes>) -> Self {
        Self {
            stream_index,
            pts,
            dts: pts,
            keyframe: false,
            data: data.into(),
        }
    }

    /// Mark this packet as a keyframe
    pub fn keyframe(mut self) -> Self {
        self.keyframe = true;
        self
    }
}
