//! Peer-connection engine capability
//!
//! The engine owns ICE, DTLS, SRTP and congestion control. The session
//! only needs a narrow slice of it:
//!
//! - create a peer connection and register a state-change callback
//! - add/delete tracks
//! - get/set local and remote descriptions
//! - fetch a track's negotiated media description
//! - non-blocking send/receive of RTP on a track
//!
//! All calls are non-blocking. State-change notifications arrive on the
//! engine's own thread.

pub mod log;

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::{ConfigError, EngineError};
use crate::media::CodecId;
use crate::session::state::ConnectionState;

pub use self::log::{init_logger, EngineLogLevel, LogSink};

/// Callback receiving peer-connection state changes
pub type StateCallback = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// Engine-side codec identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtcCodec {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
    Opus,
    Pcmu,
    Pcma,
    Aac,
}

impl RtcCodec {
    /// Media codec this engine codec carries
    pub fn codec_id(&self) -> CodecId {
        match self {
            RtcCodec::H264 => CodecId::H264,
            RtcCodec::H265 => CodecId::Hevc,
            RtcCodec::Vp8 => CodecId::Vp8,
            RtcCodec::Vp9 => CodecId::Vp9,
            RtcCodec::Av1 => CodecId::Av1,
            RtcCodec::Opus => CodecId::Opus,
            RtcCodec::Pcmu => CodecId::PcmMulaw,
            RtcCodec::Pcma => CodecId::PcmAlaw,
            RtcCodec::Aac => CodecId::Aac,
        }
    }
}

impl TryFrom<CodecId> for RtcCodec {
    type Error = ConfigError;

    fn try_from(codec: CodecId) -> Result<Self, Self::Error> {
        match codec {
            CodecId::H264 => Ok(RtcCodec::H264),
            CodecId::Hevc => Ok(RtcCodec::H265),
            CodecId::Av1 => Ok(RtcCodec::Av1),
            CodecId::Vp8 => Ok(RtcCodec::Vp8),
            CodecId::Vp9 => Ok(RtcCodec::Vp9),
            CodecId::Opus => Ok(RtcCodec::Opus),
            CodecId::Aac => Ok(RtcCodec::Aac),
            CodecId::PcmAlaw => Ok(RtcCodec::Pcma),
            CodecId::PcmMulaw => Ok(RtcCodec::Pcmu),
            other => Err(ConfigError::UnsupportedCodec(other.to_string())),
        }
    }
}

/// Media direction of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SendOnly,
    RecvOnly,
    SendRecv,
    Inactive,
}

impl Direction {
    /// SDP attribute name
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::SendRecv => "sendrecv",
            Direction::Inactive => "inactive",
        }
    }

    pub fn from_attribute(attr: &str) -> Option<Self> {
        match attr {
            "sendonly" => Some(Direction::SendOnly),
            "recvonly" => Some(Direction::RecvOnly),
            "sendrecv" => Some(Direction::SendRecv),
            "inactive" => Some(Direction::Inactive),
            _ => None,
        }
    }
}

/// Role of a session description in the offer/answer exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

/// Opaque engine track handle (never zero)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(NonZeroU32);

impl TrackId {
    /// Wrap a raw engine handle; zero means "no track"
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(TrackId)
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters for adding one track to a peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInit {
    pub direction: Direction,
    pub codec: RtcCodec,
    pub payload_type: u8,
    pub ssrc: u32,
    /// Media line identifier
    pub mid: String,
    /// Human-readable track name
    pub name: String,
    /// Media stream id shared by all tracks of the session
    pub msid: String,
    pub track_id: String,
    /// Format parameters (fmtp) advertised for this track
    pub profile: Option<String>,
}

/// Peer connection configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcConfiguration {
    /// STUN/TURN server URLs
    pub ice_servers: Vec<String>,
}

/// Factory for peer connections
pub trait PeerConnectionEngine: Send + Sync {
    /// Create a new peer connection
    fn create_peer_connection(
        &self,
        config: &RtcConfiguration,
    ) -> Result<Arc<dyn PeerConnection>, EngineError>;

    /// Install the engine's process-wide log sink at the given level
    fn set_logger(&self, level: EngineLogLevel, sink: LogSink);
}

/// One peer connection
pub trait PeerConnection: Send + Sync {
    /// Register the state-change callback; called from the engine's thread
    fn on_state_change(&self, callback: StateCallback) -> Result<(), EngineError>;

    /// Add a track; it will appear in the next local description
    fn add_track(&self, init: &TrackInit) -> Result<TrackId, EngineError>;

    /// Release a track handle
    fn delete_track(&self, track: TrackId);

    /// Generate and apply the local description
    fn set_local_description(&self, kind: SdpType) -> Result<(), EngineError>;

    /// Current local description text
    fn local_description(&self) -> Result<String, EngineError>;

    /// Apply the remote description
    fn set_remote_description(&self, sdp: &str, kind: SdpType) -> Result<(), EngineError>;

    /// Negotiated media description of one track
    fn track_description(&self, track: TrackId) -> Result<String, EngineError>;

    /// Send one message on a track
    fn send(&self, track: TrackId, data: &[u8]) -> Result<(), EngineError>;

    /// Receive one message; `NotAvailable` if none is pending, `TooSmall`
    /// if `buf` cannot hold it (the message stays queued)
    fn receive(&self, track: TrackId, buf: &mut [u8]) -> Result<usize, EngineError>;

    /// Tear down the peer connection
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_conversion() {
        assert_eq!(RtcCodec::try_from(CodecId::H264), Ok(RtcCodec::H264));
        assert_eq!(RtcCodec::try_from(CodecId::Hevc), Ok(RtcCodec::H265));
        assert_eq!(RtcCodec::try_from(CodecId::PcmMulaw), Ok(RtcCodec::Pcmu));
        assert!(matches!(
            RtcCodec::try_from(CodecId::Mp3),
            Err(ConfigError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn test_codec_conversion_roundtrip() {
        for codec in [
            RtcCodec::H264,
            RtcCodec::H265,
            RtcCodec::Vp8,
            RtcCodec::Vp9,
            RtcCodec::Av1,
            RtcCodec::Opus,
            RtcCodec::Pcmu,
            RtcCodec::Pcma,
            RtcCodec::Aac,
        ] {
            assert_eq!(RtcCodec::try_from(codec.codec_id()), Ok(codec));
        }
    }

    #[test]
    fn test_track_id_zero_is_none() {
        assert!(TrackId::new(0).is_none());
        assert_eq!(TrackId::new(7).map(|t| t.get()), Some(7));
    }

    #[test]
    fn test_direction_attribute() {
        assert_eq!(Direction::SendOnly.as_str(), "sendonly");
        assert_eq!(Direction::from_attribute("recvonly"), Some(Direction::RecvOnly));
        assert_eq!(Direction::from_attribute("bogus"), None);
    }
}
