//! Error types
//!
//! A single crate-wide [`Error`] with one nested kind per layer, so each
//! layer can return its own error and `?` lifts it into the session.

use std::time::Duration;

use thiserror::Error;

use crate::session::state::ConnectionState;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported stream or option
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The peer-connection engine refused a request
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// HTTP offer/answer or delete exchange failed
    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// The peer connection never reached the connected state
    #[error("transport establishment failed: {0}")]
    Establishment(#[from] EstablishmentError),

    /// Operation attempted outside the connected state
    #[error("connection is not open (state: {0})")]
    NotConnected(ConnectionState),

    /// No data available right now; try again
    #[error("resource temporarily unavailable")]
    WouldBlock,

    /// Caller buffer is smaller than the next pending message
    #[error("buffer too small for next message")]
    BufferTooSmall,

    /// Caller-supplied cancellation was observed
    #[error("operation cancelled")]
    Cancelled,

    /// Stream index outside the session's track list
    #[error("invalid stream index: {0}")]
    InvalidStream(usize),

    /// Transport reported end of stream
    #[error("end of stream")]
    Eof,

    /// Error reported by the RTP codec layer
    #[error("rtp error: {0}")]
    Rtp(String),

    /// Malformed codec data
    #[error("media error: {0}")]
    Media(#[from] MediaError),

    /// Broken internal invariant
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl Error {
    /// Whether the caller is expected to simply retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WouldBlock | Error::NotConnected(_))
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("unsupported sample rate {0} Hz, only 48 kHz is supported")]
    UnsupportedSampleRate(u32),

    #[error("unsupported channel layout ({0} channels), only stereo is supported")]
    UnsupportedChannelLayout(u8),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("no streams to publish")]
    NoStreams,

    #[error("stream {index} is declared as {declared} but has codec {codec}")]
    MediaKindMismatch {
        index: usize,
        declared: &'static str,
        codec: String,
    },
}

/// Peer-connection engine result codes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Nothing available yet (non-blocking receive)
    #[error("not available")]
    NotAvailable,

    /// Destination buffer too small
    #[error("buffer too small")]
    TooSmall,

    /// Invalid argument or handle
    #[error("invalid argument")]
    Invalid,

    /// Any other failure
    #[error("{0}")]
    Failure(String),
}

/// Signaling exchange errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("too many redirects ({0})")]
    TooManyRedirects(usize),

    #[error("session description exceeds {limit} bytes")]
    DescriptionTooLarge { limit: usize },

    #[error("empty answer")]
    EmptyAnswer,

    #[error("answer is not valid UTF-8")]
    InvalidEncoding,

    #[error("malformed session description: {0}")]
    Malformed(String),

    #[error("invalid resource location: {0}")]
    InvalidLocation(String),
}

/// Connection establishment errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstablishmentError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("peer connection failed")]
    Failed,

    #[error("peer connection closed")]
    Closed,
}

/// Codec data errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("invalid AVC decoder configuration")]
    InvalidAvcConfig,

    #[error("invalid AAC audio specific config")]
    InvalidAacConfig,

    #[error("malformed length-prefixed access unit")]
    InvalidAccessUnit,
}
