//! Session state shared by the WHIP and WHEP roles
//!
//! - [`state`]: connection state mirror and the bounded connect wait
//! - [`track`]: index-stable track list and ordered release
//! - [`context`]: peer connection, tracks and signaling composed together

pub mod context;
pub mod state;
pub mod track;

pub use context::{Backend, SessionContext, TRACK_NAME};
pub use state::{ConnectionState, SharedState};
pub use track::{CodecSession, Track, TrackRegistry};
