//! Session context
//!
//! The engine-facing half of a WHIP or WHEP session, shared by both
//! roles: peer connection, mirrored connection state, track registry and
//! signaling exchange. Role-specific setup lives in the client module.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::config::ClientConfig;
use crate::engine::{
    init_logger, PeerConnection, PeerConnectionEngine, RtcConfiguration, TrackId, TrackInit,
};
use crate::error::{Error, Result};
use crate::rtp::{RtpCodecLayer, TrackTransport};
use crate::signaling::{HttpTransport, HyperTransport, SignalingExchange};
use crate::stats::SessionStats;

use super::state::{ConnectionState, SharedState};
use super::track::TrackRegistry;

/// Track name announced to the remote peer
pub const TRACK_NAME: &str = concat!("whip-rs/", env!("CARGO_PKG_VERSION"));

/// External capabilities a session is built on
#[derive(Clone)]
pub struct Backend {
    pub engine: Arc<dyn PeerConnectionEngine>,
    pub http: Arc<dyn HttpTransport>,
    pub rtp: Arc<dyn RtpCodecLayer>,
}

impl Backend {
    /// Backend using the built-in HTTP(S) signaling client
    pub fn new(engine: Arc<dyn PeerConnectionEngine>, rtp: Arc<dyn RtpCodecLayer>) -> Self {
        Self {
            engine,
            http: Arc::new(HyperTransport::new()),
            rtp,
        }
    }

    /// Replace the signaling HTTP client
    pub fn with_http(mut self, http: Arc<dyn HttpTransport>) -> Self {
        self.http = http;
        self
    }
}

/// Shared per-session state
pub struct SessionContext {
    /// `None` once torn down
    peer: Option<Arc<dyn PeerConnection>>,
    state: SharedState,
    tracks: TrackRegistry,
    signaling: SignalingExchange,
    config: ClientConfig,
    rtp: Arc<dyn RtpCodecLayer>,
    /// Media stream id shared by every track of the session
    msid: String,
    started_at: Instant,
    time_to_connect: Option<Duration>,
}

impl SessionContext {
    /// Create the peer connection and register its state callback.
    ///
    /// Reserves `track_count` tracks; none is added to the peer yet.
    pub fn init(config: ClientConfig, backend: &Backend, track_count: usize) -> Result<Self> {
        let url = config.validate()?;
        init_logger(backend.engine.as_ref());

        let rtc_config = RtcConfiguration {
            ice_servers: config.ice_servers.clone(),
        };
        let peer = backend
            .engine
            .create_peer_connection(&rtc_config)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create peer connection");
                e
            })?;

        let state = SharedState::new();
        if let Err(e) = peer.on_state_change(Box::new(state.callback())) {
            tracing::error!(error = %e, "Failed to register state callback");
            peer.close();
            return Err(e.into());
        }

        let msid = uuid::Uuid::new_v4().to_string();
        tracing::info!(url = %url, msid = %msid, tracks = track_count, "Session initialized");

        let signaling = SignalingExchange::new(
            Arc::clone(&backend.http),
            url,
            config.bearer_token.clone(),
            config.cancellation.clone(),
        );

        Ok(Self {
            peer: Some(peer),
            state,
            tracks: TrackRegistry::allocate(track_count),
            signaling,
            config,
            rtp: Arc::clone(&backend.rtp),
            msid,
            started_at: Instant::now(),
            time_to_connect: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn msid(&self) -> &str {
        &self.msid
    }

    pub fn rtp(&self) -> &Arc<dyn RtpCodecLayer> {
        &self.rtp
    }

    pub fn tracks(&self) -> &TrackRegistry {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut TrackRegistry {
        &mut self.tracks
    }

    /// Current mirrored connection state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_closed(&self) -> bool {
        self.peer.is_none()
    }

    fn peer(&self) -> Result<&Arc<dyn PeerConnection>> {
        self.peer
            .as_ref()
            .ok_or(Error::NotConnected(ConnectionState::Closed))
    }

    /// Reject steady-state I/O outside the connected state
    pub fn ensure_connected(&self) -> Result<()> {
        if self.peer.is_none() {
            return Err(Error::NotConnected(ConnectionState::Closed));
        }
        match self.state.get() {
            ConnectionState::Connected => Ok(()),
            state => Err(Error::NotConnected(state)),
        }
    }

    /// Open the transport binding of the track at `index`
    pub fn bind_track(&mut self, index: usize) -> Result<Arc<TrackTransport>> {
        let peer = Arc::clone(self.peer()?);
        let track = self.tracks.get_mut(index)?;
        let binding = Arc::new(TrackTransport::new(
            peer,
            index,
            self.config.rw_timeout,
            self.config.cancellation.clone(),
            Arc::clone(track.stats()),
        ));
        track.set_binding(Arc::clone(&binding))?;
        Ok(binding)
    }

    /// Add the track at `index` to the peer connection
    pub fn add_track(&mut self, index: usize, init: &TrackInit) -> Result<TrackId> {
        let peer = Arc::clone(self.peer()?);
        self.tracks.add_to_peer(index, peer.as_ref(), init)
    }

    /// Negotiated media description of the track at `index`
    pub fn track_description(&self, index: usize) -> Result<String> {
        let handle = self
            .tracks
            .get(index)?
            .handle()
            .ok_or(Error::Internal("track has no engine handle"))?;
        Ok(self.peer()?.track_description(handle)?)
    }

    /// Offer/answer exchange with the remote endpoint
    pub async fn create_resource(&mut self) -> Result<()> {
        let peer = Arc::clone(self.peer()?);
        self.signaling.create_resource(peer.as_ref()).await
    }

    /// Wait for the peer connection to reach `Connected`
    pub async fn wait_connected(&mut self) -> Result<()> {
        let waited = Instant::now();
        self.state
            .wait_connected(self.config.connection_timeout, &self.config.cancellation)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    state = %self.state.get(),
                    elapsed = ?waited.elapsed(),
                    "Peer connection did not open"
                );
                e
            })?;

        let elapsed = self.started_at.elapsed();
        self.time_to_connect = Some(elapsed);
        tracing::info!(elapsed = ?elapsed, "Peer connection open");
        Ok(())
    }

    /// Close the session: delete the remote resource, then release every
    /// engine resource. Never fails; safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Err(e) = self.signaling.delete_resource().await {
            tracing::warn!(error = %e, "Failed to delete remote resource");
        }
        self.deinit();
    }

    /// Release tracks in order, then the peer connection. Idempotent.
    pub fn deinit(&mut self) {
        let Some(peer) = self.peer.take() else {
            return;
        };

        if let Some(location) = self.signaling.resource_location() {
            tracing::warn!(
                location = %location,
                "Releasing session without deleting its remote resource"
            );
        }

        self.tracks.release(Some(peer.as_ref()));
        peer.close();
        tracing::debug!("Session resources released");
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::collect(self.started_at, self.time_to_connect, self.tracks.stats())
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.deinit();
    }
}
