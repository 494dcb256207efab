//! Connection state machine
//!
//! Mirrors the peer connection's lifecycle as reported by the engine.
//! The engine pushes new states from its own thread; the session only ever
//! reads the mirrored value, never the engine's internal state.
//!
//! ```text
//! New ──► Connecting ──► Connected
//!  │          │   ▲          │
//!  │          ▼   │          ▼
//!  │      Disconnected ◄─────┘
//!  │
//!  └──────────► Failed / Closed   (reachable from any state)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, EstablishmentError, Result};

/// Interval between polls of the mirrored state while waiting to connect
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Peer connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Created, negotiation not started
    New = 0,
    /// ICE/DTLS in progress
    Connecting = 1,
    /// Media can flow
    Connected = 2,
    /// Transport lost, engine may still recover
    Disconnected = 3,
    /// Terminal failure
    Failed = 4,
    /// Closed locally or remotely
    Closed = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::New,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnected,
            4 => ConnectionState::Failed,
            _ => ConnectionState::Closed,
        }
    }

    /// State name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::New => "New",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Failed => "Failed",
            ConnectionState::Closed => "Closed",
        }
    }

    /// Check if no further transition can lead to `Connected`
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mirrored connection state shared with the engine's callback
///
/// A single atomic byte, so readers never observe a torn value.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<AtomicU8>,
}

impl SharedState {
    /// Create a mirror starting in `New`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(ConnectionState::New as u8)),
        }
    }

    /// Current mirrored state
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Store a new state, returning the previous one
    pub fn set(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.inner.swap(state as u8, Ordering::AcqRel))
    }

    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }

    /// Build the notification callback handed to the engine.
    ///
    /// The callback only records the new state and returns.
    pub fn callback(&self) -> impl Fn(ConnectionState) + Send + Sync + 'static {
        let state = self.clone();
        move |next| {
            let prev = state.set(next);
            tracing::debug!(from = %prev, to = %next, "Connection state changed");
        }
    }

    /// Wait until the mirrored state becomes `Connected`.
    ///
    /// Fails immediately on `Failed` or `Closed`, on cancellation, or once
    /// `timeout` has elapsed since the wait began. There is no retry.
    pub async fn wait_connected(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.get() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Failed => return Err(EstablishmentError::Failed.into()),
                ConnectionState::Closed => return Err(EstablishmentError::Closed.into()),
                _ => {}
            }

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if Instant::now() > deadline {
                return Err(EstablishmentError::TimedOut(timeout).into());
            }

            tracing::trace!(state = %self.get(), "Waiting for peer connection to open");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
