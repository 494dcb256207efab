//! Statistics for WHIP/WHEP sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live per-track counters
///
/// Updated by the transport binding and the session's write/read paths,
/// possibly from different threads.
#[derive(Debug, Default)]
pub struct TrackStats {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    frames: AtomicU64,
    keyframes: AtomicU64,
    would_block: AtomicU64,
}

impl TrackStats {
    /// Record one RTP message handed to the engine
    pub fn on_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record one RTP message taken from the engine
    pub fn on_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record one elementary-stream packet crossing the session API
    pub fn on_frame(&self, keyframe: bool) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        if keyframe {
            self.keyframes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn on_would_block(&self) {
        self.would_block.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> TrackStatsSnapshot {
        TrackStatsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            keyframes: self.keyframes.load(Ordering::Relaxed),
            would_block: self.would_block.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TrackStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackStatsSnapshot {
    /// RTP packets sent
    pub packets_sent: u64,
    /// RTP bytes sent
    pub bytes_sent: u64,
    /// RTP packets received
    pub packets_received: u64,
    /// RTP bytes received
    pub bytes_received: u64,
    /// Elementary-stream packets written or read
    pub frames: u64,
    /// Keyframes written or read
    pub keyframes: u64,
    /// Receive attempts that found nothing pending
    pub would_block: u64,
}

/// Session-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Time since the session was opened
    pub duration: Duration,
    /// Time from open until the peer connection reported `Connected`
    pub time_to_connect: Option<Duration>,
    /// Per-track counters, in track order
    pub tracks: Vec<TrackStatsSnapshot>,
}

impl SessionStats {
    /// Build from per-track snapshots and the session's start time
    pub fn collect(
        started_at: Instant,
        time_to_connect: Option<Duration>,
        tracks: Vec<TrackStatsSnapshot>,
    ) -> Self {
        Self {
            duration: started_at.elapsed(),
            time_to_connect,
            tracks,
        }
    }

    /// Total RTP bytes sent across all tracks
    pub fn bytes_sent(&self) -> u64 {
        self.tracks.iter().map(|t| t.bytes_sent).sum()
    }

    /// Total RTP bytes received across all tracks
    pub fn bytes_received(&self) -> u64 {
        self.tracks.iter().map(|t| t.bytes_received).sum()
    }

    /// Average bitrate (bits/sec) over the session, both directions
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            ((self.bytes_sent() + self.bytes_received()) * 8) / secs
        } else {
            0
        }
    }
}
