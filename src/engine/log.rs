//! Engine log bridge
//!
//! Routes the engine's own log output into `tracing`. The engine logger is
//! process-wide, so installation happens once regardless of how many
//! sessions are opened.

use std::sync::Once;

use tracing::level_filters::LevelFilter;

use super::PeerConnectionEngine;

/// Sink invoked by the engine for each log line
pub type LogSink = fn(EngineLogLevel, &str);

/// Engine log levels, most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EngineLogLevel {
    None,
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
    Verbose,
}

impl EngineLogLevel {
    /// Engine level matching the host's current max `tracing` level
    pub fn from_filter(filter: LevelFilter) -> Self {
        if filter == LevelFilter::OFF {
            EngineLogLevel::None
        } else if filter == LevelFilter::ERROR {
            EngineLogLevel::Error
        } else if filter == LevelFilter::WARN {
            EngineLogLevel::Warning
        } else if filter == LevelFilter::INFO {
            EngineLogLevel::Info
        } else if filter == LevelFilter::DEBUG {
            EngineLogLevel::Debug
        } else {
            EngineLogLevel::Verbose
        }
    }
}

static INIT: Once = Once::new();

/// Install the engine log bridge. Later calls are no-ops.
pub fn init_logger(engine: &dyn PeerConnectionEngine) {
    INIT.call_once(|| {
        let level = EngineLogLevel::from_filter(LevelFilter::current());
        engine.set_logger(level, engine_log);
        tracing::debug!(level = ?level, "Engine logger installed");
    });
}

/// Forward one engine log line to `tracing`
pub fn engine_log(level: EngineLogLevel, message: &str) {
    match level {
        EngineLogLevel::None => {}
        EngineLogLevel::Fatal | EngineLogLevel::Error => {
            tracing::error!(target: "whip_rs::engine", "{}", message)
        }
        EngineLogLevel::Warning => tracing::warn!(target: "whip_rs::engine", "{}", message),
        EngineLogLevel::Info => tracing::info!(target: "whip_rs::engine", "{}", message),
        EngineLogLevel::Debug | EngineLogLevel::Verbose => {
            tracing::debug!(target: "whip_rs::engine", "{}", message)
        }
    }
}
