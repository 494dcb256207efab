//! Client configuration

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::ConfigError;

/// Default time allowed for the peer connection to reach `Connected`
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout of a single packet read/write
pub const DEFAULT_RW_TIMEOUT: Duration = Duration::from_secs(1);

/// WHIP/WHEP client options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WHIP or WHEP endpoint URL
    pub url: String,

    /// Token sent as `Authorization: Bearer <token>` on every request
    pub bearer_token: Option<String>,

    /// Time allowed for the transport to connect after the answer is applied
    pub connection_timeout: Duration,

    /// Timeout of a single packet read/write
    pub rw_timeout: Duration,

    /// STUN/TURN server URLs handed to the engine
    pub ice_servers: Vec<String>,

    /// Observed by every blocking wait and by the transport bindings
    pub cancellation: CancellationToken,
}

impl ClientConfig {
    /// Create a config for the given endpoint with default options
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            rw_timeout: DEFAULT_RW_TIMEOUT,
            ice_servers: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Set the bearer token
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set read/write timeout
    pub fn rw_timeout(mut self, timeout: Duration) -> Self {
        self.rw_timeout = timeout;
        self
    }

    /// Add a STUN/TURN server
    pub fn ice_server(mut self, url: impl Into<String>) -> Self {
        self.ice_servers.push(url.into());
        self
    }

    /// Use a caller-owned cancellation token
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Check the options and return the parsed endpoint URL
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.connection_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("connection timeout"));
        }
        if self.rw_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("read/write timeout"));
        }

        let url = Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.url, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                self.url, scheme
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::new("https://example.com/whip");

        assert_eq!(config.url, "https://example.com/whip");
        assert!(config.bearer_token.is_none());
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.rw_timeout, Duration::from_secs(1));
        assert!(config.ice_servers.is_empty());
        assert!(!config.cancellation.is_cancelled());
    }

    #[test]
    fn test_builder_chaining() {
        let token = CancellationToken::new();
        let config = ClientConfig::new("http://localhost:8080/whep")
            .bearer_token("abc")
            .connection_timeout(Duration::from_secs(3))
            .rw_timeout(Duration::from_millis(250))
            .ice_server("stun:stun.l.google.com:19302")
            .cancellation(token.clone());

        assert_eq!(config.bearer_token.as_deref(), Some("abc"));
        assert_eq!(config.connection_timeout, Duration::from_secs(3));
        assert_eq!(config.rw_timeout, Duration::from_millis(250));
        assert_eq!(config.ice_servers, vec!["stun:stun.l.google.com:19302"]);

        token.cancel();
        assert!(config.cancellation.is_cancelled());
    }

    #[test]
    fn test_validate() {
        let url = ClientConfig::new("https://example.com/whip/live")
            .validate()
            .unwrap();
        assert_eq!(url.host_str(), Some("example.com"));

        assert!(matches!(
            ClientConfig::new("").validate(),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            ClientConfig::new("rtmp://example.com/live").validate(),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            ClientConfig::new("https://example.com")
                .connection_timeout(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroTimeout(_))
        ));
        assert!(matches!(
            ClientConfig::new("https://example.com")
                .rw_timeout(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroTimeout(_))
        ));
    }
}
