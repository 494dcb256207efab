//! hyper-based HTTP transport

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::header;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::SignalingError;

use super::{HttpTransport, SignalingRequest, SignalingResponse};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type HttpsClient = Client<HttpsConnector<HttpConnector>, BoxBody<Bytes, Infallible>>;

/// HTTP and HTTPS signaling client
///
/// The timeout covers the whole exchange: connect, request and reading
/// the response body.
#[derive(Clone)]
pub struct HyperTransport {
    client: HttpsClient,
    timeout: Duration,
}

impl HyperTransport {
    /// Create a client with [`DEFAULT_REQUEST_TIMEOUT`]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        install_crypto_provider();

        let builder = match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                // Plain HTTP endpoints keep working without a trust store.
                tracing::warn!(error = %e, "No native CA roots, HTTPS endpoints will fail");
                let tls = rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls)
            }
        };

        let https = builder
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(https);

        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn round_trip(
        &self,
        request: SignalingRequest,
    ) -> Result<SignalingResponse, SignalingError> {
        let limit = request.max_response_size;

        let mut http_request = hyper::Request::builder()
            .method(request.method)
            .uri(request.url.as_str())
            .body(Full::new(request.body).boxed())
            .map_err(|e| SignalingError::Transport(format!("failed to build request: {}", e)))?;
        *http_request.headers_mut() = request.headers;

        let response = self
            .client
            .request(http_request)
            .await
            .map_err(|e| SignalingError::Transport(e.to_string()))?;

        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = Limited::new(response.into_body(), limit)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    SignalingError::DescriptionTooLarge { limit }
                } else {
                    SignalingError::Transport(format!("failed to read response: {}", e))
                }
            })?
            .to_bytes();

        Ok(SignalingResponse {
            status,
            location,
            body,
        })
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn execute(
        &self,
        request: SignalingRequest,
    ) -> Result<SignalingResponse, SignalingError> {
        tokio::time::timeout(self.timeout, self.round_trip(request))
            .await
            .map_err(|_| SignalingError::Timeout(self.timeout))?
    }
}

/// rustls needs a process-wide crypto provider before the first TLS
/// connector is built. Losing the install race to another caller is fine.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}
