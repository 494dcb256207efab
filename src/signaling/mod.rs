//! HTTP signaling
//!
//! WHIP and WHEP carry only the initial offer/answer and an optional
//! DELETE over HTTP. This module defines the narrow HTTP capability the
//! exchange needs, so the exchange itself is transport-agnostic:
//!
//! - [`exchange::SignalingExchange`] drives create/delete resource
//! - [`http::HyperTransport`] is the production HTTP(S) client

pub mod exchange;
pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{HeaderMap, Method, StatusCode};

use crate::error::SignalingError;

pub use exchange::SignalingExchange;
pub use http::HyperTransport;

/// Media type of offer/answer bodies
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// One signaling request
#[derive(Debug, Clone)]
pub struct SignalingRequest {
    pub method: Method,
    /// Absolute request URL
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Reject response bodies larger than this many bytes
    pub max_response_size: usize,
}

/// Response to a [`SignalingRequest`]
#[derive(Debug, Clone)]
pub struct SignalingResponse {
    pub status: StatusCode,
    /// Raw `Location` header, if present
    pub location: Option<String>,
    pub body: Bytes,
}

/// HTTP client capability
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute one request and read the complete response body
    async fn execute(&self, request: SignalingRequest)
        -> Result<SignalingResponse, SignalingError>;
}
