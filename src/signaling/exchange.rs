//! Signaling exchange
//!
//! Create resource: the local offer is POSTed to the endpoint, the answer
//! in the response body becomes the remote description and the
//! `Location` header names the resource for later deletion. A location
//! returned with a 2xx status is kept even when the answer is rejected.
//!
//! Delete resource: a DELETE to that location, best-effort.

use std::sync::Arc;

use bytes::Bytes;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::engine::{PeerConnection, SdpType};
use crate::error::{Error, Result, SignalingError};
use crate::sdp::{self, SDP_MAX_SIZE};

use super::{HttpTransport, SignalingRequest, SignalingResponse, SDP_CONTENT_TYPE};

/// Maximum number of redirects followed while posting the offer
pub const MAX_REDIRECTS: usize = 8;

/// Offer/answer and teardown exchange with a WHIP/WHEP endpoint
pub struct SignalingExchange {
    http: Arc<dyn HttpTransport>,
    url: Url,
    bearer_token: Option<String>,
    resource_location: Option<Url>,
    cancel: CancellationToken,
}

impl SignalingExchange {
    pub fn new(
        http: Arc<dyn HttpTransport>,
        url: Url,
        bearer_token: Option<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            url,
            bearer_token,
            resource_location: None,
            cancel,
        }
    }

    /// Endpoint URL the offer is posted to
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Location of the remote resource, once created
    pub fn resource_location(&self) -> Option<&Url> {
        self.resource_location.as_ref()
    }

    /// Run the offer/answer exchange.
    ///
    /// Every track must already be on the peer connection so that it
    /// appears in the offer.
    pub async fn create_resource(&mut self, peer: &dyn PeerConnection) -> Result<()> {
        if self.resource_location.is_some() {
            return Err(Error::Internal("resource already created"));
        }

        peer.set_local_description(SdpType::Offer)?;
        let offer = peer.local_description()?;
        sdp::check_size(offer.len())?;
        tracing::debug!(offer = %offer, "Generated local offer");

        let offer = Bytes::from(offer);
        let mut target = self.url.clone();
        let mut redirects = 0;

        let response = loop {
            let request = self.request(Method::POST, &target, offer.clone(), true)?;
            let response = self.execute(request).await?;

            if !is_redirect(response.status) {
                break response;
            }
            if redirects == MAX_REDIRECTS {
                return Err(SignalingError::TooManyRedirects(MAX_REDIRECTS).into());
            }
            redirects += 1;

            let location = response.location.as_deref().ok_or_else(|| {
                SignalingError::InvalidLocation("redirect without Location header".into())
            })?;
            target = resolve(&target, location)?;
            tracing::info!(url = %target, status = %response.status, "Following redirect");
        };

        if !response.status.is_success() {
            tracing::error!(url = %target, status = %response.status, "Offer rejected");
            return Err(SignalingError::Status(response.status.as_u16()).into());
        }

        // The resource exists from here on, even if its answer is unusable.
        if let Some(location) = response.location.as_deref() {
            let location = resolve(&target, location)?;
            tracing::debug!(location = %location, "Resource created");
            self.resource_location = Some(location);
        } else {
            tracing::warn!(url = %target, "Server did not return a resource location");
        }

        sdp::check_size(response.body.len())?;
        if response.body.is_empty() {
            return Err(SignalingError::EmptyAnswer.into());
        }
        let answer =
            std::str::from_utf8(&response.body).map_err(|_| SignalingError::InvalidEncoding)?;
        tracing::debug!(answer = %answer, "Received remote answer");

        peer.set_remote_description(answer, SdpType::Answer)?;
        Ok(())
    }

    /// Delete the remote resource.
    ///
    /// No-op when no resource exists. The stored location is cleared
    /// whatever the outcome. The response body is ignored.
    pub async fn delete_resource(&mut self) -> Result<()> {
        let Some(location) = self.resource_location.take() else {
            return Ok(());
        };

        // Runs during teardown, so cancellation is not observed here.
        let request = self.request(Method::DELETE, &location, Bytes::new(), false)?;
        let response = self.http.execute(request).await?;

        if !response.status.is_success() {
            tracing::warn!(
                location = %location,
                status = %response.status,
                "Delete returned non-success status, resource may still exist"
            );
            return Err(SignalingError::Status(response.status.as_u16()).into());
        }

        tracing::debug!(location = %location, "Resource deleted");
        Ok(())
    }

    fn request(
        &self,
        method: Method,
        url: &Url,
        body: Bytes,
        with_content_type: bool,
    ) -> Result<SignalingRequest> {
        let mut headers = HeaderMap::new();
        if with_content_type {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(SDP_CONTENT_TYPE),
            );
        }
        if let Some(ref token) = self.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| SignalingError::Transport("invalid bearer token".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        tracing::debug!(method = %method, url = %url, headers = ?headers, "Signaling request");

        Ok(SignalingRequest {
            method,
            url: url.to_string(),
            headers,
            body,
            max_response_size: SDP_MAX_SIZE,
        })
    }

    async fn execute(&self, request: SignalingRequest) -> Result<SignalingResponse> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            response = self.http.execute(request) => Ok(response?),
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    status == StatusCode::TEMPORARY_REDIRECT || status == StatusCode::PERMANENT_REDIRECT
}

/// Resolve a `Location` value against the URL of the request it answered
fn resolve(base: &Url, location: &str) -> std::result::Result<Url, SignalingError> {
    base.join(location)
        .map_err(|e| SignalingError::InvalidLocation(format!("{}: {}", location, e)))
}
