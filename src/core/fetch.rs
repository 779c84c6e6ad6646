// src/core/fetch.rs

//! The fetch executor: performs the actual network call under a bounded
//! timeout and classifies its failures.
//!
//! The executor is a trait seam rather than a concrete client so tests can
//! substitute a scripted transport. The live implementation is backed by
//! `reqwest` with a per-request timeout; exceeding it aborts the call and
//! surfaces a timeout-classified failure. No retries happen at this layer.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::core::errors::GatewayError;

/// Hard bound on a single network round trip.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A fully-specified outbound request, independent of any transport.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

/// Status plus decoded payload.
///
/// An explicit result type instead of a platform response object. Non-2xx
/// statuses are carried, not raised: a legitimate error response is a
/// successful transport operation and the caller inspects `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePayload {
    pub status: u16,
    pub body: Bytes,
}

impl ResponsePayload {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }
}

/// The transport seam the gateway and refresh worker call through.
#[async_trait]
pub trait FetchExecutor: Send + Sync {
    async fn execute(&self, request: &FetchRequest) -> Result<ResponsePayload, GatewayError>;
}

/// `reqwest`-backed executor. The timeout covers the whole round trip,
/// connection included, and cancels the underlying request when it fires.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpExecutor {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl FetchExecutor for HttpExecutor {
    async fn execute(&self, request: &FetchRequest) -> Result<ResponsePayload, GatewayError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            GatewayError::InvalidRequest(format!("invalid HTTP method '{}'", request.method))
        })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(&e, self.timeout))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(&e, self.timeout))?;

        Ok(ResponsePayload { status, body })
    }
}

fn classify(e: &reqwest::Error, timeout: Duration) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(timeout.as_millis() as u64)
    } else {
        GatewayError::Network(e.to_string())
    }
}
