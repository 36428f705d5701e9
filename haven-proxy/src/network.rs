//! Upstream access over reqwest.
//!
//! Pages address the proxy by its public origin; requests for that origin are
//! rewritten onto the upstream origin before being sent. Any other origin is
//! fetched as-is.

use std::time::Duration;

use async_trait::async_trait;
use haven_agent::Network;
use haven_core::{Headers, NetworkError, Request, Response, ResponseType, Url};

use crate::error::{ProxyError, ProxyResult};

/// Headers scoped to a single connection, never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn forwardable(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    // Responses are stored decoded, so upstream must not compress them.
    !HOP_BY_HOP.contains(&name.as_str()) && name != "accept-encoding"
}

fn map_error(url: &Url, timeout: Option<Duration>, error: reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
        }
    } else if error.is_connect() {
        NetworkError::Unreachable {
            url: url.to_string(),
            reason: error.to_string(),
        }
    } else {
        NetworkError::Upstream {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestNetwork {
    client: reqwest::Client,
    public_origin: Url,
    upstream: Url,
    timeout: Option<Duration>,
}

impl ReqwestNetwork {
    /// `timeout` bounds each request at the client; the agent applies its
    /// own bound on top.
    pub fn new(public_origin: Url, upstream: Url, timeout: Option<Duration>) -> ProxyResult<Self> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            public_origin,
            upstream,
            timeout,
        })
    }

    pub fn public_origin(&self) -> &Url {
        &self.public_origin
    }

    /// Where a request for `url` is actually sent.
    pub fn upstream_url(&self, url: &Url) -> Url {
        if url.origin() != self.public_origin.origin() {
            return url.clone();
        }
        let mut target = self.upstream.clone();
        target.set_path(url.path());
        target.set_query(url.query());
        target
    }

    /// Send `request` with `body` upstream. Used directly for requests the
    /// agent declines to intercept.
    pub async fn forward(&self, request: &Request, body: Vec<u8>) -> Result<Response, NetworkError> {
        let target = self.upstream_url(&request.url);
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes()).map_err(|e| {
            NetworkError::Upstream {
                url: request.url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut outbound = self.client.request(method, target.clone());
        for (name, value) in request.headers.iter().filter(|(name, _)| forwardable(name)) {
            outbound = outbound.header(name, value);
        }
        if !body.is_empty() {
            outbound = outbound.body(body);
        }

        tracing::debug!(method = %request.method.as_str(), url = %request.url, upstream = %target, "Forwarding upstream");
        let upstream = outbound
            .send()
            .await
            .map_err(|e| map_error(&request.url, self.timeout, e))?;

        let status = upstream.status().as_u16();
        let headers: Headers = upstream
            .headers()
            .iter()
            .filter(|(name, _)| forwardable(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| map_error(&request.url, self.timeout, e))?;

        let response_type = if request.is_same_origin(&self.public_origin) {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };

        Ok(Response {
            status,
            headers,
            body: bytes.to_vec(),
            response_type,
        })
    }
}

#[async_trait]
impl Network for ReqwestNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.forward(request, Vec::new()).await
    }
}
