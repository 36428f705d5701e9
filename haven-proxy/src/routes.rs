//! HTTP surface of the proxy.
//!
//! Every path outside `/__haven/` is a page request and goes through the
//! agent. The `/__haven/` endpoints stand in for the page-side APIs: message
//! posting, push delivery and notification clicks.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request as HttpRequest, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
    routing::{get, post},
    Json, Router,
};
use haven_agent::{EventSender, FetchOutcome};
use haven_core::{
    AgentState, ControlMessage, Destination, Headers, Method, NotificationClick,
    NotificationDescriptor, Request, RequestMode, Response, Url,
};
use haven_storage::TierStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::error::{ProxyError, ProxyResult};
use crate::host::ProxyHost;
use crate::network::ReqwestNetwork;
use crate::ProxyAgent;

/// Largest request body the proxy buffers.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub events: EventSender,
    pub agent: Arc<ProxyAgent>,
    pub host: Arc<ProxyHost>,
    pub network: Arc<ReqwestNetwork>,
}

impl AppState {
    pub fn new(
        events: EventSender,
        agent: Arc<ProxyAgent>,
        host: Arc<ProxyHost>,
        network: Arc<ReqwestNetwork>,
    ) -> Self {
        Self {
            events,
            agent,
            host,
            network,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub state: AgentState,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub backend: String,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub entry_count: u64,
    pub tier_count: u64,
    pub hit_rate: f64,
    pub tiers: Vec<String>,
}

// ============================================================================
// CONVERSION
// ============================================================================

fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    let fetch_mode = headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);
    match fetch_mode.as_deref() {
        Some("navigate") => RequestMode::Navigate,
        Some("same-origin") => RequestMode::SameOrigin,
        Some("no-cors") => RequestMode::NoCors,
        Some("cors") => RequestMode::Cors,
        _ => {
            let wants_html = headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .map(|accept| accept.contains("text/html"))
                .unwrap_or(false);
            if method.is_get() && wants_html {
                RequestMode::Navigate
            } else {
                RequestMode::SameOrigin
            }
        }
    }
}

fn request_destination(mode: RequestMode, url: &Url, headers: &HeaderMap) -> Destination {
    if let Some(dest) = headers.get("sec-fetch-dest").and_then(|v| v.to_str().ok()) {
        return Destination::from_fetch_dest(dest);
    }
    if mode == RequestMode::Navigate {
        Destination::Document
    } else {
        Destination::infer_from_path(url.path())
    }
}

/// Build the agent's view of an inbound request, addressed at the public origin.
pub fn to_agent_request(
    public_origin: &Url,
    method: &str,
    path_and_query: &str,
    headers: &HeaderMap,
) -> ProxyResult<Request> {
    let url = public_origin
        .join(path_and_query)
        .map_err(|e| ProxyError::BadRequest(format!("Invalid path {}: {}", path_and_query, e)))?;
    let method = Method::parse(method);
    let mode = request_mode(&method, headers);
    let destination = request_destination(mode, &url, headers);

    let request_headers: Headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let mut request = Request::new(method, url)
        .with_mode(mode)
        .with_destination(destination);
    request.headers = request_headers;
    Ok(request)
}

/// Render an agent response. Headers that do not form valid HTTP are dropped.
pub fn to_http_response(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out = HttpResponse::new(Body::from(response.body));
    *out.status_mut() = status;

    let headers = out.headers_mut();
    for (name, value) in response.headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(header = name, "Dropping invalid response header"),
        }
    }
    out
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Every page request: agent first, upstream on passthrough.
async fn intercept(State(state): State<AppState>, request: HttpRequest) -> ProxyResult<HttpResponse> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let agent_request = to_agent_request(
        state.network.public_origin(),
        parts.method.as_str(),
        path_and_query,
        &parts.headers,
    )?;

    match state.events.fetch(agent_request.clone()).await?? {
        FetchOutcome::Respond(response) => Ok(to_http_response(response)),
        FetchOutcome::Passthrough => {
            let body = to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|e| ProxyError::BadRequest(format!("Unreadable body: {}", e)))?;
            let response = state.network.forward(&agent_request, body.to_vec()).await?;
            Ok(to_http_response(response))
        }
    }
}

/// Post a control message. `GET_VERSION` is answered inline.
async fn post_message(State(state): State<AppState>, body: Bytes) -> ProxyResult<HttpResponse> {
    // Malformed bodies are treated like any unrecognised message.
    let data: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    match ControlMessage::parse(&data) {
        Some(message) if message.expects_reply() => match state.events.request(data).await? {
            Some(reply) => Ok(Json(reply).into_response()),
            None => Ok(StatusCode::NO_CONTENT.into_response()),
        },
        Some(_) => {
            state.events.post_message(data).await?;
            Ok(StatusCode::ACCEPTED.into_response())
        }
        None => {
            tracing::debug!("Ignoring unrecognised message");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

/// Deliver a push payload as the push service would.
async fn push(State(state): State<AppState>, body: Bytes) -> ProxyResult<HttpResponse> {
    let payload = (!body.is_empty()).then(|| body.to_vec());
    match state.events.push(payload).await?? {
        Some(descriptor) => Ok((StatusCode::CREATED, Json(descriptor)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn notification_click(
    State(state): State<AppState>,
    Json(click): Json<NotificationClick>,
) -> ProxyResult<StatusCode> {
    state.events.notification_click(click).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn notifications(State(state): State<AppState>) -> Json<Vec<NotificationDescriptor>> {
    Json(state.host.active_notifications())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let agent_state = state.agent.state().await;
    let status = match agent_state {
        AgentState::Active => "healthy",
        AgentState::Failed => "degraded",
        _ => "starting",
    };
    Json(HealthResponse {
        status: status.to_string(),
        state: agent_state,
        version: state.agent.version(),
    })
}

async fn stats(State(state): State<AppState>) -> ProxyResult<Json<StatsResponse>> {
    let stats = state.agent.stats().await?;
    let tiers = state.agent.store().list_tier_names().await?;
    Ok(Json(StatsResponse {
        backend: state.agent.store().backend().to_string(),
        hits: stats.hits,
        misses: stats.misses,
        writes: stats.writes,
        entry_count: stats.entry_count,
        tier_count: stats.tier_count,
        hit_rate: stats.hit_rate(),
        tiers,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/__haven/message", post(post_message))
        .route("/__haven/push", post(push))
        .route("/__haven/notification-click", post(notification_click))
        .route("/__haven/notifications", get(notifications))
        .route("/__haven/health", get(health))
        .route("/__haven/stats", get(stats))
        .fallback(intercept)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
