//! Locally generated substitutes for failed fetches.

use std::sync::Arc;

use haven_core::{AgentConfig, Destination, NetworkError, Request, RequestIdentity, Response};
use haven_storage::{CacheTier, TierStore};

/// Rendered when a navigation fails and no offline document is cached.
pub const OFFLINE_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Offline</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            flex-direction: column;
            align-items: center;
            justify-content: center;
            min-height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, #2196F3, #1976D2);
            color: white;
            text-align: center;
            padding: 20px;
        }
        .offline-icon { font-size: 4rem; margin-bottom: 2rem; }
        h1 { font-size: 2.5rem; margin-bottom: 1rem; }
        p { font-size: 1.2rem; margin-bottom: 2rem; opacity: 0.9; }
        .retry-btn {
            background: #FFC107;
            color: #212121;
            border: none;
            padding: 12px 24px;
            border-radius: 8px;
            font-size: 1rem;
            font-weight: 600;
            cursor: pointer;
            transition: transform 0.2s ease;
        }
        .retry-btn:hover { transform: translateY(-2px); }
    </style>
</head>
<body>
    <div class="offline-icon">&#127760;</div>
    <h1>You're Offline</h1>
    <p>This page is not available offline. Please check your internet connection and try again.</p>
    <button class="retry-btn" onclick="window.location.reload()">Retry</button>
</body>
</html>
"#;

/// Served in place of any image that could not be fetched.
pub const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300" viewBox="0 0 400 300">
    <rect width="400" height="300" fill="#f0f0f0"/>
    <text x="200" y="150" text-anchor="middle" dy=".3em" fill="#999" font-family="Arial, sans-serif" font-size="18">
        Image unavailable offline
    </text>
</svg>"##;

/// The inline offline document.
pub fn offline_page() -> Response {
    Response::new(200, OFFLINE_PAGE_HTML).with_header("Content-Type", "text/html; charset=utf-8")
}

/// The inline placeholder graphic.
pub fn placeholder_image() -> Response {
    Response::new(200, PLACEHOLDER_SVG).with_header("Content-Type", "image/svg+xml")
}

/// Chooses a substitute by request purpose.
///
/// Navigations get the cached offline document or the inline page, images
/// get the placeholder, and everything else gets the original error back.
pub struct FallbackSynthesizer<S> {
    config: Arc<AgentConfig>,
    store: Arc<S>,
}

impl<S: TierStore> FallbackSynthesizer<S> {
    pub fn new(config: Arc<AgentConfig>, store: Arc<S>) -> Self {
        Self { config, store }
    }

    pub async fn synthesize(
        &self,
        request: &Request,
        error: NetworkError,
    ) -> Result<Response, NetworkError> {
        if request.is_navigation() {
            tracing::info!(url = %request.url, error = %error, "Serving offline document");
            return Ok(self.offline_document().await);
        }

        if request.destination == Destination::Image {
            tracing::info!(url = %request.url, error = %error, "Serving placeholder image");
            return Ok(placeholder_image());
        }

        tracing::debug!(url = %request.url, error = %error, "No fallback for request, propagating");
        Err(error)
    }

    /// Cached offline document from the current static tier, else the inline page.
    ///
    /// Never creates the static tier as a side effect of looking.
    async fn offline_document(&self) -> Response {
        match self.cached_offline_document().await {
            Ok(Some(response)) => response,
            Ok(None) => offline_page(),
            Err(e) => {
                tracing::warn!(error = %e, "Offline document lookup failed");
                offline_page()
            }
        }
    }

    async fn cached_offline_document(&self) -> haven_core::HavenResult<Option<Response>> {
        let tier_name = self.config.registry.static_name();
        if !self.store.has_tier(&tier_name).await? {
            return Ok(None);
        }
        let url = self.config.resolve(&self.config.offline_document)?;
        let tier = self.store.open(&tier_name).await?;
        tier.match_request(&RequestIdentity::get(&url)).await
    }
}
