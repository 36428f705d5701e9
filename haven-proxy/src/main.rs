//! HAVEN Proxy Entry Point
//!
//! Reads configuration from the environment, installs and activates the
//! agent, then serves until interrupted.

use haven_proxy::{bootstrap, init_tracing, Proxy, ProxyConfig, ProxyError, ProxyResult, TelemetryConfig};

#[tokio::main]
async fn main() -> ProxyResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let config = ProxyConfig::from_env()?;
    let store = config.open_store()?;
    let proxy = Proxy::assemble(&config, store)?;

    // A failed install leaves the agent passing every request through.
    match bootstrap(&proxy.events).await {
        Ok(state) => tracing::info!(state = %state, version = %proxy.agent.version(), "Agent ready"),
        Err(e) => tracing::error!(error = %e, "Agent bootstrap failed, serving passthrough"),
    }

    let addr = config.bind_addr()?;
    tracing::info!(%addr, upstream = %config.upstream, "Starting HAVEN proxy");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, proxy.router);
    tokio::select! {
        result = server => {
            result.map_err(|e| ProxyError::Internal(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    proxy.agent.wait_for_writes().await;
    Ok(())
}
