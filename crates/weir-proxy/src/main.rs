//! weirproxy ops binary.
//!
//! - Loads the config (first argument, `WEIRPROXY_CONFIG`, or `weirproxy.yaml`)
//! - Builds the metrics registry and server metric set
//! - Serves `/healthz` and `/metrics`
//! - Records lifecycle events: start, graceful_shutdown on Ctrl-C, close on exit

use tracing_subscriber::{fmt, EnvFilter};

use weir_core::error::{Result, WeirError};
use weir_proxy::obs::server::ServerEvent;
use weir_proxy::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "weir-proxy exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = config::path_from_env();
    let cfg = config::load_from_file(&path)?;

    let state = app_state::AppState::new(cfg)?;
    let listen = state.cfg().ops.listen_addr()?;
    let metrics = state.metrics().clone();
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| WeirError::Internal(format!("bind {listen} failed: {e}")))?;

    metrics.record_event(ServerEvent::Start);
    tracing::info!(%listen, config = %path.display(), "weir-proxy starting");

    let shutdown_metrics = metrics.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            shutdown_metrics.record_event(ServerEvent::GracefulShutdown);
            tracing::info!("graceful shutdown requested");
        })
        .await;

    metrics.record_event(ServerEvent::Close);
    if let Err(e) = served {
        metrics.record_critical_error();
        return Err(WeirError::Internal(format!("server failed: {e}")));
    }
    tracing::info!("weir-proxy closed");
    Ok(())
}
