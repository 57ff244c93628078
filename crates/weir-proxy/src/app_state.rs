//! Shared application state for weirproxy.
//!
//! The metrics registry is created here, once per process, and the server
//! metric handles are defined on it before any producer runs.

use std::sync::Arc;

use weir_core::error::Result;

use crate::config::ProxyConfig;
use crate::obs::{Registry, ServerMetrics};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ProxyConfig,
    registry: Registry,
    metrics: ServerMetrics,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: ProxyConfig) -> Result<Self> {
        let registry = Registry::new();
        let metrics = ServerMetrics::register(&registry)?;
        tracing::info!(metrics = registry.names().len(), "metrics registry ready");

        Ok(Self {
            inner: Arc::new(AppStateInner { cfg, registry, metrics }),
        })
    }

    pub fn cfg(&self) -> &ProxyConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Handles for producers (connection handler, executor, limiter...).
    pub fn metrics(&self) -> &ServerMetrics {
        &self.inner.metrics
    }
}
