//! Observability: metrics registry and the proxy's server metric set.
//!
//! Metrics live in an explicitly constructed [`metrics::Registry`] owned by
//! `AppState`; producers hold the handles in [`server::ServerMetrics`] and
//! the `/metrics` handler renders the registry.

pub mod metrics;
pub mod server;

pub use metrics::Registry;
pub use server::ServerMetrics;
