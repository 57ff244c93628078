//! weirproxy observability library entry.
//!
//! Wires the metrics registry, the server metric set, config loading, and the
//! ops HTTP surface into one state object. Consumed by the binary (`main.rs`)
//! and by integration tests.

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
