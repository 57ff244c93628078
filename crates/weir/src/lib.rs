//! Top-level facade crate for weirproxy observability.
//!
//! Re-exports the core error/classifier types and the proxy library so users can depend on a single crate.

pub mod core {
    pub use weir_core::*;
}

pub mod proxy {
    pub use weir_proxy::*;
}
