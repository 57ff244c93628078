//! weirproxy core: error surface, structured error codes, and the error classifier.
//!
//! This crate defines the error types shared by the proxy and the rule that
//! turns any error into a stable, low-cardinality metric label. It
//! intentionally carries no transport or runtime dependencies so producers
//! anywhere in the proxy can call into it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Classification is total: every input yields a non-empty label.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod classify;
pub mod errcode;
pub mod error;

/// Shared result type.
pub use error::{Result, WeirError};

pub use classify::{error_label, error_label_opt, root_cause, ErrorClassifier, UNKNOWN_LABEL};
pub use errcode::{CodedError, ErrorClass, ErrorCode};
