//! Error classifier: maps any error to a stable, low-cardinality label.
//!
//! The label is `"<class>:<code>"` when the root cause exposes [`ErrorCode`],
//! and [`UNKNOWN_LABEL`] otherwise. Raw error messages never become labels.
//!
//! A `&dyn Error` cannot be asked whether its concrete type implements
//! [`ErrorCode`], so each structured type is made visible through a probe.
//! [`CodedError`] is always probed; other implementors are added with
//! [`ErrorClassifier::with_code_type`].

use std::error::Error;

use crate::errcode::{CodedError, ErrorCode};

/// Label for errors without structured metadata.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Exposes the `ErrorCode` capability of one concrete type.
type Probe = for<'a> fn(&'a (dyn Error + 'static)) -> Option<&'a dyn ErrorCode>;

fn probe<'a, E: ErrorCode + 'static>(err: &'a (dyn Error + 'static)) -> Option<&'a dyn ErrorCode> {
    err.downcast_ref::<E>().map(|e| e as &dyn ErrorCode)
}

fn next_cause<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a (dyn Error + 'static)> {
    // io::Error::source() skips its own custom payload.
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        if let Some(inner) = io.get_ref() {
            return Some(inner as &(dyn Error + 'static));
        }
    }
    err.source()
}

// Address and vtable: a source field at offset 0 shares its wrapper's address.
fn same_error(a: &(dyn Error + 'static), b: &(dyn Error + 'static)) -> bool {
    std::ptr::eq(a as *const dyn Error, b as *const dyn Error)
}

/// Follow the wrapping chain down to the innermost error.
///
/// Chains of any length are followed to the end. A chain whose `source()`
/// loops back on itself has no innermost error; the walk stops where the
/// cycle is detected (Floyd), which is the same node on every call.
pub fn root_cause<'a>(err: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    let mut slow = err;
    let mut fast = err;
    loop {
        let Some(one) = next_cause(fast) else {
            return fast;
        };
        let Some(two) = next_cause(one) else {
            return one;
        };
        fast = two;
        let Some(s) = next_cause(slow) else {
            return fast;
        };
        slow = s;
        if same_error(slow, fast) {
            return slow;
        }
    }
}

/// Classifier with the set of structured error types it recognizes.
///
/// The default recognizes [`CodedError`] only; it allocates nothing.
#[derive(Clone, Default)]
pub struct ErrorClassifier {
    extra: Vec<Probe>,
}

impl std::fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("extra_types", &self.extra.len())
            .finish()
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognize `E` as carrying `{class, code}`.
    pub fn with_code_type<E: ErrorCode + 'static>(mut self) -> Self {
        self.extra.push(probe::<E>);
        self
    }

    /// The `ErrorCode` view of `err`, if its type is recognized.
    pub fn error_code<'a>(&self, err: &'a (dyn Error + 'static)) -> Option<&'a dyn ErrorCode> {
        probe::<CodedError>(err).or_else(|| self.extra.iter().find_map(|p| p(err)))
    }

    /// Convert an execute error to a metric label.
    pub fn label(&self, err: &(dyn Error + 'static)) -> String {
        match self.error_code(root_cause(err)) {
            Some(coded) => format!("{}:{}", coded.class(), coded.code()),
            None => UNKNOWN_LABEL.to_string(),
        }
    }

    /// Like [`ErrorClassifier::label`], but an absent error is `"unknown"`.
    pub fn label_opt(&self, err: Option<&(dyn Error + 'static)>) -> String {
        err.map_or_else(|| UNKNOWN_LABEL.to_string(), |e| self.label(e))
    }
}

/// [`ErrorClassifier::label`] with the default classifier.
pub fn error_label(err: &(dyn Error + 'static)) -> String {
    ErrorClassifier::default().label(err)
}

/// [`ErrorClassifier::label_opt`] with the default classifier.
pub fn error_label_opt(err: Option<&(dyn Error + 'static)>) -> String {
    ErrorClassifier::default().label_opt(err)
}
