//! Structured error metadata: a coarse class plus a stable numeric code.
//!
//! Errors that carry this metadata classify as `"<class>:<code>"`; everything
//! else classifies as `"unknown"`.

use std::fmt;

/// Coarse error category. Names are stable; they end up as metric label values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Autoid,
    Ddl,
    Domain,
    Evaluator,
    Executor,
    Expression,
    Admin,
    Kv,
    Meta,
    Optimizer,
    Parser,
    PerfSchema,
    Privilege,
    Schema,
    Server,
    Structure,
    Variable,
    Table,
    Types,
    Global,
    Json,
    Session,
    Plugin,
    Util,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Autoid => "autoid",
            ErrorClass::Ddl => "ddl",
            ErrorClass::Domain => "domain",
            ErrorClass::Evaluator => "evaluator",
            ErrorClass::Executor => "executor",
            ErrorClass::Expression => "expression",
            ErrorClass::Admin => "admin",
            ErrorClass::Kv => "kv",
            ErrorClass::Meta => "meta",
            ErrorClass::Optimizer => "planner",
            ErrorClass::Parser => "parser",
            ErrorClass::PerfSchema => "perfschema",
            ErrorClass::Privilege => "privilege",
            ErrorClass::Schema => "schema",
            ErrorClass::Server => "server",
            ErrorClass::Structure => "struct",
            ErrorClass::Variable => "variable",
            ErrorClass::Table => "table",
            ErrorClass::Types => "types",
            ErrorClass::Global => "global",
            ErrorClass::Json => "json",
            ErrorClass::Session => "session",
            ErrorClass::Plugin => "plugin",
            ErrorClass::Util => "util",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability: the error exposes a `{class, code}` pair.
pub trait ErrorCode: std::error::Error {
    fn class(&self) -> ErrorClass;
    fn code(&self) -> u32;
}

/// Structured error produced by the SQL layer (parser, executor, session...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedError {
    class: ErrorClass,
    code: u32,
    message: String,
}

impl CodedError {
    pub fn new(class: ErrorClass, code: u32, message: impl Into<String>) -> Self {
        Self {
            class,
            code,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]{}", self.class, self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

impl ErrorCode for CodedError {
    fn class(&self) -> ErrorClass {
        self.class
    }

    fn code(&self) -> u32 {
        self.code
    }
}
