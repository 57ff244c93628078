//! Server metric taxonomy for weirproxy.
//!
//! Every label value recorded here comes from a closed vocabulary (the enums
//! below) or from the error classifier, so series cardinality stays bounded.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use weir_core::classify::ErrorClassifier;
use weir_core::error::Result;

use super::metrics::{exponential_buckets, Counter, CounterVec, Gauge, Histogram, MetricName, Opts, Registry};

pub const NAMESPACE: &str = "weirproxy";
pub const SUBSYSTEM_SERVER: &str = "server";

pub const LBL_TYPE: &str = "type";
pub const LBL_RESULT: &str = "result";

/// Token wait buckets, in microseconds: 1us .. ~537s.
pub const GET_TOKEN_BUCKET_START: f64 = 1.0;
pub const GET_TOKEN_BUCKET_FACTOR: f64 = 2.0;
pub const GET_TOKEN_BUCKET_COUNT: usize = 30;

const fn server(name: &'static str) -> MetricName {
    MetricName::new(NAMESPACE, SUBSYSTEM_SERVER, name)
}

/// Lifecycle transitions of the proxy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    Start,
    GracefulShutdown,
    /// Forced termination (server kill).
    Kill,
    Close,
}

impl ServerEvent {
    pub const ALL: [ServerEvent; 4] = [
        ServerEvent::Start,
        ServerEvent::GracefulShutdown,
        ServerEvent::Kill,
        ServerEvent::Close,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServerEvent::Start => "start",
            ServerEvent::GracefulShutdown => "graceful_shutdown",
            ServerEvent::Kill => "kill",
            ServerEvent::Close => "close",
        }
    }
}

/// Outcome of a proxied query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryResult {
    Ok,
    Error,
}

impl QueryResult {
    pub fn of<T, E>(res: &std::result::Result<T, E>) -> Self {
        if res.is_ok() {
            QueryResult::Ok
        } else {
            QueryResult::Error
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryResult::Ok => "OK",
            QueryResult::Error => "Error",
        }
    }
}

/// Client command kind that produced a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Query,
    InitDb,
    FieldList,
    Ping,
    Quit,
    StmtPrepare,
    StmtExecute,
    StmtFetch,
    StmtClose,
    StmtReset,
    StmtSendLongData,
    SetOption,
    ChangeUser,
    ResetConnection,
    Other,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::Query => "Query",
            QueryType::InitDb => "InitDB",
            QueryType::FieldList => "FieldList",
            QueryType::Ping => "Ping",
            QueryType::Quit => "Quit",
            QueryType::StmtPrepare => "StmtPrepare",
            QueryType::StmtExecute => "StmtExecute",
            QueryType::StmtFetch => "StmtFetch",
            QueryType::StmtClose => "StmtClose",
            QueryType::StmtReset => "StmtReset",
            QueryType::StmtSendLongData => "StmtSendLongData",
            QueryType::SetOption => "SetOption",
            QueryType::ChangeUser => "ChangeUser",
            QueryType::ResetConnection => "ResetConnection",
            QueryType::Other => "Other",
        }
    }

    /// Map a MySQL command byte; unknown bytes collapse into `Other`.
    pub fn from_command_byte(b: u8) -> Self {
        match b {
            0x01 => QueryType::Quit,
            0x02 => QueryType::InitDb,
            0x03 => QueryType::Query,
            0x04 => QueryType::FieldList,
            0x0e => QueryType::Ping,
            0x11 => QueryType::ChangeUser,
            0x16 => QueryType::StmtPrepare,
            0x17 => QueryType::StmtExecute,
            0x18 => QueryType::StmtSendLongData,
            0x19 => QueryType::StmtClose,
            0x1a => QueryType::StmtReset,
            0x1b => QueryType::SetOption,
            0x1c => QueryType::StmtFetch,
            0x1f => QueryType::ResetConnection,
            _ => QueryType::Other,
        }
    }
}

/// Where a recovered panic originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanicOrigin {
    Server,
    Session,
    Query,
    Handshake,
}

impl PanicOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            PanicOrigin::Server => "server",
            PanicOrigin::Session => "session",
            PanicOrigin::Query => "query",
            PanicOrigin::Handshake => "handshake",
        }
    }
}

/// Handles for every server metric. Cheap to clone; producers keep a copy.
#[derive(Clone)]
pub struct ServerMetrics {
    pub panic: Arc<CounterVec<1>>,
    pub query_total: Arc<CounterVec<2>>,
    pub execute_error: Arc<CounterVec<1>>,
    pub critical_error: Arc<Counter>,
    pub connections: Arc<Gauge>,
    pub event: Arc<CounterVec<1>>,
    pub get_token_duration: Arc<Histogram>,
    pub handshake_error: Arc<Counter>,
    classifier: ErrorClassifier,
}

impl ServerMetrics {
    /// Define the server metrics on `registry`. Fails if any name is taken.
    pub fn register(registry: &Registry) -> Result<Self> {
        let token_buckets = exponential_buckets(
            GET_TOKEN_BUCKET_START,
            GET_TOKEN_BUCKET_FACTOR,
            GET_TOKEN_BUCKET_COUNT,
        )?;

        Ok(Self {
            panic: registry.counter_vec(
                Opts::new(server("panic_total"), "Counter of recovered panics."),
                [LBL_TYPE],
            )?,
            query_total: registry.counter_vec(
                Opts::new(server("query_total"), "Counter of queries."),
                [LBL_TYPE, LBL_RESULT],
            )?,
            execute_error: registry.counter_vec(
                Opts::new(server("execute_error_total"), "Counter of execute errors."),
                [LBL_TYPE],
            )?,
            critical_error: registry.counter(Opts::new(
                server("critical_error_total"),
                "Counter of critical errors.",
            ))?,
            connections: registry.gauge(Opts::new(server("connections"), "Number of connections."))?,
            event: registry.counter_vec(
                Opts::new(server("event_total"), "Counter of weirproxy server events."),
                [LBL_TYPE],
            )?,
            get_token_duration: registry.histogram(
                Opts::new(
                    server("get_token_duration_seconds"),
                    "Duration (us) for getting a token; small until the concurrency limit is reached.",
                ),
                token_buckets,
            )?,
            handshake_error: registry.counter(Opts::new(
                server("handshake_error_total"),
                "Counter of handshake errors.",
            ))?,
            classifier: ErrorClassifier::default(),
        })
    }

    /// Classify execute errors with `classifier` instead of the default.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn record_panic(&self, origin: PanicOrigin) {
        self.panic.inc([origin.as_str()]);
    }

    pub fn record_query(&self, ty: QueryType, result: QueryResult) {
        self.query_total.inc([ty.as_str(), result.as_str()]);
    }

    /// Count an execute failure under its classified label and return the label.
    pub fn record_execute_error(&self, err: &(dyn Error + 'static)) -> String {
        let label = self.classifier.label(err);
        tracing::debug!(label = %label, error = %err, "execute error");
        self.execute_error.inc([label.as_str()]);
        label
    }

    pub fn record_critical_error(&self) {
        self.critical_error.inc();
    }

    pub fn record_event(&self, ev: ServerEvent) {
        self.event.inc([ev.as_str()]);
    }

    pub fn observe_get_token(&self, waited: Duration) {
        self.get_token_duration.observe_duration(waited);
    }

    pub fn record_handshake_error(&self) {
        self.handshake_error.inc();
    }

    /// Count a connection as open until the guard drops.
    pub fn connection_opened(&self) -> ConnectionGuard {
        self.connections.inc();
        ConnectionGuard {
            gauge: Arc::clone(&self.connections),
        }
    }
}

/// Decrements the connections gauge on drop.
#[must_use = "the connection is counted as closed as soon as the guard drops"]
pub struct ConnectionGuard {
    gauge: Arc<Gauge>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_core::{CodedError, ErrorClass};

    #[test]
    fn registers_all_server_metrics() {
        let r = Registry::new();
        ServerMetrics::register(&r).unwrap();
        let names = r.names();
        for n in [
            "weirproxy_server_panic_total",
            "weirproxy_server_query_total",
            "weirproxy_server_execute_error_total",
            "weirproxy_server_critical_error_total",
            "weirproxy_server_connections",
            "weirproxy_server_event_total",
            "weirproxy_server_get_token_duration_seconds",
            "weirproxy_server_handshake_error_total",
        ] {
            assert!(names.iter().any(|x| x == n), "missing {n}");
        }
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn second_registration_is_rejected() {
        let r = Registry::new();
        ServerMetrics::register(&r).unwrap();
        let err = ServerMetrics::register(&r).err().unwrap();
        assert!(err.is_definition_error());
    }

    #[test]
    fn token_buckets_double_from_one() {
        let r = Registry::new();
        let m = ServerMetrics::register(&r).unwrap();
        let b = m.get_token_duration.upper_bounds();
        assert_eq!(b.len(), 30);
        assert_eq!(b[0], 1.0);
        for w in b.windows(2) {
            assert!(w[1] > w[0]);
            assert_eq!(w[1], w[0] * 2.0);
        }
        assert_eq!(b[29], 536_870_912.0);
    }

    #[test]
    fn execute_error_uses_classifier() {
        let r = Registry::new();
        let m = ServerMetrics::register(&r).unwrap();
        let e = CodedError::new(ErrorClass::Executor, 1105, "unknown error");
        assert_eq!(m.record_execute_error(&e), "executor:1105");
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "backend timeout");
        assert_eq!(m.record_execute_error(&io), "unknown");
        assert_eq!(m.execute_error.get(["executor:1105"]), 1);
        assert_eq!(m.execute_error.get(["unknown"]), 1);
        assert_eq!(m.execute_error.get(["backend timeout"]), 0);
    }

    #[derive(Debug)]
    struct BackendError(u32);

    impl std::fmt::Display for BackendError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "backend error {}", self.0)
        }
    }

    impl Error for BackendError {}

    impl weir_core::ErrorCode for BackendError {
        fn class(&self) -> ErrorClass {
            ErrorClass::Server
        }

        fn code(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn execute_error_with_registered_code_type() {
        let r = Registry::new();
        let m = ServerMetrics::register(&r).unwrap();
        assert_eq!(m.record_execute_error(&BackendError(2013)), "unknown");

        let m = m.with_classifier(ErrorClassifier::new().with_code_type::<BackendError>());
        assert_eq!(m.record_execute_error(&BackendError(2013)), "server:2013");
        assert_eq!(m.execute_error.get(["server:2013"]), 1);
        assert_eq!(m.execute_error.get(["unknown"]), 1);
    }

    #[test]
    fn connection_guard_tracks_gauge() {
        let r = Registry::new();
        let m = ServerMetrics::register(&r).unwrap();
        let a = m.connection_opened();
        let b = m.connection_opened();
        assert_eq!(m.connections.get(), 2);
        drop(a);
        assert_eq!(m.connections.get(), 1);
        drop(b);
        assert_eq!(m.connections.get(), 0);
    }

    #[test]
    fn query_and_event_labels() {
        let r = Registry::new();
        let m = ServerMetrics::register(&r).unwrap();
        let res: std::result::Result<(), ()> = Err(());
        m.record_query(QueryType::from_command_byte(0x03), QueryResult::of(&res));
        m.record_query(QueryType::from_command_byte(0xff), QueryResult::Ok);
        for ev in ServerEvent::ALL {
            m.record_event(ev);
        }
        assert_eq!(m.query_total.get(["Query", "Error"]), 1);
        assert_eq!(m.query_total.get(["Other", "OK"]), 1);
        assert_eq!(m.event.len(), 4);
        assert_eq!(m.event.get(["graceful_shutdown"]), 1);
    }
}
