//! Concurrent writers against the registry: no lost updates, one instance per
//! label combination.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use weir_proxy::obs::metrics::{MetricName, Opts, Registry};
use weir_proxy::obs::server::{QueryResult, QueryType, ServerEvent, ServerMetrics};

const WRITERS: usize = 1000;

fn spawn_all<F>(n: usize, f: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let barrier = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let f = Arc::clone(&f);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                f(i);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn counter_has_no_lost_updates() {
    let registry = Registry::new();
    let m = ServerMetrics::register(&registry).unwrap();

    let writer = m.clone();
    spawn_all(WRITERS, move |_| {
        writer.record_query(QueryType::Query, QueryResult::Ok);
    });

    assert_eq!(m.query_total.get(["Query", "OK"]), WRITERS as u64);
    assert_eq!(m.query_total.len(), 1);
}

#[test]
fn concurrent_first_use_creates_one_instance() {
    let registry = Registry::new();
    let v = registry
        .counter_vec(Opts::new(MetricName::new("t", "race", "first_total"), "race"), ["type"])
        .unwrap();

    let handles = Arc::new(std::sync::Mutex::new(Vec::new()));
    let (w, collected) = (Arc::clone(&v), Arc::clone(&handles));
    spawn_all(64, move |_| {
        let c = w.with_label_values(["fresh"]);
        c.inc();
        collected.lock().unwrap().push(c);
    });

    let handles = handles.lock().unwrap();
    assert_eq!(v.len(), 1);
    assert!(handles.iter().all(|c| Arc::ptr_eq(c, &handles[0])));
    assert_eq!(v.get(["fresh"]), 64);
}

#[test]
fn gauge_nets_out_under_interleaving() {
    let registry = Registry::new();
    let m = ServerMetrics::register(&registry).unwrap();

    // Even writers open and keep a connection open; odd writers open and close.
    let writer = m.clone();
    let kept = Arc::new(std::sync::Mutex::new(Vec::new()));
    let keep = Arc::clone(&kept);
    spawn_all(WRITERS, move |i| {
        let guard = writer.connection_opened();
        if i % 2 == 0 {
            keep.lock().unwrap().push(guard);
        }
    });

    assert_eq!(m.connections.get(), (WRITERS / 2) as i64);
    kept.lock().unwrap().clear();
    assert_eq!(m.connections.get(), 0);
}

#[test]
fn histogram_counts_every_observation() {
    let registry = Registry::new();
    let m = ServerMetrics::register(&registry).unwrap();

    let writer = m.clone();
    spawn_all(WRITERS, move |i| {
        writer.observe_get_token(Duration::from_micros(i as u64));
    });

    let snap = m.get_token_duration.snapshot();
    assert_eq!(snap.count, WRITERS as u64);
    // i = 0 and i = 1 both land at or below the first bound (1us).
    assert_eq!(snap.buckets[0], (1.0, 2));
    assert_eq!(snap.buckets.last().unwrap().1, WRITERS as u64);
    let expected_sum: u64 = (0..WRITERS as u64).sum();
    assert_eq!(snap.sum, expected_sum as f64);
}

#[test]
fn mixed_labels_under_contention() {
    let registry = Registry::new();
    let m = ServerMetrics::register(&registry).unwrap();

    let writer = m.clone();
    spawn_all(WRITERS, move |i| {
        writer.record_event(ServerEvent::ALL[i % ServerEvent::ALL.len()]);
    });

    for ev in ServerEvent::ALL {
        assert_eq!(m.event.get([ev.as_str()]), (WRITERS / ServerEvent::ALL.len()) as u64);
    }
}
