//! Consensus and client tests.
//!
//! # Test Strategy
//!
//! 1. **Latching**: verdicts latch without waiting on slow nodes
//! 2. **Settling**: rounds without a latch surface errors or the last report
//! 3. **Client**: connection cache, random selection, submissions

mod common;

use common::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use umi_core::{RetryPolicy, WorkerPool};
use umi_network::{NetworkClient, NetworkError, StateReport, Topology};

const SLOW: Duration = Duration::from_secs(3);

fn script(network: &FakeNetwork, numbers: impl IntoIterator<Item = u32>, answer: Answer) {
    for n in numbers {
        *network.node(n).state.lock() = Arc::clone(&answer);
    }
}

// ============================================================================
// Latching
// ============================================================================

// N=100, trust 0.3: positive budget 30, negative budget 11. A verdict
// latches when its budget goes below zero.

#[test]
fn test_positive_latch_on_thirty_first_approval() {
    let network = Arc::new(FakeNetwork::with_nodes(100));
    script(&network, 1..=31, answer("APPROVED", Duration::ZERO));
    script(&network, 32..=100, answer("DECLINED", SLOW));
    let client = client_for(Arc::clone(&network), test_config());

    let started = Instant::now();
    let state = client.get_state(&item(), 0.3).unwrap();
    assert!(state.is_approved());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_thirty_approvals_do_not_latch() {
    let network = Arc::new(FakeNetwork::with_nodes(100));
    script(&network, 1..=30, answer("APPROVED", Duration::ZERO));
    script(&network, 31..=100, answer("DECLINED", SLOW));
    let client = client_for(network, test_config());

    let started = Instant::now();
    let state = client.get_state(&item(), 0.3).unwrap();
    assert_eq!(state.state, "DECLINED");
    assert!(started.elapsed() >= SLOW);
}

#[test]
fn test_negative_latch_on_twelfth_rejection() {
    let network = Arc::new(FakeNetwork::with_nodes(100));
    script(&network, 1..=12, answer("DECLINED", Duration::ZERO));
    script(&network, 13..=100, answer("APPROVED", SLOW));
    let client = client_for(network, test_config());

    let started = Instant::now();
    assert!(!client.approval_check(&item(), 0.3).unwrap());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_eleven_rejections_do_not_latch() {
    let network = Arc::new(FakeNetwork::with_nodes(100));
    script(&network, 1..=11, answer("DECLINED", Duration::ZERO));
    script(&network, 12..=100, answer("APPROVED", SLOW));
    let client = client_for(network, test_config());

    let started = Instant::now();
    assert!(client.approval_check(&item(), 0.3).unwrap());
    assert!(started.elapsed() >= SLOW);
}

#[test]
fn test_latch_from_warm_pool() {
    let network = Arc::new(FakeNetwork::with_nodes(100));
    script(&network, 1..=35, answer("APPROVED", Duration::ZERO));
    script(&network, 36..=100, answer("DECLINED", SLOW));
    let config = test_config();
    let pool = WorkerPool::new(config.pool.clone());
    let _ = pool.map(vec![()], |_| ());
    let client = NetworkClient::from_topology(
        Topology::new("testnet", network.infos()),
        network,
        pool,
        config,
    );

    let started = Instant::now();
    let state = client.get_state(&item(), 0.3).unwrap();
    assert!(state.is_approved());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_locked_counts_as_approved() {
    let network = Arc::new(FakeNetwork::with_nodes(10));
    script(&network, 1..=10, answer("LOCKED", Duration::ZERO));
    let client = client_for(network, test_config());
    assert!(client.approval_check(&item(), 0.5).unwrap());
}

// ============================================================================
// Settling
// ============================================================================

#[test]
fn test_error_surfaces_when_nothing_latches() {
    // N=10, trust 0.9: positive budget 9, negative budget 2
    let network = Arc::new(FakeNetwork::with_nodes(10));
    script(&network, 1..=8, answer("APPROVED", Duration::ZERO));
    script(&network, [9], answer("DECLINED", Duration::ZERO));
    script(&network, [10], failing("http://10.0.0.10:8080"));
    let client = client_for(network, test_config());

    assert!(matches!(
        client.get_state(&item(), 0.9),
        Err(NetworkError::Transport { .. })
    ));
}

#[test]
fn test_last_report_returned_when_nothing_latches() {
    let network = Arc::new(FakeNetwork::with_nodes(10));
    // N=10, trust 0.9: eight approvals and two rejections latch nothing
    script(&network, 1..=8, answer("APPROVED", Duration::ZERO));
    script(&network, [9], answer("DECLINED", Duration::ZERO));
    script(&network, [10], answer("PENDING_POSITIVE", Duration::from_millis(300)));
    let client = client_for(network, test_config());

    let state = client.get_state(&item(), 0.9).unwrap();
    assert_eq!(state.state, "PENDING_POSITIVE");
}

#[test]
fn test_slow_round_times_out() {
    let network = Arc::new(FakeNetwork::with_nodes(5));
    script(&network, 1..=5, answer("APPROVED", Duration::from_millis(500)));
    let config = test_config().with_consensus_retry(RetryPolicy::new(Duration::from_millis(100), 2));
    let client = client_for(network, config);

    assert_eq!(
        client.get_state(&item(), 0.5).unwrap_err(),
        NetworkError::ConsensusTimeout { attempts: 2 }
    );
}

#[test]
fn test_invalid_trust_queries_nobody() {
    let network = Arc::new(FakeNetwork::with_nodes(5));
    let client = client_for(Arc::clone(&network), test_config());

    assert_eq!(
        client.get_state(&item(), 0.95).unwrap_err(),
        NetworkError::InvalidTrust(0.95)
    );
    assert!(client.approval_check(&item(), 0.05).is_err());
    let asked: usize = network
        .nodes
        .values()
        .map(|n| n.state_calls.load(Ordering::SeqCst))
        .sum();
    assert_eq!(asked, 0);
}

// ============================================================================
// Client
// ============================================================================

#[test]
fn test_connections_are_lazy_and_cached() {
    let network = Arc::new(FakeNetwork::with_nodes(10));
    let client = client_for(Arc::clone(&network), test_config());
    assert_eq!(network.connects.load(Ordering::SeqCst), 0);

    let first = client.connection(3).unwrap();
    let again = client.connection(3).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(network.connects.load(Ordering::SeqCst), 1);
    assert_eq!(first.url(), "http://10.0.0.4:8080");

    assert_eq!(first.node_number().unwrap(), 4);
    assert_eq!(first.node_number().unwrap(), 4);
    assert_eq!(network.node(4).number_calls.load(Ordering::SeqCst), 1);
    assert!(first.ping().unwrap());
    assert_eq!(first.ping_node(2, Duration::from_secs(1)).unwrap().tcp_ms, 3);

    assert_eq!(
        client.connection(10).unwrap_err(),
        NetworkError::IndexOutOfRange { index: 10, size: 10 }
    );
}

#[test]
fn test_random_connections_do_not_repeat() {
    let network = Arc::new(FakeNetwork::with_nodes(10));
    let client = client_for(network, test_config());

    let picked = client.random_connections(6).unwrap();
    let urls: HashSet<_> = picked.iter().map(|c| c.url().to_string()).collect();
    assert_eq!(urls.len(), 6);

    assert_eq!(client.random_connections(50).unwrap().len(), 10);
    assert!(client.random_connection().is_ok());
}

#[test]
fn test_register_single_retries_on_another_node() {
    let network = Arc::new(FakeNetwork::with_nodes(5));
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let flaky: Answer = Arc::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(NetworkError::Protocol("node busy".into()))
        } else {
            Ok(StateReport::new("APPROVED"))
        }
    });
    for node in network.nodes.values() {
        *node.register.lock() = Arc::clone(&flaky);
    }
    let mut config = test_config();
    config.register_timeout_ms = 3_000;
    let client = client_for(network, config);

    let state = client.register_single(b"sealed").unwrap();
    assert!(state.is_approved());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn test_register_single_gives_up() {
    let network = Arc::new(FakeNetwork::with_nodes(3));
    for node in network.nodes.values() {
        *node.register.lock() = failing(&node.info.url);
    }
    let mut config = test_config();
    config.register_timeout_ms = 3_000;
    let client = client_for(network, config);

    assert!(matches!(
        client.register_single(b"sealed"),
        Err(NetworkError::Transport { .. })
    ));
}

#[test]
fn test_register_consensus_polls_while_pending() {
    let network = Arc::new(FakeNetwork::with_nodes(5));
    let mut config = test_config();
    config.pending_poll_interval_ms = 10;
    let client = client_for(Arc::clone(&network), config);

    // registered nodes answer PENDING_POSITIVE, the network already approves
    let state = client.register_consensus(b"sealed", &item(), 0.5).unwrap();
    assert_eq!(state.state, "APPROVED");
}

#[test]
fn test_register_consensus_returns_submission_errors() {
    let network = Arc::new(FakeNetwork::with_nodes(3));
    let rejected: Answer = Arc::new(|| {
        Ok(StateReport::new("UNDEFINED").with_errors(vec!["BADVALUE: expired".into()]))
    });
    for node in network.nodes.values() {
        *node.register.lock() = Arc::clone(&rejected);
    }
    let client = client_for(Arc::clone(&network), test_config());

    let state = client.register_consensus(b"sealed", &item(), 0.5).unwrap();
    assert!(state.has_errors());
    let asked: usize = network
        .nodes
        .values()
        .map(|n| n.state_calls.load(Ordering::SeqCst))
        .sum();
    assert_eq!(asked, 0);
}
