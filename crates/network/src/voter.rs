//! Quorum voting.
//!
//! The voter asks every topology member, in random order, for its view and
//! stops listening as soon as one side has enough votes:
//!
//! - `positive budget = round(N × trust)`: an approval takes one; going
//!   below zero latches an approved verdict
//! - `negative budget = round(N × 0.1) + 1`: any other state takes one;
//!   going below zero latches a rejected verdict
//!
//! Queries still in flight after the latch run to completion and are
//! ignored. If every query settles without a latch, the first query error
//! is raised, or else the last report received is returned.
//!
//! This is an honest-majority heuristic, not a Byzantine-tolerant protocol.
//! A hostile minority that happens to answer first can decide the outcome;
//! the voter accepts that in exchange for answering without waiting on the
//! whole network.

use crate::error::{NetworkError, Result};
use crate::state::StateReport;
use crossbeam::channel;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use umi_core::{RetryError, RetryPolicy, WorkerPool};

/// Share of the network whose disagreement is enough to reject.
pub const MINORITY_FRACTION: f64 = 0.1;

/// Reject trust levels outside `0.1..=0.9`.
pub fn check_trust(trust: f64) -> Result<()> {
    if (0.1..=0.9).contains(&trust) {
        Ok(())
    } else {
        Err(NetworkError::InvalidTrust(trust))
    }
}

enum Settled {
    Latched(StateReport),
    Counted(StateReport),
    Failed(NetworkError),
    Skipped,
}

/// Runs consensus rounds over a shared pool.
#[derive(Clone)]
pub struct ConsensusVoter {
    pool: WorkerPool,
    retry: RetryPolicy,
}

impl ConsensusVoter {
    pub fn new(pool: WorkerPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// Vote over `members` nodes. `query(i)` asks node `i`.
    ///
    /// The whole round is one retryable unit under the voter's policy;
    /// running out of attempts yields `ConsensusTimeout`.
    pub fn vote<F>(&self, members: usize, trust: f64, query: F) -> Result<StateReport>
    where
        F: Fn(usize) -> Result<StateReport> + Send + Sync + 'static,
    {
        check_trust(trust)?;
        if members == 0 {
            return Err(NetworkError::Protocol("no nodes to vote".into()));
        }
        let query = Arc::new(query);
        let pool = self.pool.clone();
        self.retry
            .run("consensus", move || {
                round(&pool, members, trust, Arc::clone(&query))
            })
            .map_err(|e| match e {
                RetryError::Failed { last, .. } => last,
                RetryError::TimedOut { attempts } | RetryError::Aborted { attempts } => {
                    NetworkError::ConsensusTimeout { attempts }
                }
            })
    }
}

fn budgets(members: usize, trust: f64) -> (i64, i64) {
    let n = members as f64;
    let positive = (n * trust).round() as i64;
    let negative = (n * MINORITY_FRACTION).round() as i64 + 1;
    (positive, negative)
}

fn round<F>(pool: &WorkerPool, members: usize, trust: f64, query: Arc<F>) -> Result<StateReport>
where
    F: Fn(usize) -> Result<StateReport> + Send + Sync + 'static,
{
    let (positive, negative) = budgets(members, trust);
    debug!(members, trust, positive, negative, "consensus round");
    let positive = Arc::new(AtomicI64::new(positive));
    let negative = Arc::new(AtomicI64::new(negative));
    let latched = Arc::new(AtomicBool::new(false));
    let (tx, rx) = channel::unbounded();

    let mut order: Vec<usize> = (0..members).collect();
    order.shuffle(&mut rand::thread_rng());
    for index in order {
        let query = Arc::clone(&query);
        let positive = Arc::clone(&positive);
        let negative = Arc::clone(&negative);
        let latched = Arc::clone(&latched);
        let tx = tx.clone();
        pool.execute(move || {
            if latched.load(Ordering::Acquire) {
                let _ = tx.send(Settled::Skipped);
                return;
            }
            let settled = match query(index) {
                Ok(report) => {
                    metrics::counter!("umi.consensus.votes").increment(1);
                    let budget = if report.is_approved() { &positive } else { &negative };
                    let left = budget.fetch_sub(1, Ordering::AcqRel) - 1;
                    trace!(node = index, state = %report.state, left, "vote");
                    if left < 0 && !latched.swap(true, Ordering::AcqRel) {
                        Settled::Latched(report)
                    } else {
                        Settled::Counted(report)
                    }
                }
                Err(e) => Settled::Failed(e),
            };
            let _ = tx.send(settled);
        });
    }
    drop(tx);

    let mut last = None;
    let mut failure = None;
    for settled in rx.iter().take(members) {
        match settled {
            Settled::Latched(report) => {
                debug!(state = %report.state, "consensus latched");
                return Ok(report);
            }
            Settled::Counted(report) => last = Some(report),
            Settled::Failed(e) => {
                failure.get_or_insert(e);
            }
            Settled::Skipped => {}
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }
    last.ok_or_else(|| NetworkError::Protocol("no node answered".into()))
}
