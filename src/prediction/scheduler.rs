//! Conflict scheduling on a bounded worker pool
//!
//! Two phases run one after the other:
//!
//! 1. every candidate against main
//! 2. every unordered pair of candidates that merged cleanly into main
//!
//! Each phase spawns at most `concurrency` scoped worker threads. Workers claim
//! comparisons through an atomic counter and send each [`ConflictCheck`] over a
//! channel to the calling thread, which is the only one touching the report.
//! A phase returns only once every claimed comparison has been aggregated, so
//! phase 2 never starts before phase 1 has drained.

use super::context::{Event, Phase, RunContext};
use super::report::ConflictReport;
use super::store::{MergeSimulator, RefStore};
use super::{BranchRef, CandidateSet, ConflictCheck};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use tracing::debug;

/// One comparison waiting for a worker
#[derive(Debug, Clone, Copy)]
struct Job<'a> {
    source: &'a BranchRef,
    target: &'a BranchRef,
}

/// Runs merge simulations for a set of candidates
pub struct Scheduler<'a, S> {
    store: &'a S,
    concurrency: NonZeroUsize,
    ctx: &'a RunContext<'a>,
}

impl<'a, S> Scheduler<'a, S>
where
    S: RefStore + MergeSimulator,
{
    pub fn new(store: &'a S, concurrency: NonZeroUsize, ctx: &'a RunContext<'a>) -> Self {
        Self {
            store,
            concurrency,
            ctx,
        }
    }

    /// Check `candidates` against `main`, then against each other.
    ///
    /// `candidates` is only read from here on.
    pub fn run(&self, main: &BranchRef, candidates: &CandidateSet, report: &mut ConflictReport) {
        let against_main: Vec<Job<'_>> = candidates
            .values()
            .map(|target| Job {
                source: main,
                target,
            })
            .collect();

        self.run_phase(Phase::AgainstMain, &against_main, |check| {
            report.record_main(check)
        });

        if self.ctx.cancel.is_cancelled() {
            report.cancelled = true;
            return;
        }

        let clean: Vec<&BranchRef> = candidates
            .values()
            .filter(|branch| report.clean_against_main.contains(&branch.short))
            .collect();
        let pairs = unordered_pairs(&clean);

        self.run_phase(Phase::Pairwise, &pairs, |check| report.record_pair(check));

        if self.ctx.cancel.is_cancelled() {
            report.cancelled = true;
        }
    }

    /// Run `jobs` on the pool and hand every result to `aggregate`.
    fn run_phase<F>(&self, phase: Phase, jobs: &[Job<'_>], mut aggregate: F)
    where
        F: FnMut(&ConflictCheck),
    {
        self.ctx.emit(&Event::PhaseStarted {
            phase,
            comparisons: jobs.len(),
        });
        if jobs.is_empty() {
            return;
        }

        let workers = self.concurrency.get().min(jobs.len());
        let next_job = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<ConflictCheck>();
        debug!(%phase, workers, jobs = jobs.len(), "dispatching comparisons");

        std::thread::scope(|s| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next_job = &next_job;
                let cancel = &self.ctx.cancel;
                let store = self.store;
                s.spawn(move || {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let index = next_job.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = jobs.get(index) else {
                            break;
                        };
                        if tx.send(compare(store, job.source, job.target)).is_err() {
                            break;
                        }
                    }
                });
            }
            // Workers hold the only remaining senders; the loop ends when they exit
            drop(tx);

            for check in rx {
                aggregate(&check);
                self.ctx.emit(&Event::Checked {
                    phase,
                    check: &check,
                });
            }
        });
    }
}

/// Simulate merging `target` into `source`
fn compare<S>(store: &S, source: &BranchRef, target: &BranchRef) -> ConflictCheck
where
    S: RefStore + MergeSimulator + ?Sized,
{
    let result = store
        .merge_base(&[source, target])
        .and_then(|base| store.simulate(&base, &[source, target]));

    ConflictCheck {
        source: source.clone(),
        target: target.clone(),
        result,
    }
}

/// Every unordered pair of `branches`, each exactly once
fn unordered_pairs<'a>(branches: &[&'a BranchRef]) -> Vec<Job<'a>> {
    let mut pairs = Vec::with_capacity(branches.len() * branches.len().saturating_sub(1) / 2);
    for (i, &source) in branches.iter().enumerate() {
        for &target in &branches[i + 1..] {
            pairs.push(Job { source, target });
        }
    }
    pairs
}
