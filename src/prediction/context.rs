//! Per-run context: verbosity, progress events and cancellation

use super::error::PredictError;
use super::report::ConflictReport;
use super::{BranchRef, ConflictCheck};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Which scheduling phase a comparison belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Every candidate against main
    AgainstMain,
    /// Every pair of branches that merged cleanly into main
    Pairwise,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Phase::AgainstMain => write!(f, "against main"),
            Phase::Pairwise => write!(f, "pairwise"),
        }
    }
}

/// Something observable that happened during a run
#[derive(Debug)]
pub enum Event<'a> {
    /// Candidate is already an ancestor of main and was dropped
    AlreadyMerged { branch: &'a BranchRef, main: &'a BranchRef },

    /// Merge-base with main could not be computed for a candidate
    AncestryFailed { branch: &'a BranchRef, error: &'a PredictError },

    /// A phase is about to dispatch `comparisons` simulations
    PhaseStarted { phase: Phase, comparisons: usize },

    /// One comparison finished (successfully or not)
    Checked { phase: Phase, check: &'a ConflictCheck },

    /// Both phases drained (or the run was cancelled)
    Finished { report: &'a ConflictReport },
}

/// Receives events as the run progresses.
///
/// Events are emitted from the aggregating thread only, never from workers.
pub trait EventSink {
    fn emit(&self, event: &Event<'_>);
}

/// Sink that forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event<'_>) {
        match event {
            Event::AlreadyMerged { branch, .. } => {
                info!("{} is already merged. Consider deleting the branch", branch)
            }
            Event::AncestryFailed { branch, error } => {
                warn!(branch = %branch, "excluded from checks: {}", error)
            }
            Event::PhaseStarted { phase, comparisons } => {
                info!(%phase, "Inspecting {} branch combination(s)...", comparisons)
            }
            Event::Checked { check, .. } => match &check.result {
                Ok(merge) if merge.conflicts() > 0 => info!(
                    "{} conflicts with {} [{} conflict(s)]",
                    check.target,
                    check.source,
                    merge.conflicts()
                ),
                Ok(_) => {}
                Err(e) => warn!("unable to compare {} with {}: {}", check.source, check.target, e),
            },
            Event::Finished { report } => {
                let summary = report.summary();
                if summary.any_conflicts {
                    info!(
                        "Found {} branch(es) conflicting with {} and {} conflicting with each other",
                        summary.conflicting_with_main, report.main, summary.conflicting_with_each_other
                    );
                } else {
                    info!("No conflicting branches found");
                }
            }
        }
    }
}

/// Shared cancellation flag.
///
/// Cancelling stops workers from taking new comparisons; in-flight ones
/// finish and are still aggregated.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Explicit context handed to each stage instead of global logger state
pub struct RunContext<'a> {
    pub verbose: bool,
    pub cancel: CancelToken,
    sink: &'a dyn EventSink,
}

impl<'a> RunContext<'a> {
    pub fn new(sink: &'a dyn EventSink, verbose: bool) -> Self {
        Self {
            verbose,
            cancel: CancelToken::new(),
            sink,
        }
    }

    /// Context that only logs through `tracing`
    pub fn quiet() -> RunContext<'static> {
        static SINK: TracingSink = TracingSink;
        RunContext::new(&SINK, false)
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn emit(&self, event: &Event<'_>) {
        self.sink.emit(event);
    }
}
