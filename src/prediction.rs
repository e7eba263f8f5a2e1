//! Conflict prediction engine
//!
//! Predicts which branches would conflict if merged, without merging anything.
//! A run flows through four stages:
//!
//! 1. [`selector`] narrows all branch references down to recent candidates
//! 2. [`reducer`] drops candidates that are already merged into main
//! 3. [`scheduler`] simulates merges against main, then pairwise among the
//!    branches that merged cleanly, on a bounded worker pool
//! 4. [`report`] aggregates every outcome into a [`ConflictReport`]
//!
//! Repository access sits behind the [`RefStore`] and [`MergeSimulator`] traits;
//! [`GitRepository`] implements both with gix.

mod context;
mod error;
pub mod reducer;
mod report;
pub mod scheduler;
pub mod selector;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{CancelToken, Event, EventSink, Phase, RunContext, TracingSink};
pub use error::{PredictError, Result as PredictResult};
pub use report::{ConflictReport, FailedCheck, PairConflict, Summary};
pub use store::{GitRepository, MergeSimulator, RefStore};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use error::Result;

/// Prefix of local branch references
pub(crate) const LOCAL_PREFIX: &str = "refs/heads/";

/// Prefix of remote-tracking branch references
pub(crate) const REMOTE_PREFIX: &str = "refs/remotes/";

/// Name of a remote's symbolic default-branch pointer
pub(crate) const SYMBOLIC_HEAD: &str = "HEAD";

/// A local or remote-tracking branch as read from the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    /// Fully-qualified name (e.g. "refs/remotes/origin/feature-a")
    pub name: String,

    /// Display name (e.g. "origin/feature-a")
    pub short: String,

    /// Hex id of the commit the branch points at
    pub target: String,

    pub scope: Scope,

    pub kind: Kind,
}

impl BranchRef {
    /// Classify a fully-qualified reference name.
    ///
    /// Returns `None` for anything that is not a local or remote-tracking
    /// branch (tags, notes, stash, ...).
    pub fn from_name(name: &str, target: impl Into<String>) -> Option<Self> {
        let (short, scope) = if let Some(short) = name.strip_prefix(LOCAL_PREFIX) {
            (short, Scope::Local)
        } else if let Some(short) = name.strip_prefix(REMOTE_PREFIX) {
            (short, Scope::Remote)
        } else {
            return None;
        };

        if short.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            short: short.to_string(),
            target: target.into(),
            scope,
            kind: Kind::Branch,
        })
    }

    /// Whether this is a remote's symbolic HEAD (e.g. "refs/remotes/origin/HEAD")
    pub fn is_symbolic_head(&self) -> bool {
        self.scope == Scope::Remote && self.short.rsplit('/').next() == Some(SYMBOLIC_HEAD)
    }
}

impl std::fmt::Display for BranchRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.short)
    }
}

/// Where a branch lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Local,
    Remote,
}

/// Role of a branch in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Branch,
    Main,
}

/// Commit metadata used for filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub author_email: String,
    pub author_time: DateTime<Utc>,
}

/// Candidate branches keyed by fully-qualified name
pub type CandidateSet = BTreeMap<String, BranchRef>;

/// Outcome of one simulated merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSimulation {
    /// Paths that could not be merged automatically
    pub conflicting_files: Vec<String>,

    /// Conflict markers (`<<<<<<<`) across the merged files
    pub markers: usize,
}

impl MergeSimulation {
    /// Number of conflicts the merge would produce
    pub fn conflicts(&self) -> usize {
        self.markers
    }
}

/// One comparison between two branches, carried from a worker to the aggregator
#[derive(Debug)]
pub struct ConflictCheck {
    pub source: BranchRef,
    pub target: BranchRef,
    pub result: Result<MergeSimulation>,
}

/// Everything the engine needs to know about a run
#[derive(Debug, Clone)]
pub struct PredictOptions {
    /// Only branches with an author timestamp newer than `now - window` are inspected
    pub window: chrono::Duration,

    /// Remote whose tracking branches are inspected and which holds main
    pub remote: String,

    /// Short name of the main branch on `remote`
    pub main: String,

    /// Only inspect branches whose tip was authored by the current user
    pub mine: bool,

    /// Only inspect branches whose short name matches
    pub filter: Option<Regex>,

    /// Discard remote-tracking candidates
    pub local_only: bool,

    /// Maximum number of merge simulations running at once
    pub concurrency: NonZeroUsize,
}

/// Run a full prediction against `store`.
///
/// Fatal errors (missing main branch, unknown identity, unreadable
/// references) are returned as `Err`; everything else ends up in the report.
pub fn predict<S>(store: &S, options: &PredictOptions, ctx: &RunContext<'_>) -> Result<ConflictReport>
where
    S: RefStore + MergeSimulator,
{
    let author = if options.mine {
        Some(store.user_email().ok_or(PredictError::UnknownIdentity)?)
    } else {
        None
    };

    let criteria = selector::Criteria {
        window: options.window,
        author: author.as_deref(),
        filter: options.filter.as_ref(),
        remote: &options.remote,
        main: &options.main,
    };
    let selection = selector::select(store, &criteria, Utc::now())?;
    let main = selection.main.clone();
    let candidates = selection.into_candidates(options.local_only);

    let reduction = reducer::reduce(store, &main, candidates);

    let mut report = ConflictReport::new(&main);
    for branch in &reduction.merged {
        ctx.emit(&Event::AlreadyMerged {
            branch,
            main: &main,
        });
        report.record_merged(branch);
    }
    for (branch, error) in &reduction.failed {
        ctx.emit(&Event::AncestryFailed { branch, error });
        report.record_failure(&main, branch, error);
    }

    scheduler::Scheduler::new(store, options.concurrency, ctx).run(
        &main,
        &reduction.candidates,
        &mut report,
    );

    ctx.emit(&Event::Finished { report: &report });
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::testing::{self, FakeRepo};
    use super::*;

    fn options() -> PredictOptions {
        PredictOptions {
            window: chrono::Duration::days(7),
            remote: "origin".into(),
            main: "master".into(),
            mine: false,
            filter: None,
            local_only: false,
            concurrency: NonZeroUsize::new(4).unwrap(),
        }
    }

    #[test]
    fn classifies_reference_names() {
        let local = BranchRef::from_name("refs/heads/feature/auth", "a1").unwrap();
        assert_eq!(local.short, "feature/auth");
        assert_eq!(local.scope, Scope::Local);

        let remote = BranchRef::from_name("refs/remotes/origin/HEAD", "a1").unwrap();
        assert_eq!(remote.short, "origin/HEAD");
        assert!(remote.is_symbolic_head());

        assert!(BranchRef::from_name("refs/tags/v1.0", "a1").is_none());
        assert!(BranchRef::from_name("refs/heads/", "a1").is_none());
    }

    #[test]
    fn mine_keeps_only_branches_by_current_user() {
        let repo = FakeRepo::new()
            .main("m1")
            .user(testing::USER_EMAIL)
            .branch("refs/heads/mine", "a1", "base")
            .authored_branch("refs/heads/theirs", "b1", testing::OTHER_EMAIL);
        let options = PredictOptions {
            mine: true,
            ..options()
        };

        let report = predict(&repo, &options, &RunContext::quiet()).unwrap();

        assert!(report.clean_against_main.contains("mine"));
        assert!(!report.clean_against_main.contains("theirs"));
    }

    #[test]
    fn clean_branch_is_clean_against_main() {
        let repo = FakeRepo::new()
            .main("m1")
            .branch("refs/remotes/origin/feature-a", "a1", "base")
            .simulate("origin/master", "origin/feature-a", 0);

        let report = predict(&repo, &options(), &RunContext::quiet()).unwrap();

        assert!(report.clean_against_main.contains("origin/feature-a"));
        assert!(!report.conflicts_with_main.contains("origin/feature-a"));
        assert_eq!(report.total_conflicts, 0);
    }

    #[test]
    fn conflicting_branch_is_excluded_from_pairwise_phase() {
        let repo = FakeRepo::new()
            .main("m1")
            .branch("refs/remotes/origin/feature-b", "b1", "base")
            .branch("refs/remotes/origin/feature-a", "a1", "base")
            .simulate("origin/master", "origin/feature-b", 2)
            .simulate("origin/master", "origin/feature-a", 0);

        let report = predict(&repo, &options(), &RunContext::quiet()).unwrap();

        assert!(report.conflicts_with_main.contains("origin/feature-b"));
        assert!(!report.clean_against_main.contains("origin/feature-b"));
        assert_eq!(report.pairs_checked, 0);
        assert!(repo.simulated_pairs().iter().all(|(a, _)| a == "origin/master"));
    }

    #[test]
    fn same_short_name_in_both_scopes_stays_two_branches() {
        let repo = FakeRepo::new()
            .main("m1")
            .branch("refs/heads/origin/feature", "a1", "base")
            .branch("refs/remotes/origin/feature", "b1", "base")
            .simulate("origin/master", "origin/feature", 2)
            .simulate("heads/origin/feature", "origin/master", 0);

        let report = predict(&repo, &options(), &RunContext::quiet()).unwrap();

        assert_eq!(
            report.conflicts_with_main.iter().collect::<Vec<_>>(),
            ["origin/feature"]
        );
        assert_eq!(
            report.clean_against_main.iter().collect::<Vec<_>>(),
            ["heads/origin/feature"]
        );
        assert_eq!(report.pairs_checked, 0);
    }

    #[test]
    fn pairwise_conflict_marks_both_branches() {
        let repo = FakeRepo::new()
            .main("m1")
            .branch("refs/remotes/origin/feature-a", "a1", "base")
            .branch("refs/remotes/origin/feature-c", "c1", "base")
            .simulate("origin/master", "origin/feature-a", 0)
            .simulate("origin/master", "origin/feature-c", 0)
            .simulate("origin/feature-a", "origin/feature-c", 1);

        let report = predict(&repo, &options(), &RunContext::quiet()).unwrap();

        assert!(report.conflicts_with_each_other.contains("origin/feature-a"));
        assert!(report.conflicts_with_each_other.contains("origin/feature-c"));
        assert!(report.total_conflicts >= 1);
        assert!(report.summary().any_conflicts);
    }

    #[test]
    fn merged_branch_is_never_simulated() {
        let repo = FakeRepo::new()
            .main("m1")
            .branch("refs/remotes/origin/old-feature", "o1", "o1");

        let report = predict(&repo, &options(), &RunContext::quiet()).unwrap();

        assert!(report.already_merged.contains("origin/old-feature"));
        assert!(repo.simulated_pairs().is_empty());
        assert!(report.clean_against_main.is_empty());
        assert!(report.conflicts_with_main.is_empty());
    }

    #[test]
    fn unrelated_history_is_absent_from_all_sets() {
        let repo = FakeRepo::new()
            .main("m1")
            .unrelated_branch("refs/remotes/origin/orphan", "x1");

        let report = predict(&repo, &options(), &RunContext::quiet()).unwrap();

        assert!(!report.clean_against_main.contains("origin/orphan"));
        assert!(!report.conflicts_with_main.contains("origin/orphan"));
        assert!(!report.conflicts_with_each_other.contains("origin/orphan"));
        assert_eq!(report.failed.len(), 1);
        assert!(repo.simulated_pairs().is_empty());
    }

    #[test]
    fn empty_candidate_set_yields_empty_report() {
        let repo = FakeRepo::new().main("m1");

        let report = predict(&repo, &options(), &RunContext::quiet()).unwrap();
        let summary = report.summary();

        assert_eq!(summary.conflicting_with_main, 0);
        assert_eq!(report.pairs_checked, 0);
        assert!(!summary.any_conflicts);
        assert!(repo.simulated_pairs().is_empty());
    }

    #[test]
    fn missing_main_branch_is_fatal() {
        let repo = FakeRepo::new().branch("refs/heads/feature-a", "a1", "base");

        let err = predict(&repo, &options(), &RunContext::quiet()).unwrap_err();
        assert!(matches!(err, PredictError::MainBranchNotFound { .. }));
    }

    #[test]
    fn mine_without_identity_is_fatal() {
        let repo = FakeRepo::new().main("m1");
        let options = PredictOptions {
            mine: true,
            ..options()
        };

        let err = predict(&repo, &options, &RunContext::quiet()).unwrap_err();
        assert!(matches!(err, PredictError::UnknownIdentity));
    }

    #[test]
    fn repeated_runs_produce_identical_reports() {
        let repo = FakeRepo::new()
            .main("m1")
            .branch("refs/remotes/origin/a", "a1", "base")
            .branch("refs/remotes/origin/b", "b1", "base")
            .branch("refs/remotes/origin/c", "c1", "base")
            .branch("refs/remotes/origin/d", "d1", "base")
            .simulate("origin/master", "origin/d", 3)
            .simulate("origin/a", "origin/c", 1);

        let first = predict(&repo, &options(), &RunContext::quiet()).unwrap();
        let second = predict(&repo, &options(), &RunContext::quiet()).unwrap();

        assert_eq!(first, second);
    }
}
