//! Result aggregation
//!
//! Every comparison outcome is folded into a [`ConflictReport`] with set
//! unions, so the final report does not depend on the order in which
//! workers finish, and recording the same outcome twice changes nothing.

use super::error::PredictError;
use super::{BranchRef, ConflictCheck, MergeSimulation};
use serde::Serialize;
use std::collections::BTreeSet;

/// A comparison that produced conflicts
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PairConflict {
    pub left: String,
    pub right: String,
    /// Conflict markers the merge would leave behind
    pub conflicts: usize,
    pub conflicting_files: Vec<String>,
}

/// A comparison (or candidate) that could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FailedCheck {
    pub source: String,
    pub target: String,
    pub reason: String,
}

/// Everything a run found out, keyed by short branch name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    /// Short name of the main branch
    pub main: String,
    pub conflicts_with_main: BTreeSet<String>,
    /// Branches that merge cleanly into main and were checked pairwise
    pub clean_against_main: BTreeSet<String>,
    pub conflicts_with_each_other: BTreeSet<String>,
    /// Detail for every conflicting comparison, main included
    pub conflicts: BTreeSet<PairConflict>,
    /// Branches already contained in main
    pub already_merged: BTreeSet<String>,
    pub failed: BTreeSet<FailedCheck>,
    /// Number of conflicting comparisons across both phases
    pub total_conflicts: usize,
    pub pairs_checked: usize,
    /// Set when the run stopped early; the recorded outcomes are still valid
    pub cancelled: bool,
}

/// Headline numbers of a finished report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub conflicting_with_main: usize,
    pub clean_against_main: usize,
    pub conflicting_with_each_other: usize,
    pub failed: usize,
    pub total_conflicts: usize,
    pub any_conflicts: bool,
}

impl ConflictReport {
    pub fn new(main: &BranchRef) -> Self {
        Self {
            main: main.short.clone(),
            ..Self::default()
        }
    }

    /// Fold in the result of comparing a candidate against main
    pub fn record_main(&mut self, check: &ConflictCheck) {
        let branch = &check.target.short;
        match &check.result {
            Ok(merge) if merge.conflicts() > 0 => {
                self.clean_against_main.remove(branch);
                self.conflicts_with_main.insert(branch.clone());
                self.add_conflict(&check.source.short, branch, merge);
            }
            Ok(_) => {
                if !self.conflicts_with_main.contains(branch) {
                    self.clean_against_main.insert(branch.clone());
                }
            }
            Err(e) => self.record_failure(&check.source, &check.target, e),
        }
    }

    /// Fold in the result of comparing two branches that are clean against main
    pub fn record_pair(&mut self, check: &ConflictCheck) {
        self.pairs_checked += 1;
        match &check.result {
            Ok(merge) if merge.conflicts() > 0 => {
                self.conflicts_with_each_other.insert(check.source.short.clone());
                self.conflicts_with_each_other.insert(check.target.short.clone());
                self.add_conflict(&check.source.short, &check.target.short, merge);
            }
            Ok(_) => {}
            Err(e) => self.record_failure(&check.source, &check.target, e),
        }
    }

    pub fn record_merged(&mut self, branch: &BranchRef) {
        self.already_merged.insert(branch.short.clone());
    }

    pub fn record_failure(&mut self, source: &BranchRef, target: &BranchRef, error: &PredictError) {
        self.failed.insert(FailedCheck {
            source: source.short.clone(),
            target: target.short.clone(),
            reason: error.to_string(),
        });
    }

    pub fn summary(&self) -> Summary {
        Summary {
            conflicting_with_main: self.conflicts_with_main.len(),
            clean_against_main: self.clean_against_main.len(),
            conflicting_with_each_other: self.conflicts_with_each_other.len(),
            failed: self.failed.len(),
            total_conflicts: self.total_conflicts,
            any_conflicts: self.total_conflicts > 0,
        }
    }

    fn add_conflict(&mut self, a: &str, b: &str, merge: &MergeSimulation) {
        let (left, right) = if a <= b { (a, b) } else { (b, a) };
        let inserted = self.conflicts.insert(PairConflict {
            left: left.to_string(),
            right: right.to_string(),
            conflicts: merge.conflicts(),
            conflicting_files: merge.conflicting_files.clone(),
        });
        if inserted {
            self.total_conflicts += 1;
        }
    }
}
