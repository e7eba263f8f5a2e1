//! Merge reduction: drop candidates that main already contains

use super::error::PredictError;
use super::store::RefStore;
use super::{BranchRef, CandidateSet};
use tracing::debug;

/// Candidates left after reduction, plus what was removed and why
#[derive(Debug, Default)]
pub struct Reduction {
    pub candidates: CandidateSet,
    /// Branches that are ancestors of main
    pub merged: Vec<BranchRef>,
    /// Branches whose merge-base with main could not be computed
    pub failed: Vec<(BranchRef, PredictError)>,
}

/// Remove every candidate whose merge-base with `main` is its own tip.
///
/// Each candidate is decided on its own, so the outcome does not depend on
/// iteration order. The input set is consumed and a new one is built rather
/// than deleting while iterating.
pub fn reduce<S: RefStore + ?Sized>(
    store: &S,
    main: &BranchRef,
    candidates: CandidateSet,
) -> Reduction {
    let mut reduction = Reduction::default();

    for (name, branch) in candidates {
        if branch.name == main.name {
            continue;
        }

        match store.merge_base(&[&branch, main]) {
            Ok(base) if base == branch.target => {
                debug!(branch = %branch, "already merged into {}", main);
                reduction.merged.push(branch);
            }
            Ok(_) => {
                reduction.candidates.insert(name, branch);
            }
            Err(e) => reduction.failed.push((branch, e)),
        }
    }

    reduction
}
