//! In-memory repository for engine tests

use super::context::CancelToken;
use super::error::{PredictError, Result};
use super::store::{MergeSimulator, RefStore};
use super::{BranchRef, CommitInfo, MergeSimulation};
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub(crate) const MAIN_REF: &str = "refs/remotes/origin/master";
pub(crate) const USER_EMAIL: &str = "me@example.com";
pub(crate) const OTHER_EMAIL: &str = "someone@example.com";

#[derive(Default)]
pub(crate) struct FakeRepo {
    refs: Vec<BranchRef>,
    commits: HashMap<String, CommitInfo>,
    /// merge-base with main, by fully-qualified name
    bases: HashMap<String, String>,
    unrelated: HashSet<String>,
    /// conflict marker count per unordered pair of short names
    outcomes: HashMap<(String, String), usize>,
    failures: HashSet<(String, String)>,
    user_email: Option<String>,
    cancel_on_simulate: Option<CancelToken>,
    simulated: Mutex<Vec<(String, String)>>,
}

impl FakeRepo {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn main(self, target: &str) -> Self {
        self.add(MAIN_REF, target, target, USER_EMAIL, 0)
    }

    /// Fresh branch whose merge-base with main is `base`
    pub(crate) fn branch(self, name: &str, target: &str, base: &str) -> Self {
        self.add(name, target, base, USER_EMAIL, 0)
    }

    pub(crate) fn stale_branch(self, name: &str, target: &str, age_days: i64) -> Self {
        self.add(name, target, "base", USER_EMAIL, age_days)
    }

    pub(crate) fn authored_branch(self, name: &str, target: &str, email: &str) -> Self {
        self.add(name, target, "base", email, 0)
    }

    /// Branch sharing no history with anything else
    pub(crate) fn unrelated_branch(mut self, name: &str, target: &str) -> Self {
        self.unrelated.insert(name.to_string());
        self.add(name, target, "", USER_EMAIL, 0)
    }

    pub(crate) fn user(mut self, email: &str) -> Self {
        self.user_email = Some(email.to_string());
        self
    }

    pub(crate) fn simulate(mut self, a: &str, b: &str, conflicts: usize) -> Self {
        self.outcomes.insert(pair(a, b), conflicts);
        self
    }

    pub(crate) fn failing_simulation(mut self, a: &str, b: &str) -> Self {
        self.failures.insert(pair(a, b));
        self
    }

    /// Trip `token` from inside the first simulation
    pub(crate) fn cancel_on_first_simulation(mut self, token: CancelToken) -> Self {
        self.cancel_on_simulate = Some(token);
        self
    }

    pub(crate) fn references_now(&self) -> Vec<BranchRef> {
        self.refs.clone()
    }

    /// (source, target) short names of every simulation, in call order
    pub(crate) fn simulated_pairs(&self) -> Vec<(String, String)> {
        self.simulated.lock().unwrap().clone()
    }

    fn add(mut self, name: &str, target: &str, base: &str, email: &str, age_days: i64) -> Self {
        let branch = BranchRef::from_name(name, target).expect("branch reference name");
        self.commits.insert(
            target.to_string(),
            CommitInfo {
                hash: target.to_string(),
                author_email: email.to_string(),
                author_time: Utc::now() - Duration::days(age_days) - Duration::hours(1),
            },
        );
        self.bases.insert(name.to_string(), base.to_string());
        self.refs.push(branch);
        self
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl RefStore for FakeRepo {
    fn references(&self) -> Result<Vec<BranchRef>> {
        Ok(self.refs.clone())
    }

    fn commit(&self, hash: &str) -> Result<CommitInfo> {
        self.commits
            .get(hash)
            .cloned()
            .ok_or_else(|| PredictError::GitOperation(format!("unknown commit {hash}")))
    }

    fn merge_base(&self, refs: &[&BranchRef]) -> Result<String> {
        let [a, b] = refs else {
            return Err(PredictError::GitOperation("expected two refs".into()));
        };
        if self.unrelated.contains(&a.name) || self.unrelated.contains(&b.name) {
            return Err(PredictError::NoCommonAncestor {
                left: a.short.clone(),
                right: b.short.clone(),
            });
        }

        let base = if a.name == MAIN_REF {
            self.bases.get(&b.name)
        } else if b.name == MAIN_REF {
            self.bases.get(&a.name)
        } else {
            None
        };
        Ok(base.cloned().unwrap_or_else(|| "base".to_string()))
    }

    fn user_email(&self) -> Option<String> {
        self.user_email.clone()
    }
}

impl MergeSimulator for FakeRepo {
    fn simulate(&self, _base: &str, refs: &[&BranchRef]) -> Result<MergeSimulation> {
        let [a, b] = refs else {
            return Err(PredictError::Simulation("expected two refs".into()));
        };
        self.simulated
            .lock()
            .unwrap()
            .push((a.short.clone(), b.short.clone()));
        if let Some(token) = &self.cancel_on_simulate {
            token.cancel();
        }

        let key = pair(&a.short, &b.short);
        if self.failures.contains(&key) {
            return Err(PredictError::Simulation("merge-tree exited with 128".into()));
        }
        let conflicts = self.outcomes.get(&key).copied().unwrap_or(0);
        Ok(MergeSimulation {
            conflicting_files: (0..conflicts).map(|i| format!("src/file{i}.rs")).collect(),
            markers: conflicts,
        })
    }
}
