//! Branch selection: narrow all references down to candidates worth checking

use super::error::{PredictError, Result};
use super::store::RefStore;
use super::{BranchRef, CandidateSet, Kind, REMOTE_PREFIX, Scope};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

/// Filters applied to every reference
#[derive(Debug, Clone)]
pub struct Criteria<'a> {
    /// Maximum age of a branch's tip commit
    pub window: chrono::Duration,
    /// Required author email of the tip commit
    pub author: Option<&'a str>,
    /// Required match on the short branch name
    pub filter: Option<&'a Regex>,
    pub remote: &'a str,
    pub main: &'a str,
}

impl Criteria<'_> {
    fn main_ref_name(&self) -> String {
        format!("{REMOTE_PREFIX}{}/{}", self.remote, self.main)
    }

    fn remote_prefix(&self) -> String {
        format!("{REMOTE_PREFIX}{}/", self.remote)
    }
}

/// Main branch plus the candidates that passed the filters
#[derive(Debug, Clone)]
pub struct Selection {
    pub main: BranchRef,
    pub local: CandidateSet,
    pub remote: CandidateSet,
}

impl Selection {
    /// Combine local and remote candidates, dropping remotes in local-only mode
    pub fn into_candidates(self, local_only: bool) -> CandidateSet {
        let mut candidates = self.local;
        if !local_only {
            candidates.extend(self.remote);
        }
        candidates
    }
}

/// Read all branches from `store` and keep the ones matching `criteria`.
///
/// The main branch is `refs/remotes/<remote>/<main>`, falling back to
/// `refs/heads/<main>` for repositories without that remote. Not finding
/// either is fatal.
pub fn select<S: RefStore + ?Sized>(
    store: &S,
    criteria: &Criteria<'_>,
    now: DateTime<Utc>,
) -> Result<Selection> {
    let mut references = store.references()?;
    let main_name = criteria.main_ref_name();

    let main = references
        .iter()
        .find(|r| r.name == main_name)
        .or_else(|| {
            references
                .iter()
                .find(|r| r.scope == Scope::Local && r.short == criteria.main)
        })
        .cloned()
        .map(|mut main| {
            main.kind = Kind::Main;
            main
        })
        .ok_or(PredictError::MainBranchNotFound { name: main_name })?;
    disambiguate(&mut references);

    let remote_prefix = criteria.remote_prefix();
    let mut local = CandidateSet::new();
    let mut remote = CandidateSet::new();

    for reference in references {
        if reference.name == main.name {
            continue;
        }
        if reference.scope == Scope::Remote
            && (!reference.name.starts_with(&remote_prefix) || reference.is_symbolic_head())
        {
            continue;
        }
        if !matches(store, &reference, criteria, now) {
            continue;
        }

        match reference.scope {
            Scope::Local => local.insert(reference.name.clone(), reference),
            Scope::Remote => remote.insert(reference.name.clone(), reference),
        };
    }

    debug!(
        local = local.len(),
        remote = remote.len(),
        "selected candidate branches"
    );
    Ok(Selection {
        main,
        local,
        remote,
    })
}

/// Rename local branches whose short name is also a remote-tracking branch's
/// (`refs/heads/origin/x` next to `refs/remotes/origin/x`) to `heads/<name>`,
/// the way git abbreviates ambiguous refs. Reports are keyed by short name.
fn disambiguate(references: &mut [BranchRef]) {
    let remote: BTreeSet<String> = references
        .iter()
        .filter(|r| r.scope == Scope::Remote)
        .map(|r| r.short.clone())
        .collect();

    for reference in references
        .iter_mut()
        .filter(|r| r.scope == Scope::Local && remote.contains(&r.short))
    {
        reference.short = format!("heads/{}", reference.short);
    }
}

fn matches<S: RefStore + ?Sized>(
    store: &S,
    reference: &BranchRef,
    criteria: &Criteria<'_>,
    now: DateTime<Utc>,
) -> bool {
    if let Some(filter) = criteria.filter
        && !filter.is_match(&reference.short)
    {
        return false;
    }

    // Branches whose tip cannot be read are skipped rather than failing the run
    let commit = match store.commit(&reference.target) {
        Ok(commit) => commit,
        Err(e) => {
            debug!(branch = %reference, error = %e, "skipping branch without readable commit");
            return false;
        }
    };

    if now.signed_duration_since(commit.author_time) >= criteria.window {
        return false;
    }

    match criteria.author {
        Some(author) => commit.author_email == author,
        None => true,
    }
}
