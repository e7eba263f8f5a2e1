//! Repository access: reference store and merge simulator
//!
//! The engine only talks to the repository through [`RefStore`] and
//! [`MergeSimulator`]. [`GitRepository`] implements both natively with gix;
//! merges are computed in memory and never touch refs, index or worktree.

use super::error::{PredictError, Result};
use super::{BranchRef, CommitInfo, LOCAL_PREFIX, MergeSimulation, REMOTE_PREFIX};
use chrono::DateTime;
use gix::merge::tree::TreatAsUnresolved;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

const CONFLICT_MARKER: &[u8] = b"<<<<<<<";

/// Read-only access to branch references and commit ancestry
pub trait RefStore: Sync {
    /// All local and remote-tracking branches
    fn references(&self) -> Result<Vec<BranchRef>>;

    /// Commit metadata for a hex commit id
    fn commit(&self, hash: &str) -> Result<CommitInfo>;

    /// Best common ancestor of all `refs`.
    ///
    /// Fails with [`PredictError::NoCommonAncestor`] for unrelated histories.
    fn merge_base(&self, refs: &[&BranchRef]) -> Result<String>;

    /// The current user's email, if one is configured
    fn user_email(&self) -> Option<String>;
}

/// Computes hypothetical merges without persisting anything
pub trait MergeSimulator: Sync {
    /// Merge `refs` on top of `base` and report what would conflict
    fn simulate(&self, base: &str, refs: &[&BranchRef]) -> Result<MergeSimulation>;
}

/// A git repository opened with gix, shareable across worker threads
pub struct GitRepository {
    repo: gix::ThreadSafeRepository,
    git_dir: PathBuf,
    workdir: Option<PathBuf>,
}

impl GitRepository {
    /// Open the repository containing `path`
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let repo = gix::discover(path).map_err(|_| PredictError::NotARepository {
            path: canonical_path,
        })?;

        let git_dir = repo.git_dir().to_path_buf();
        let workdir = repo.workdir().map(Path::to_path_buf);

        Ok(Self {
            repo: repo.into_sync(),
            git_dir,
            workdir,
        })
    }

    /// The `.git` directory
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Run `git fetch <remote>` so remote-tracking branches are current.
    ///
    /// This is the only operation that changes the repository, and only its
    /// remote-tracking refs.
    pub fn fetch(&self, remote: &str) -> Result<()> {
        let dir = self.workdir.as_deref().unwrap_or(&self.git_dir);
        let output = Command::new("git")
            .args(["fetch", remote])
            .current_dir(dir)
            .output()
            .map_err(|e| PredictError::Fetch {
                remote: remote.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(PredictError::Fetch {
                remote: remote.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Thread-local handle whose object writes stay in memory
    fn local(&self) -> gix::Repository {
        self.repo.to_thread_local().with_object_memory()
    }
}

impl RefStore for GitRepository {
    fn references(&self) -> Result<Vec<BranchRef>> {
        let repo = self.local();
        let platform = repo
            .references()
            .map_err(|e| PredictError::GitOperation(e.to_string()))?;
        let iter = platform
            .all()
            .map_err(|e| PredictError::GitOperation(e.to_string()))?;

        let mut branches = Vec::new();
        for reference in iter {
            let mut reference = reference.map_err(|e| PredictError::GitOperation(e.to_string()))?;
            let name = reference.name().as_bstr().to_string();
            if !name.starts_with(LOCAL_PREFIX) && !name.starts_with(REMOTE_PREFIX) {
                continue;
            }

            match reference.peel_to_id() {
                Ok(id) => {
                    if let Some(branch) = BranchRef::from_name(&name, id.to_string()) {
                        branches.push(branch);
                    }
                }
                Err(e) => debug!(reference = %name, error = %e, "skipping unpeelable reference"),
            }
        }
        Ok(branches)
    }

    fn commit(&self, hash: &str) -> Result<CommitInfo> {
        let repo = self.local();
        let id = parse_id(hash)?;
        let commit = repo
            .find_object(id)?
            .try_into_commit()
            .map_err(|_| PredictError::GitOperation(format!("{hash} is not a commit")))?;

        let author = commit
            .author()
            .map_err(|e| PredictError::GitOperation(e.to_string()))?;
        let time = author
            .time()
            .map_err(|e| PredictError::GitOperation(e.to_string()))?;
        let author_time = DateTime::from_timestamp(time.seconds, 0).ok_or_else(|| {
            PredictError::GitOperation(format!("{hash} has an invalid author timestamp"))
        })?;

        Ok(CommitInfo {
            hash: hash.to_string(),
            author_email: author.email.to_string(),
            author_time,
        })
    }

    fn merge_base(&self, refs: &[&BranchRef]) -> Result<String> {
        let repo = self.local();
        let (first, rest) = refs
            .split_first()
            .ok_or_else(|| PredictError::GitOperation("merge-base needs references".into()))?;

        let mut base = parse_id(&first.target)?;
        for other in rest {
            base = repo
                .merge_base(base, parse_id(&other.target)?)
                .map_err(|_| PredictError::NoCommonAncestor {
                    left: first.short.clone(),
                    right: other.short.clone(),
                })?
                .detach();
        }
        Ok(base.to_string())
    }

    fn user_email(&self) -> Option<String> {
        let repo = self.local();
        let config = repo.config_snapshot();
        config
            .string("user.email")
            .map(|email| email.to_string())
            .filter(|email| !email.is_empty())
    }
}

impl MergeSimulator for GitRepository {
    fn simulate(&self, base: &str, refs: &[&BranchRef]) -> Result<MergeSimulation> {
        let [ours, theirs] = refs else {
            return Err(PredictError::Simulation(format!(
                "expected two branches to merge, got {}",
                refs.len()
            )));
        };

        let repo = self.local();

        // merge_trees wants tree ids, not commits
        let base_tree_id = get_tree_id(&repo, parse_id(base)?, "base")?;
        let ours_tree_id = get_tree_id(&repo, parse_id(&ours.target)?, &ours.short)?;
        let theirs_tree_id = get_tree_id(&repo, parse_id(&theirs.target)?, &theirs.short)?;

        let labels = gix::merge::blob::builtin_driver::text::Labels {
            ancestor: Some("base".into()),
            current: Some(ours.short.as_str().into()),
            other: Some(theirs.short.as_str().into()),
        };
        let options = repo.tree_merge_options()?;

        let merge_outcome = repo
            .merge_trees(base_tree_id, ours_tree_id, theirs_tree_id, labels, options)
            .map_err(|e| PredictError::Simulation(e.to_string()))?;

        // Auto-resolved conflicts are listed too; only unresolved ones count
        let how = TreatAsUnresolved::git();
        let mut conflicting_files = BTreeSet::new();
        let mut markers = 0;
        for conflict in merge_outcome.conflicts.iter().filter(|c| c.is_unresolved(how)) {
            conflicting_files.insert(conflict.ours.location().to_string());
            let in_file = match conflict.content_merge() {
                Some(merged) => count_markers(&repo.find_object(merged.merged_blob_id)?.data),
                None => 0,
            };
            // Tree-level conflicts (modify/delete, type changes) leave no markers
            markers += in_file.max(1);
        }

        Ok(MergeSimulation {
            conflicting_files: conflicting_files.into_iter().collect(),
            markers,
        })
    }
}

/// Lines opening a conflict hunk in merged content
fn count_markers(data: &[u8]) -> usize {
    data.split(|&byte| byte == b'\n')
        .filter(|line| line.starts_with(CONFLICT_MARKER))
        .count()
}

fn parse_id(hash: &str) -> Result<gix::ObjectId> {
    gix::ObjectId::from_hex(hash.as_bytes())
        .map_err(|e| PredictError::GitOperation(format!("invalid object id '{hash}': {e}")))
}

/// Root tree of the commit `commit_id`; `label` names it in errors
fn get_tree_id<'a>(
    repo: &'a gix::Repository,
    commit_id: gix::ObjectId,
    label: &str,
) -> Result<gix::Id<'a>> {
    let object = repo.find_object(commit_id)?;

    let commit = object
        .try_into_commit()
        .map_err(|_| PredictError::Simulation(format!("{label} object is not a commit")))?;

    commit
        .tree_id()
        .map_err(|e| PredictError::Simulation(format!("Failed to get tree for {label}: {e}")))
}
