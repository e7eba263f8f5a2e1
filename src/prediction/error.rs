//! Error types for conflict prediction
//!
//! Fatal errors (configuration, identity, repository access) abort a run before
//! anything is scheduled. Ancestry and simulation errors are scoped to a single
//! candidate or comparison and end up in the report instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while predicting conflicts
#[derive(Debug, Error)]
pub enum PredictError {
    /// The main branch reference does not exist in the repository
    #[error("Unable to find main branch with name {name}")]
    MainBranchNotFound { name: String },

    /// The `since` window could not be parsed or is zero
    #[error("Unable to parse time window: '{input}'")]
    InvalidWindow { input: String },

    /// The branch name filter is not a valid regular expression
    #[error("Invalid branch filter '{pattern}': {reason}")]
    InvalidFilter { pattern: String, reason: String },

    /// A configuration file could not be read or parsed
    #[error("Invalid configuration in {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// Filtering by author was requested but no user.email is configured
    #[error("Unable to infer current user: no user.email configured")]
    UnknownIdentity,

    /// The two histories share no commit
    #[error("No common ancestor between '{left}' and '{right}'")]
    NoCommonAncestor { left: String, right: String },

    /// The merge simulation itself could not run
    #[error("Merge simulation failed: {0}")]
    Simulation(String),

    /// Repository not found or invalid
    #[error("Not a git repository: {path}")]
    NotARepository { path: PathBuf },

    /// Fetching from the remote failed
    #[error("Error fetching from {remote}: {reason}")]
    Fetch { remote: String, reason: String },

    /// Generic git error that we convert to string
    /// This handles various gix error types that don't have direct conversions
    #[error("Git operation failed: {0}")]
    GitOperation(String),
}

impl PredictError {
    /// Whether this error aborts the whole run.
    ///
    /// Ancestry and simulation failures only exclude one candidate or pair.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PredictError::NoCommonAncestor { .. } | PredictError::Simulation(_)
        )
    }
}

/// Result type alias using PredictError
pub type Result<T> = std::result::Result<T, PredictError>;

impl From<gix::repository::tree_merge_options::Error> for PredictError {
    fn from(err: gix::repository::tree_merge_options::Error) -> Self {
        PredictError::Simulation(err.to_string())
    }
}

impl From<gix::object::find::existing::Error> for PredictError {
    fn from(err: gix::object::find::existing::Error) -> Self {
        PredictError::GitOperation(err.to_string())
    }
}
