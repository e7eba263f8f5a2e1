//! Confligt - Find conflicting branches in git repositories
//!
//! This library predicts which branches would produce merge conflicts if they
//! were merged, without performing any merge. Every recent branch is first
//! checked against the main branch; branches that merge cleanly into main are
//! then checked against each other.
//!
//! # Architecture
//!
//! The library is organized into focused modules:
//!
//! - **prediction** - Branch selection, merge reduction, conflict scheduling and reporting
//! - **config** - Layered settings (flags, TOML file, defaults) and window parsing
//!
//! # Example
//!
//! ```rust,no_run
//! use confligt::{GitRepository, RunContext, Settings, predict};
//!
//! let repo = GitRepository::discover(".").expect("Failed to open repository");
//! let options = Settings::default().to_options().expect("Invalid settings");
//!
//! let report = predict(&repo, &options, &RunContext::quiet()).expect("Prediction failed");
//!
//! for branch in &report.conflicts_with_main {
//!     println!("{} conflicts with {}", branch, report.main);
//! }
//! ```

pub mod config;
pub mod prediction;

pub use config::Settings;
pub use prediction::*;
