//! Run configuration
//!
//! Settings come from three layers, highest precedence first: command-line
//! flags, a TOML file (`~/.confligt.toml` unless `--config` names another),
//! and built-in defaults. [`Settings::to_options`] validates the merged
//! result into the [`PredictOptions`] the engine consumes.

use crate::prediction::{PredictError, PredictOptions, PredictResult as Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up in the home directory
pub const CONFIG_FILE_NAME: &str = ".confligt.toml";

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_MAIN: &str = "master";
pub const DEFAULT_SINCE: &str = "7 days";

/// One layer of configuration; unset fields fall through to the next layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Name of remote
    pub remote: Option<String>,
    /// Name of main branch
    pub main: Option<String>,
    /// Consider branches with commits since (e.g. "7 days", "1 week 2 days")
    pub since: Option<String>,
    /// Regular expression to match branch names against
    pub filter: Option<String>,
    pub verbose: Option<bool>,
    /// Fetch from remote before inspecting
    pub fetch: Option<bool>,
    /// Inspect only your own branches
    pub mine: Option<bool>,
    /// Find conflicts for local branches only
    pub local_only: Option<bool>,
    /// Number of branches to check concurrently
    pub concurrency: Option<NonZeroUsize>,
}

impl Settings {
    /// Load the config file.
    ///
    /// An explicit `path` must exist. Without one, `~/.confligt.toml` is used
    /// if present and silently skipped otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path).map_err(|e| PredictError::InvalidConfig {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "using config file");
        Self::from_toml(&text, &path)
    }

    pub fn from_toml(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| PredictError::InvalidConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Layer `overrides` on top of `self`
    pub fn merge(self, overrides: Settings) -> Settings {
        Settings {
            remote: overrides.remote.or(self.remote),
            main: overrides.main.or(self.main),
            since: overrides.since.or(self.since),
            filter: overrides.filter.or(self.filter),
            verbose: overrides.verbose.or(self.verbose),
            fetch: overrides.fetch.or(self.fetch),
            mine: overrides.mine.or(self.mine),
            local_only: overrides.local_only.or(self.local_only),
            concurrency: overrides.concurrency.or(self.concurrency),
        }
    }

    pub fn remote(&self) -> &str {
        self.remote.as_deref().unwrap_or(DEFAULT_REMOTE)
    }

    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    pub fn fetch(&self) -> bool {
        self.fetch.unwrap_or(false)
    }

    /// Validate into engine options, filling in defaults
    pub fn to_options(&self) -> Result<PredictOptions> {
        let window = parse_window(self.since.as_deref().unwrap_or(DEFAULT_SINCE))?;

        let filter = match self.filter.as_deref() {
            Some(pattern) if !pattern.is_empty() => {
                Some(Regex::new(pattern).map_err(|e| PredictError::InvalidFilter {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?)
            }
            _ => None,
        };

        Ok(PredictOptions {
            window,
            remote: self.remote().to_string(),
            main: self.main.clone().unwrap_or_else(|| DEFAULT_MAIN.to_string()),
            mine: self.mine.unwrap_or(false),
            filter,
            local_only: self.local_only.unwrap_or(true),
            concurrency: self.concurrency.unwrap_or_else(default_concurrency),
        })
    }
}

/// `~/.confligt.toml`, if a home directory is known
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

/// Half the available processing units, at least one
pub fn default_concurrency() -> NonZeroUsize {
    let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    NonZeroUsize::new(cpus / 2).unwrap_or(NonZeroUsize::MIN)
}

/// Parse a human duration such as "7 days", "36h" or "1 week 2 days".
///
/// Months count as 30 days and years as 365. Empty, malformed and zero
/// durations are rejected.
pub fn parse_window(input: &str) -> Result<chrono::Duration> {
    let invalid = || PredictError::InvalidWindow {
        input: input.to_string(),
    };

    let mut chars = input.trim().chars().peekable();
    let mut total: i64 = 0;
    let mut groups = 0;

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.next_if(char::is_ascii_digit) {
            digits.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut unit = String::new();
        while let Some(c) = chars.next_if(char::is_ascii_alphabetic) {
            unit.push(c.to_ascii_lowercase());
        }
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}

        let amount: i64 = digits.parse().map_err(|_| invalid())?;
        let seconds = unit_seconds(&unit).ok_or_else(invalid)?;
        total = amount
            .checked_mul(seconds)
            .and_then(|s| total.checked_add(s))
            .ok_or_else(invalid)?;
        groups += 1;
    }

    if groups == 0 || total == 0 {
        return Err(invalid());
    }
    chrono::Duration::try_seconds(total).ok_or_else(invalid)
}

fn unit_seconds(unit: &str) -> Option<i64> {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    let seconds = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => 7 * DAY,
        "mo" | "month" | "months" => 30 * DAY,
        "y" | "yr" | "year" | "years" => 365 * DAY,
        _ => return None,
    };
    Some(seconds)
}
