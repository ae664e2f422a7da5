//! Output file naming.
//!
//! Derives a candidate name from the task URL and resolves it to a path that
//! no other file (on disk, or claimed earlier in this run) already uses.

mod derive;
mod sanitize;

pub use derive::base_name_from_url;
pub use sanitize::sanitize_component;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// How existing files on disk affect resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePolicy {
    /// Append `.1`, `.2`, ... until the name is unused on disk.
    Unique,
    /// Use the candidate verbatim even if it exists (overwrite or resume).
    Reuse,
}

/// Resolves candidate names to output paths for one run.
///
/// Paths handed out are remembered, so two tasks of the same run never share
/// an output file even when their URLs end in the same name.
#[derive(Debug)]
pub struct FilenameResolver {
    policy: NamePolicy,
    claimed: Mutex<HashSet<PathBuf>>,
}

impl FilenameResolver {
    pub fn new(policy: NamePolicy) -> Self {
        Self {
            policy,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Returns `dir/candidate`, or `dir/candidate.N` with the smallest free `N >= 1`.
    ///
    /// The loop ends after at most (existing files + claimed names) steps.
    pub fn resolve(&self, dir: &Path, candidate: &str) -> PathBuf {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let taken = |path: &Path| {
            claimed.contains(path) || (self.policy == NamePolicy::Unique && path.exists())
        };

        let mut path = dir.join(candidate);
        let mut suffix = 1u64;
        while taken(&path) {
            path = dir.join(format!("{}.{}", candidate, suffix));
            suffix += 1;
        }
        claimed.insert(path.clone());
        path
    }
}
