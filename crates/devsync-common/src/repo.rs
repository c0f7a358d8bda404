//! Types shared by the repository inspector, updater, and cleanup pipelines.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification of a repository's working-copy state.
///
/// Total over `(dirty, has_upstream, ahead)`: `dirty` wins, then
/// `!has_upstream`, then `ahead > 0`, else `clean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Clean,
    Dirty,
    Unpushed,
    NoUpstream,
}

impl RepoStatus {
    pub fn classify(dirty: bool, has_upstream: bool, ahead: u32) -> Self {
        if dirty {
            RepoStatus::Dirty
        } else if !has_upstream {
            RepoStatus::NoUpstream
        } else if ahead > 0 {
            RepoStatus::Unpushed
        } else {
            RepoStatus::Clean
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub path: PathBuf,
    pub status: RepoStatus,
    pub dirty: bool,
    pub ahead: u32,
    pub has_upstream: bool,
}

/// Per-repo switches for the update pipeline.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UpdateOptions {
    pub prune: bool,
    pub auto_stash: bool,
    pub submodule_update: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    pub repo_path: PathBuf,
    pub commands: Vec<String>,
    pub skipped_messages: Vec<String>,
    pub upstream_checked: bool,
    pub has_upstream: bool,
}

impl UpdateResult {
    pub fn new(repo_path: PathBuf) -> Self {
        Self {
            repo_path,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTarget {
    Merged,
    Squashed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupOptions {
    pub prune: bool,
    pub dry_run: bool,
    pub targets: Vec<CleanupTarget>,
    pub exclude_branches: Vec<String>,
    /// branch name -> merged PR's `headRefOid`, prepopulated by the caller
    /// when `targets` contains `Squashed`.
    pub squashed_pr_head_by_branch: std::collections::HashMap<String, String>,
}

impl CleanupOptions {
    pub fn wants(&self, target: CleanupTarget) -> bool {
        self.targets.contains(&target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupPlan {
    pub branch: String,
    pub target: CleanupTarget,
    pub force: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupResult {
    pub commands: Vec<String>,
    pub planned_deletes: Vec<CleanupPlan>,
    pub deleted_branches: Vec<String>,
    pub skipped_messages: Vec<String>,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_total_and_deterministic() {
        assert_eq!(RepoStatus::classify(true, true, 5), RepoStatus::Dirty);
        assert_eq!(RepoStatus::classify(true, false, 0), RepoStatus::Dirty);
        assert_eq!(RepoStatus::classify(false, false, 0), RepoStatus::NoUpstream);
        assert_eq!(RepoStatus::classify(false, true, 1), RepoStatus::Unpushed);
        assert_eq!(RepoStatus::classify(false, true, 0), RepoStatus::Clean);
    }
}
