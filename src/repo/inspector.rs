//! Repository Inspector (§4.5): discovers Git working copies under a root
//! and classifies each one's sync state.

use crate::errors::AppError;
use crate::process::ProcessRunner;
use devsync_common::repo::{RepoInfo, RepoStatus};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Expand a leading `~` to the user's home directory; paths without one
/// pass through unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// True iff `dir` contains Git metadata: a `.git` directory, or a `.git`
/// file whose first line is `gitdir: <non-empty>` (worktrees/submodules).
fn has_git_metadata(dir: &Path) -> bool {
    let git_path = dir.join(".git");
    let Ok(metadata) = std::fs::symlink_metadata(&git_path) else {
        return false;
    };
    if metadata.is_dir() {
        return true;
    }
    if metadata.is_file() {
        if let Ok(contents) = std::fs::read_to_string(&git_path) {
            if let Some(first_line) = contents.lines().next() {
                if let Some(target) = first_line.strip_prefix("gitdir:") {
                    return !target.trim().is_empty();
                }
            }
        }
    }
    false
}

/// Resolve `root` (expanding `~`) and return it plus any direct child that
/// contains Git metadata, sorted lexicographically.
pub fn discover(root: &str) -> Result<Vec<PathBuf>, AppError> {
    let root = expand_tilde(root);
    if !root.is_dir() {
        return Err(AppError::RepoRootNotFound(root.display().to_string()));
    }

    let mut paths = Vec::new();
    if has_git_metadata(&root) {
        paths.push(root.clone());
    }

    let entries = std::fs::read_dir(&root)
        .map_err(|e| AppError::Other(anyhow::anyhow!("reading {}: {e}", root.display())))?;
    for entry in entries {
        let entry = entry
            .map_err(|e| AppError::Other(anyhow::anyhow!("reading {}: {e}", root.display())))?;
        let path = entry.path();
        if path.is_dir() && has_git_metadata(&path) {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

const NO_UPSTREAM_PATTERNS: &[&str] = &["no upstream configured", "no upstream branch"];

/// Inspect one repository's working-copy state via `git`.
pub async fn inspect(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
) -> Result<RepoInfo, AppError> {
    let dirty = {
        let output = process
            .run(
                ctx,
                Some(path),
                "git",
                &["status".to_string(), "--porcelain".to_string()],
            )
            .await?;
        if !output.success {
            return Err(AppError::subprocess(
                "git",
                &["status".to_string(), "--porcelain".to_string()],
                output.combined_trimmed(),
            ));
        }
        !output.stdout.trim().is_empty()
    };

    let upstream_args = [
        "rev-parse".to_string(),
        "--abbrev-ref".to_string(),
        "--symbolic-full-name".to_string(),
        "@{u}".to_string(),
    ];
    let upstream_output = process.run(ctx, Some(path), "git", &upstream_args).await?;
    let has_upstream = if upstream_output.success {
        true
    } else {
        let stderr_lower = upstream_output.stderr.to_lowercase();
        if NO_UPSTREAM_PATTERNS
            .iter()
            .any(|p| stderr_lower.contains(p))
        {
            false
        } else {
            return Err(AppError::subprocess(
                "git",
                &upstream_args,
                upstream_output.combined_trimmed(),
            ));
        }
    };

    let ahead = if has_upstream {
        let args = [
            "rev-list".to_string(),
            "--count".to_string(),
            "@{u}..HEAD".to_string(),
        ];
        let output = process.run_checked(ctx, Some(path), "git", &args).await?;
        output.stdout.trim().parse::<u32>().unwrap_or(0)
    } else {
        0
    };

    let status = RepoStatus::classify(dirty, has_upstream, ahead);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(RepoInfo {
        name,
        path: path.to_path_buf(),
        status,
        dirty,
        ahead,
        has_upstream,
    })
}
