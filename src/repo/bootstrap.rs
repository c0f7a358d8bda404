//! Forge Bootstrap (§4.8): reconciles the configured owner's forge repo
//! list against the local root, cloning whatever is missing.

use crate::errors::AppError;
use crate::forge::{is_github_rate_limit_error, ForgeClient};
use crate::process::ProcessRunner;
use crate::repo::inspector::discover;
use devsync_common::config::Protocol;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct BootstrapOutcome {
    pub ready_paths: Vec<PathBuf>,
    pub planned_only: usize,
}

const REPO_LIST_LIMIT: usize = 1000;

/// Reconcile `owner`'s forge repos against `root`. Returns an empty
/// outcome (not an error) if `owner` is blank or the forge degrades with a
/// rate-limit error.
pub async fn bootstrap(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    forge: &ForgeClient,
    root: &str,
    owner: &str,
    protocol: Protocol,
    dry_run: bool,
) -> Result<BootstrapOutcome, AppError> {
    if owner.trim().is_empty() {
        return Ok(BootstrapOutcome::default());
    }

    let repos = match forge.list_repos(ctx, owner).await {
        Ok(repos) => repos,
        Err(e) if is_github_rate_limit_error(&e) => {
            tracing::warn!(owner, "forge rate-limited; degrading bootstrap to empty ready set");
            return Ok(BootstrapOutcome::default());
        }
        Err(e) => return Err(e),
    };

    if repos.len() >= REPO_LIST_LIMIT {
        tracing::warn!(owner, limit = REPO_LIST_LIMIT, "forge repo listing hit its page limit");
    }

    let root_path = crate::repo::inspector::expand_tilde(root);
    let mut ready_paths = Vec::new();
    let mut planned_only = 0usize;

    for repo in repos.into_iter().filter(|r| !r.is_archived) {
        let target = root_path.join(&repo.name);

        if target.is_dir() {
            let has_git = discover(target.to_str().unwrap_or_default())
                .map(|paths| paths.contains(&target))
                .unwrap_or(false);
            if has_git {
                ready_paths.push(target);
                continue;
            }
            return Err(AppError::Other(anyhow::anyhow!(
                "{} exists and is not a Git repository; refusing to clone over it",
                target.display()
            )));
        }

        let url = match protocol {
            Protocol::Ssh => {
                if !repo.ssh_url.is_empty() {
                    repo.ssh_url.clone()
                } else {
                    repo.https_url.clone()
                }
            }
            Protocol::Https => {
                if !repo.https_url.is_empty() {
                    repo.https_url.clone()
                } else {
                    repo.ssh_url.clone()
                }
            }
        };

        if dry_run {
            planned_only += 1;
            tracing::info!(repo = %repo.name, url = %url, "would clone repository");
            continue;
        }

        process
            .run_checked(
                ctx,
                None,
                "git",
                &[
                    "clone".to_string(),
                    url,
                    target.display().to_string(),
                ],
            )
            .await?;
        ready_paths.push(target);
    }

    ready_paths.sort();
    ready_paths.dedup();

    Ok(BootstrapOutcome {
        ready_paths,
        planned_only,
    })
}

/// Merge Bootstrap's ready paths with Inspector's discovered paths
/// (union, sorted, deduplicated).
pub fn merge_with_discovered(mut ready: Vec<PathBuf>, mut discovered: Vec<PathBuf>) -> Vec<PathBuf> {
    ready.append(&mut discovered);
    ready.sort();
    ready.dedup();
    ready
}
