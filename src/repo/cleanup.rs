//! Repository Cleanup (§4.7): deletes locally merged/squash-merged
//! branches under the same safety gate as the updater.

use crate::errors::AppError;
use crate::process::ProcessRunner;
use devsync_common::repo::{CleanupOptions, CleanupPlan, CleanupResult, CleanupTarget};
use std::path::Path;
use tokio_util::sync::CancellationToken;

async fn working_tree_is_unsafe(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
) -> Result<bool, AppError> {
    let status = process
        .run_checked(
            ctx,
            Some(path),
            "git",
            &["status".to_string(), "--porcelain".to_string()],
        )
        .await?;
    if !status.stdout.trim().is_empty() {
        return Ok(true);
    }

    let stash = process
        .run_checked(
            ctx,
            Some(path),
            "git",
            &["stash".to_string(), "list".to_string()],
        )
        .await?;
    if !stash.stdout.trim().is_empty() {
        return Ok(true);
    }

    let head = process
        .run_checked(
            ctx,
            Some(path),
            "git",
            &[
                "rev-parse".to_string(),
                "--abbrev-ref".to_string(),
                "HEAD".to_string(),
            ],
        )
        .await?;
    Ok(head.stdout.trim() == "HEAD")
}

/// Default upstream branch name, derived from the remote's symbolic HEAD
/// (`origin/HEAD -> origin/main`). `None` if it cannot be determined.
pub async fn default_branch(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
) -> Option<String> {
    let output = process
        .run(
            ctx,
            Some(path),
            "git",
            &[
                "symbolic-ref".to_string(),
                "refs/remotes/origin/HEAD".to_string(),
            ],
        )
        .await
        .ok()?;
    if !output.success {
        return None;
    }
    output
        .stdout
        .trim()
        .rsplit('/')
        .next()
        .map(|s| s.to_string())
}

async fn current_branch(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
) -> Result<String, AppError> {
    let output = process
        .run_checked(
            ctx,
            Some(path),
            "git",
            &[
                "rev-parse".to_string(),
                "--abbrev-ref".to_string(),
                "HEAD".to_string(),
            ],
        )
        .await?;
    Ok(output.stdout.trim().to_string())
}

async fn local_branches(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
) -> Result<Vec<String>, AppError> {
    let output = process
        .run_checked(
            ctx,
            Some(path),
            "git",
            &[
                "for-each-ref".to_string(),
                "--format=%(refname:short)".to_string(),
                "refs/heads/".to_string(),
            ],
        )
        .await?;
    Ok(output
        .stdout
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

async fn is_ancestor_of_default(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
    branch: &str,
    default_upstream_ref: &str,
) -> Result<bool, AppError> {
    let output = process
        .run(
            ctx,
            Some(path),
            "git",
            &[
                "merge-base".to_string(),
                "--is-ancestor".to_string(),
                branch.to_string(),
                default_upstream_ref.to_string(),
            ],
        )
        .await?;
    Ok(output.success)
}

async fn branch_tip(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
    branch: &str,
) -> Result<String, AppError> {
    let output = process
        .run_checked(
            ctx,
            Some(path),
            "git",
            &["rev-parse".to_string(), branch.to_string()],
        )
        .await?;
    Ok(output.stdout.trim().to_string())
}

/// Delete locally merged/squash-merged branches under `path`.
pub async fn cleanup(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
    opts: &CleanupOptions,
) -> Result<CleanupResult, AppError> {
    let mut result = CleanupResult::default();

    if working_tree_is_unsafe(ctx, process, path).await? {
        result
            .skipped_messages
            .push("working tree is in an unsafe state; cleanup skipped".to_string());
        return Ok(result);
    }

    let mut fetch_args = vec!["fetch".to_string(), "--all".to_string()];
    if opts.prune && !opts.dry_run {
        fetch_args.push("--prune".to_string());
    }
    result.commands.push(format!(
        "git -C {} {}",
        path.display(),
        fetch_args.join(" ")
    ));
    if !opts.dry_run {
        process.run_checked(ctx, Some(path), "git", &fetch_args).await?;
    }

    let default = default_branch(ctx, process, path).await;
    let current = current_branch(ctx, process, path).await?;
    let candidates: Vec<String> = local_branches(ctx, process, path)
        .await?
        .into_iter()
        .filter(|b| b != &current && !opts.exclude_branches.contains(b))
        .collect();

    if candidates.is_empty() {
        result
            .skipped_messages
            .push("no branches to delete".to_string());
        return Ok(result);
    }

    for branch in candidates {
        let mut target: Option<CleanupTarget> = None;

        if opts.wants(CleanupTarget::Merged) {
            if let Some(default_branch_name) = &default {
                let upstream_ref = format!("origin/{default_branch_name}");
                match is_ancestor_of_default(ctx, process, path, &branch, &upstream_ref).await {
                    Ok(true) => target = Some(CleanupTarget::Merged),
                    Ok(false) => {}
                    Err(_) => {}
                }
            }
        }

        if target.is_none() && opts.wants(CleanupTarget::Squashed) {
            if let Some(expected_oid) = opts.squashed_pr_head_by_branch.get(&branch) {
                match branch_tip(ctx, process, path, &branch).await {
                    Ok(tip) if &tip == expected_oid => target = Some(CleanupTarget::Squashed),
                    _ => {}
                }
            }
        }

        let Some(target) = target else { continue };

        let force = matches!(target, CleanupTarget::Squashed);
        let plan = CleanupPlan {
            branch: branch.clone(),
            target,
            force,
        };

        if opts.dry_run {
            result.planned_deletes.push(plan);
            continue;
        }

        let flag = if force { "-D" } else { "-d" };
        let delete_args = vec!["branch".to_string(), flag.to_string(), branch.clone()];
        result.commands.push(format!(
            "git -C {} {}",
            path.display(),
            delete_args.join(" ")
        ));
        match process.run_checked(ctx, Some(path), "git", &delete_args).await {
            Ok(_) => result.deleted_branches.push(branch),
            Err(e) => result.errors.push(format!("{branch}: {e}")),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::FakeProcessRunner;

    fn base_opts(dry_run: bool, targets: Vec<CleanupTarget>) -> CleanupOptions {
        CleanupOptions {
            prune: true,
            dry_run,
            targets,
            exclude_branches: vec![],
            squashed_pr_head_by_branch: Default::default(),
        }
    }

    #[tokio::test]
    async fn dry_run_squashed_branch_is_planned_not_deleted() {
        let process = FakeProcessRunner::new();
        process.push_success(""); // status --porcelain (safe)
        process.push_success(""); // stash list (safe)
        process.push_success("main\n"); // rev-parse HEAD (not detached)
        process.push_success("origin/main\n"); // default branch symbolic-ref
        process.push_success("main\n"); // current branch
        process.push_success("main\nfeat/x\n"); // local branches
        process.push_success("deadbeef\n"); // branch_tip feat/x

        let mut opts = base_opts(true, vec![CleanupTarget::Squashed]);
        opts.squashed_pr_head_by_branch
            .insert("feat/x".to_string(), "deadbeef".to_string());

        let ctx = CancellationToken::new();
        let result = cleanup(&ctx, &process, Path::new("/repo"), &opts)
            .await
            .unwrap();

        assert_eq!(result.planned_deletes.len(), 1);
        assert_eq!(result.planned_deletes[0].branch, "feat/x");
        assert_eq!(result.planned_deletes[0].target, CleanupTarget::Squashed);
        assert!(result.planned_deletes[0].force);
        assert!(result.deleted_branches.is_empty());
    }

    #[tokio::test]
    async fn merged_branch_is_preferred_over_squashed_when_both_apply() {
        let process = FakeProcessRunner::new();
        process.push_success(""); // status
        process.push_success(""); // stash
        process.push_success("main\n"); // rev-parse HEAD
        process.push_success("origin/main\n"); // default branch
        process.push_success("main\n"); // current branch
        process.push_success("main\nfeat/y\n"); // local branches
        process.push_success("ok"); // merge-base --is-ancestor succeeds

        let mut opts = base_opts(
            true,
            vec![CleanupTarget::Merged, CleanupTarget::Squashed],
        );
        opts.squashed_pr_head_by_branch
            .insert("feat/y".to_string(), "deadbeef".to_string());

        let ctx = CancellationToken::new();
        let result = cleanup(&ctx, &process, Path::new("/repo"), &opts)
            .await
            .unwrap();

        assert_eq!(result.planned_deletes.len(), 1);
        assert_eq!(result.planned_deletes[0].target, CleanupTarget::Merged);
        assert!(!result.planned_deletes[0].force);
    }

    #[tokio::test]
    async fn unsafe_working_tree_skips_cleanup_entirely() {
        let process = FakeProcessRunner::new();
        process.push_success(" M dirty.rs\n"); // status --porcelain dirty
        let opts = base_opts(true, vec![CleanupTarget::Merged]);
        let ctx = CancellationToken::new();
        let result = cleanup(&ctx, &process, Path::new("/repo"), &opts)
            .await
            .unwrap();
        assert!(result.planned_deletes.is_empty());
        assert!(!result.skipped_messages.is_empty());
    }

    #[tokio::test]
    async fn no_candidate_branches_reports_skip_message() {
        let process = FakeProcessRunner::new();
        process.push_success(""); // status
        process.push_success(""); // stash
        process.push_success("main\n"); // rev-parse HEAD
        process.push_success("origin/main\n"); // default branch
        process.push_success("main\n"); // current branch
        process.push_success("main\n"); // local branches: only current
        let opts = base_opts(true, vec![CleanupTarget::Merged]);
        let ctx = CancellationToken::new();
        let result = cleanup(&ctx, &process, Path::new("/repo"), &opts)
            .await
            .unwrap();
        assert!(result
            .skipped_messages
            .iter()
            .any(|m| m.contains("no branches to delete")));
    }
}
