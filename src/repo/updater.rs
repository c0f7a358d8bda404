//! Repository Updater (§4.6): fetch/pull/submodule state machine with
//! safety gates, one repo per call.

use crate::errors::AppError;
use crate::process::ProcessRunner;
use devsync_common::repo::{UpdateOptions, UpdateResult};
use std::path::Path;
use tokio_util::sync::CancellationToken;

struct UnsafeState {
    reasons: Vec<String>,
}

impl UnsafeState {
    fn is_unsafe(&self) -> bool {
        !self.reasons.is_empty()
    }
}

async fn detect_unsafe_state(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
) -> Result<UnsafeState, AppError> {
    let mut reasons = Vec::new();

    let status = process
        .run(
            ctx,
            Some(path),
            "git",
            &["status".to_string(), "--porcelain".to_string()],
        )
        .await?;
    if !status.success {
        return Err(AppError::subprocess(
            "git",
            &["status".to_string(), "--porcelain".to_string()],
            status.combined_trimmed(),
        ));
    }
    if !status.stdout.trim().is_empty() {
        reasons.push("working tree has uncommitted changes".to_string());
    }

    let stash = process
        .run(
            ctx,
            Some(path),
            "git",
            &["stash".to_string(), "list".to_string()],
        )
        .await?;
    if !stash.success {
        return Err(AppError::subprocess(
            "git",
            &["stash".to_string(), "list".to_string()],
            stash.combined_trimmed(),
        ));
    }
    if !stash.stdout.trim().is_empty() {
        reasons.push("stash stack is non-empty".to_string());
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
    if head.stdout.trim() == "HEAD" {
        reasons.push("HEAD is detached".to_string());
    }

    Ok(UnsafeState { reasons })
}

const NO_UPSTREAM_PATTERNS: &[&str] = &["no upstream configured", "no upstream branch"];

/// Run the fetch/safety-gate/pull/submodule state machine for one repo.
pub async fn update(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    path: &Path,
    opts: &UpdateOptions,
) -> Result<UpdateResult, AppError> {
    let mut result = UpdateResult::new(path.to_path_buf());

    let mut fetch_args = vec!["-C".to_string(), path.display().to_string(), "fetch".to_string(), "--all".to_string()];
    if opts.prune {
        fetch_args.push("--prune".to_string());
    }
    result.commands.push(format!("git {}", fetch_args.join(" ")));

    if !opts.dry_run {
        let git_args: Vec<String> = fetch_args[2..].to_vec();
        process.run_checked(ctx, Some(path), "git", &git_args).await?;
    }

    let unsafe_state = if opts.dry_run {
        match detect_unsafe_state(ctx, process, path).await {
            Ok(state) => state,
            Err(e) => {
                result.skipped_messages.push(format!("state detection failed: {e}"));
                return Ok(result);
            }
        }
    } else {
        detect_unsafe_state(ctx, process, path).await?
    };

    if unsafe_state.is_unsafe() {
        result.skipped_messages.extend(unsafe_state.reasons);
        return Ok(result);
    }

    let upstream_args = vec![
        "rev-parse".to_string(),
        "--abbrev-ref".to_string(),
        "--symbolic-full-name".to_string(),
        "@{u}".to_string(),
    ];
    let upstream_output = process.run(ctx, Some(path), "git", &upstream_args).await?;
    result.upstream_checked = true;
    let has_upstream = if upstream_output.success {
        true
    } else {
        let stderr_lower = upstream_output.stderr.to_lowercase();
        if NO_UPSTREAM_PATTERNS.iter().any(|p| stderr_lower.contains(p)) {
            false
        } else if opts.dry_run {
            result
                .skipped_messages
                .push(format!("upstream probe failed: {}", upstream_output.combined_trimmed()));
            return Ok(result);
        } else {
            return Err(AppError::subprocess(
                "git",
                &upstream_args,
                upstream_output.combined_trimmed(),
            ));
        }
    };
    result.has_upstream = has_upstream;

    if has_upstream {
        let mut pull_args = vec!["pull".to_string(), "--rebase".to_string()];
        if opts.auto_stash {
            pull_args.push("--autostash".to_string());
        }
        result.commands.push(format!(
            "git -C {} {}",
            path.display(),
            pull_args.join(" ")
        ));
        if !opts.dry_run {
            process.run_checked(ctx, Some(path), "git", &pull_args).await?;
        }
    } else {
        result
            .skipped_messages
            .push("no upstream configured; skipping pull".to_string());
    }

    if opts.submodule_update {
        let submodule_args = vec![
            "submodule".to_string(),
            "update".to_string(),
            "--init".to_string(),
            "--recursive".to_string(),
            "--remote".to_string(),
        ];
        result.commands.push(format!(
            "git -C {} {}",
            path.display(),
            submodule_args.join(" ")
        ));
        if !opts.dry_run {
            process.run_checked(ctx, Some(path), "git", &submodule_args).await?;
        }
    }

    Ok(result)
}
