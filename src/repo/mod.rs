//! Git repository reconciliation: discovery, update, cleanup, and
//! forge-backed bootstrap (§4.5–4.8).

pub mod bootstrap;
pub mod cleanup;
pub mod inspector;
pub mod updater;

use crate::errors::AppError;
use crate::process::ProcessRunner;
use crate::runner::{self, Job};
use devsync_common::repo::{CleanupOptions, CleanupResult, UpdateOptions, UpdateResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Run `updater::update` over every discovered path under the runner's
/// bounded concurrency, positionally aligning results with `paths`.
pub async fn run_update_all(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    paths: Vec<PathBuf>,
    opts: UpdateOptions,
    concurrency: usize,
) -> Vec<Result<UpdateResult, AppError>> {
    run_per_repo(ctx, paths, concurrency, move |ctx, _index, path| {
        let process = process.clone();
        async move { updater::update(&ctx, process.as_ref(), &path, &opts).await }
    })
    .await
}

/// Run `cleanup::cleanup` over every discovered path. `opts` is supplied
/// per-path (positionally aligned with `paths`) since squash-merge head
/// detection is repo-specific; callers with a uniform policy can just
/// clone the same value into every slot.
pub async fn run_cleanup_all(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    paths: Vec<PathBuf>,
    opts: Vec<CleanupOptions>,
    concurrency: usize,
) -> Vec<Result<CleanupResult, AppError>> {
    let opts = Arc::new(opts);
    run_per_repo(ctx, paths, concurrency, move |ctx, index, path| {
        let process = process.clone();
        let options = opts.get(index).cloned().unwrap_or_default();
        async move { cleanup::cleanup(&ctx, process.as_ref(), &path, &options).await }
    })
    .await
}

async fn run_per_repo<T, F, Fut>(
    ctx: &CancellationToken,
    paths: Vec<PathBuf>,
    concurrency: usize,
    make_future: F,
) -> Vec<Result<T, AppError>>
where
    T: Send + 'static,
    F: Fn(CancellationToken, usize, PathBuf) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<T, AppError>> + Send + 'static,
{
    let results: Arc<Mutex<HashMap<usize, Result<T, String>>>> = Arc::new(Mutex::new(HashMap::new()));
    let make_future = Arc::new(make_future);

    let jobs: Vec<Job> = paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let path = path.clone();
            let results = results.clone();
            let make_future = make_future.clone();
            Job::new(path.display().to_string(), move |ctx| {
                let path = path.clone();
                let results = results.clone();
                let make_future = make_future.clone();
                async move {
                    let outcome = make_future(ctx, index, path).await;
                    let ok = outcome.is_ok();
                    results
                        .lock()
                        .unwrap()
                        .insert(index, outcome.map_err(|e| e.to_string()));
                    if ok {
                        Ok(())
                    } else {
                        Err(AppError::Other(anyhow::anyhow!("repo job failed")))
                    }
                }
            })
        })
        .collect();

    runner::execute(ctx, concurrency.max(1), jobs).await;

    let mut collected = results.lock().unwrap();
    (0..paths.len())
        .map(|index| match collected.remove(&index) {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(AppError::Other(anyhow::anyhow!(message))),
            None => Err(AppError::Cancelled("repo job did not run".to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::FakeProcessRunner;

    #[tokio::test]
    async fn run_update_all_preserves_positional_alignment() {
        let process: Arc<dyn ProcessRunner> = Arc::new(FakeProcessRunner::new());
        let paths = vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")];
        let ctx = CancellationToken::new();
        let opts = UpdateOptions {
            dry_run: true,
            ..Default::default()
        };
        let results = run_update_all(&ctx, process, paths.clone(), opts, 2).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().repo_path, paths[0]);
        assert_eq!(results[1].as_ref().unwrap().repo_path, paths[1]);
    }

    #[tokio::test]
    async fn run_cleanup_all_applies_per_path_options() {
        let process: Arc<dyn ProcessRunner> = Arc::new(FakeProcessRunner::new());
        let paths = vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")];
        let ctx = CancellationToken::new();
        let opts = vec![
            CleanupOptions {
                dry_run: true,
                exclude_branches: vec!["keep-a".to_string()],
                ..Default::default()
            },
            CleanupOptions {
                dry_run: true,
                exclude_branches: vec!["keep-b".to_string()],
                ..Default::default()
            },
        ];
        let results = run_cleanup_all(&ctx, process, paths.clone(), opts, 2).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
    }
}
