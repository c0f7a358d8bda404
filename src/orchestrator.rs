//! Update Orchestrator (§4.9): partitions enabled updaters into exclusive
//! and parallel phases, gates each phase on sudo, and drives the Runner.

use crate::errors::AppError;
use crate::process::ProcessRunner;
use crate::runner::{self, Job};
use crate::updater::{requires_exclusive, requires_sudo, Updater};
use devsync_common::config::ManagerConfig;
use devsync_common::sysupdate::UpdateStats;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// `flagJobs>0 → flagJobs; else configJobs>0 → configJobs; else 1` (§4.9).
pub fn resolve_jobs(flag_jobs: usize, config_jobs: usize) -> usize {
    if flag_jobs > 0 {
        flag_jobs
    } else if config_jobs > 0 {
        config_jobs
    } else {
        1
    }
}

fn partition(updaters: Vec<Arc<dyn Updater>>) -> (Vec<Arc<dyn Updater>>, Vec<Arc<dyn Updater>>) {
    updaters
        .into_iter()
        .partition(|u| requires_exclusive(u.name()))
}

async fn run_phase(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    phase: Vec<Arc<dyn Updater>>,
    concurrency: usize,
    dry_run: bool,
    manager_configs: &HashMap<String, ManagerConfig>,
) -> Result<UpdateStats, AppError> {
    if phase.is_empty() {
        return Ok(UpdateStats::default());
    }

    let needs_sudo = phase
        .iter()
        .any(|u| requires_sudo(u.name(), manager_configs.get(u.name())));
    if needs_sudo && !dry_run {
        process
            .run_checked(ctx, None, "sudo", &["-v".to_string()])
            .await?;
    }

    let stats: Arc<Mutex<HashMap<usize, Result<devsync_common::sysupdate::ManagerUpdateResult, String>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let jobs: Vec<Job> = phase
        .iter()
        .enumerate()
        .map(|(index, updater)| {
            let updater = updater.clone();
            let stats = stats.clone();
            Job::new(updater.name().to_string(), move |ctx| {
                let updater = updater.clone();
                let stats = stats.clone();
                async move {
                    let outcome = updater.update(&ctx, dry_run).await;
                    let recorded = outcome
                        .as_ref()
                        .map(|r| r.clone())
                        .map_err(|e| e.to_string());
                    stats.lock().unwrap().insert(index, recorded);
                    outcome.map(|_| ())
                }
            })
        })
        .collect();

    let summary = runner::execute(ctx, concurrency, jobs).await;

    let mut merged = UpdateStats::default();
    let collected = stats.lock().unwrap();
    for index in 0..phase.len() {
        match collected.get(&index) {
            Some(Ok(manager_result)) => {
                merged.updated += manager_result.updated_count;
                merged.failed += manager_result.failed_count;
                merged.errors.extend(manager_result.errors.clone());
            }
            Some(Err(_)) => {
                // A cancellation-class error is already reflected as
                // `skipped` in `summary`, not counted as `failed` here.
                if summary.results[index].status == devsync_common::job::JobStatus::Failed {
                    merged.failed += 1;
                    if let Some(err) = &summary.results[index].err {
                        merged.errors.push(err.clone());
                    }
                }
            }
            None => {}
        }
    }

    Ok(merged)
}

/// Drive `enabledUpdaters[]` through the exclusive-then-parallel phases.
pub async fn run(
    ctx: &CancellationToken,
    process: &dyn ProcessRunner,
    enabled_updaters: Vec<Arc<dyn Updater>>,
    jobs_concurrency: usize,
    dry_run: bool,
    manager_configs: &HashMap<String, ManagerConfig>,
) -> Result<UpdateStats, AppError> {
    let (exclusive, parallel) = partition(enabled_updaters);

    let mut stats = UpdateStats::default();
    stats.merge(run_phase(ctx, process, exclusive, 1, dry_run, manager_configs).await?);
    stats.merge(run_phase(ctx, process, parallel, jobs_concurrency.max(1), dry_run, manager_configs).await?);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::FakeProcessRunner;
    use async_trait::async_trait;
    use devsync_common::sysupdate::ManagerUpdateResult;

    struct StubUpdater {
        name: &'static str,
        result: ManagerUpdateResult,
    }

    #[async_trait]
    impl Updater for StubUpdater {
        fn name(&self) -> &str {
            self.name
        }
        fn display_name(&self) -> &str {
            self.name
        }
        fn is_available(&self) -> bool {
            true
        }
        fn configure(&self, _cfg: ManagerConfig) {}
        async fn update(
            &self,
            _ctx: &CancellationToken,
            _dry_run: bool,
        ) -> Result<ManagerUpdateResult, AppError> {
            Ok(self.result.clone())
        }
    }

    #[test]
    fn resolve_jobs_prefers_flag_then_config_then_one() {
        assert_eq!(resolve_jobs(4, 2), 4);
        assert_eq!(resolve_jobs(0, 2), 2);
        assert_eq!(resolve_jobs(0, 0), 1);
    }

    #[tokio::test]
    async fn apt_runs_exclusively_before_parallel_phase_and_sudo_refreshes() {
        let process = Arc::new(FakeProcessRunner::new());
        process.push_success(""); // sudo -v for exclusive phase

        let apt = Arc::new(StubUpdater {
            name: "apt",
            result: ManagerUpdateResult {
                message: "ok".to_string(),
                updated_count: 2,
                ..Default::default()
            },
        });
        let brew = Arc::new(StubUpdater {
            name: "brew",
            result: ManagerUpdateResult {
                message: "ok".to_string(),
                updated_count: 3,
                ..Default::default()
            },
        });

        let ctx = CancellationToken::new();
        let configs = HashMap::new();
        let stats = run(&ctx, process.as_ref(), vec![apt, brew], 2, false, &configs)
            .await
            .unwrap();

        assert_eq!(stats.updated, 5);
        assert_eq!(stats.failed, 0);
        // Exactly one `sudo -v`: the exclusive (apt) phase needs it, the
        // parallel (brew) phase does not.
        assert_eq!(process.calls().len(), 1);
        assert_eq!(process.calls()[0].0, "sudo");
    }

    #[tokio::test]
    async fn dry_run_skips_sudo_refresh() {
        let process = Arc::new(FakeProcessRunner::new());
        let apt = Arc::new(StubUpdater {
            name: "apt",
            result: ManagerUpdateResult::default(),
        });
        let ctx = CancellationToken::new();
        let configs = HashMap::new();
        run(&ctx, process.as_ref(), vec![apt], 1, true, &configs)
            .await
            .unwrap();
        assert_eq!(process.calls().len(), 0);
    }

    #[test]
    fn partition_places_only_apt_in_exclusive() {
        let apt = Arc::new(StubUpdater {
            name: "apt",
            result: ManagerUpdateResult::default(),
        }) as Arc<dyn Updater>;
        let brew = Arc::new(StubUpdater {
            name: "brew",
            result: ManagerUpdateResult::default(),
        }) as Arc<dyn Updater>;
        let (exclusive, parallel) = partition(vec![apt, brew]);
        assert_eq!(exclusive.len(), 1);
        assert_eq!(exclusive[0].name(), "apt");
        assert_eq!(parallel.len(), 1);
        assert_eq!(parallel[0].name(), "brew");
    }
}
