//! The concurrent job orchestration subsystem (§4.1) — the backbone every
//! other pipeline in this crate is built on.
//!
//! `Execute`/`execute_with_events` run a batch of named, cancellable jobs
//! under a bounded-concurrency semaphore, never fail the batch on a single
//! job's error, and always return exactly one `JobResult` per input job.

use crate::errors::AppError;
use devsync_common::job::{Event, JobResult, JobStatus, Summary};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

type JobFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send>>;
type JobFn = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send>;

/// A named, cancellable unit of work submitted to the runner.
pub struct Job {
    name: String,
    run: Option<JobFn>,
}

impl Job {
    /// Create a job from an async closure taking the runner's cancellation token.
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Some(Box::new(move |ctx| Box::pin(run(ctx)))),
        }
    }

    /// A job with no closure — the runner records it as `Failed` with a
    /// synthetic error and never invokes anything (§4.1 nil-safety).
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: None,
        }
    }

    fn resolved_name(&self, ordinal: usize) -> String {
        if self.name.trim().is_empty() {
            format!("job-{ordinal}")
        } else {
            self.name.clone()
        }
    }
}

fn status_for(result: &Result<(), AppError>) -> JobStatus {
    match result {
        Ok(()) => JobStatus::Success,
        Err(e) if e.is_cancellation() => JobStatus::Skipped,
        Err(_) => JobStatus::Failed,
    }
}

fn result_for(name: String, outcome: Result<(), AppError>, duration: Duration) -> JobResult {
    match status_for(&outcome) {
        JobStatus::Success => JobResult::success(name, duration),
        JobStatus::Skipped => JobResult::skipped(name, outcome.unwrap_err().to_string(), duration),
        JobStatus::Failed => JobResult::failed(name, outcome.unwrap_err().to_string(), duration),
    }
}

/// Run `jobs` to completion, at most `max_jobs` closures in flight at once.
pub async fn execute(ctx: &CancellationToken, max_jobs: usize, jobs: Vec<Job>) -> Summary {
    execute_with_events(ctx, max_jobs, jobs, |_event| {}).await
}

/// Same contract as `execute`, plus a `queued`/`started`/`finished` event
/// per job. `sink` must tolerate concurrent calls from multiple workers —
/// the runner makes no ordering guarantee across jobs, only within one.
pub async fn execute_with_events<S>(
    ctx: &CancellationToken,
    max_jobs: usize,
    jobs: Vec<Job>,
    sink: S,
) -> Summary
where
    S: Fn(Event) + Send + Sync + 'static,
{
    let total = jobs.len();
    let max_jobs = max_jobs.max(1);
    let sink = Arc::new(sink);
    let semaphore = Arc::new(Semaphore::new(max_jobs));
    let results: Arc<Mutex<Vec<Option<JobResult>>>> = Arc::new(Mutex::new(vec![None; total]));

    let mut handles = Vec::with_capacity(total);

    for (index, job) in jobs.into_iter().enumerate() {
        let name = job.resolved_name(index + 1);
        sink(Event::queued(index, name.clone()));

        let ctx = ctx.clone();
        let sink = sink.clone();
        let semaphore = semaphore.clone();
        let results = results.clone();
        let run = job.run;

        let handle = tokio::spawn(async move {
            let start = Instant::now();

            let result = match run {
                None => result_for(
                    name.clone(),
                    Err(AppError::Other(anyhow::anyhow!("job has no closure"))),
                    start.elapsed(),
                ),
                Some(run) => {
                    let permit = tokio::select! {
                        biased;
                        _ = ctx.cancelled() => None,
                        permit = semaphore.acquire_owned() => permit.ok(),
                    };

                    match permit {
                        None => result_for(
                            name.clone(),
                            Err(AppError::Cancelled(ctx_err())),
                            start.elapsed(),
                        ),
                        Some(_permit) => {
                            sink(Event::started(index, name.clone()));
                            let outcome = run(ctx.clone()).await;
                            result_for(name.clone(), outcome, start.elapsed())
                        }
                    }
                }
            };

            sink(Event::finished(index, name.clone(), &result));
            results.lock().unwrap()[index] = Some(result);
        });

        handles.push(handle);
    }

    for handle in handles {
        // A job's own panic is isolated from its peers; treat it like any
        // other internal failure rather than letting it abort the batch.
        let _ = handle.await;
    }

    let mut summary = Summary::new(total);
    let mut results = results.lock().unwrap();
    for slot in results.iter_mut() {
        if let Some(result) = slot.take() {
            summary.push(result);
        }
    }
    summary
}

fn ctx_err() -> String {
    "context cancelled".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn happy_path_five_jobs_three_concurrency() {
        let ctx = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..5)
            .map(|i| {
                let in_flight = in_flight.clone();
                let max_observed = max_observed.clone();
                Job::new(format!("job-{i}"), move |_ctx| {
                    let in_flight = in_flight.clone();
                    let max_observed = max_observed.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_observed.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(StdDuration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
            })
            .collect();

        let summary = execute(&ctx, 3, jobs).await;
        assert_eq!(summary.total, 5);
        assert_eq!(summary.success, 5);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 0);
        assert!(max_observed.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn results_are_positionally_aligned() {
        let ctx = CancellationToken::new();
        let jobs = vec![
            Job::new("a", |_| async { Ok(()) }),
            Job::new("b", |_| async { Err(AppError::Other(anyhow::anyhow!("boom"))) }),
            Job::new("c", |_| async { Ok(()) }),
        ];
        let summary = execute(&ctx, 4, jobs).await;
        assert_eq!(summary.results[0].name, "a");
        assert_eq!(summary.results[1].name, "b");
        assert_eq!(summary.results[2].name, "c");
        assert_eq!(summary.results[1].status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn blank_name_gets_ordinal() {
        let ctx = CancellationToken::new();
        let jobs = vec![Job::new("", |_| async { Ok(()) })];
        let summary = execute(&ctx, 1, jobs).await;
        assert_eq!(summary.results[0].name, "job-1");
    }

    #[tokio::test]
    async fn nil_closure_is_failed_and_never_invoked() {
        let ctx = CancellationToken::new();
        let jobs = vec![Job::empty("nil-job")];
        let summary = execute(&ctx, 1, jobs).await;
        assert_eq!(summary.results[0].status, JobStatus::Failed);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn pre_cancelled_context_skips_every_job_unobserved() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let invoked = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<Job> = (0..3)
            .map(|i| {
                let invoked = invoked.clone();
                Job::new(format!("job-{i}"), move |_| {
                    let invoked = invoked.clone();
                    async move {
                        invoked.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
            })
            .collect();

        let summary = execute(&ctx, 3, jobs).await;
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.total, 3);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_class_error_is_classified_skipped() {
        let ctx = CancellationToken::new();
        let jobs = vec![Job::new("timed-out", |_| async {
            Err(AppError::Cancelled("deadline exceeded".to_string()))
        })];
        let summary = execute(&ctx, 1, jobs).await;
        assert_eq!(summary.results[0].status, JobStatus::Skipped);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn events_carry_full_queued_started_finished_sequence() {
        let ctx = CancellationToken::new();
        let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();

        let jobs: Vec<Job> = (0..5)
            .map(|i| Job::new(format!("job-{i}"), |_| async { Ok(()) }))
            .collect();

        let summary = execute_with_events(&ctx, 3, jobs, move |event| {
            sink_events.lock().unwrap().push(event);
        })
        .await;

        assert_eq!(summary.success, 5);
        let events = events.lock().unwrap();
        let queued = events
            .iter()
            .filter(|e| matches!(e.kind, devsync_common::job::EventKind::Queued))
            .count();
        let started = events
            .iter()
            .filter(|e| matches!(e.kind, devsync_common::job::EventKind::Started))
            .count();
        let finished = events
            .iter()
            .filter(|e| matches!(e.kind, devsync_common::job::EventKind::Finished { .. }))
            .count();
        assert_eq!(queued, 5);
        assert_eq!(started, 5);
        assert_eq!(finished, 5);
    }
}
