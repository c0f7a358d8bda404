//! Per-job outcomes, run summaries, and the runner's lifecycle event stream.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Terminal classification of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    Skipped,
}

/// Outcome of one submitted job, positionally aligned with the input batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub name: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl JobResult {
    pub fn success(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Success,
            err: None,
            duration,
        }
    }

    pub fn failed(name: impl Into<String>, err: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Failed,
            err: Some(err.into()),
            duration,
        }
    }

    pub fn skipped(name: impl Into<String>, err: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Skipped,
            err: Some(err.into()),
            duration,
        }
    }
}

/// Aggregate result of one `Execute` call.
///
/// Invariant: `success + failed + skipped == total == results.len()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<JobResult>,
}

impl Summary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn push(&mut self, result: JobResult) {
        match result.status {
            JobStatus::Success => self.success += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Skipped => self.skipped += 1,
        }
        self.results.push(result);
    }

    /// True iff every job succeeded.
    pub fn all_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.success == self.total
    }
}

/// One runner lifecycle record. `queued < started < finished` in timestamp
/// order for a given job; `started` may be absent for a job skipped before
/// dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Queued,
    Started,
    Finished {
        status: JobStatus,
        #[serde(with = "duration_millis")]
        duration: Duration,
        #[serde(skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub job_index: usize,
    pub job_name: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn queued(job_index: usize, job_name: impl Into<String>) -> Self {
        Self {
            job_index,
            job_name: job_name.into(),
            timestamp: chrono::Utc::now(),
            kind: EventKind::Queued,
        }
    }

    pub fn started(job_index: usize, job_name: impl Into<String>) -> Self {
        Self {
            job_index,
            job_name: job_name.into(),
            timestamp: chrono::Utc::now(),
            kind: EventKind::Started,
        }
    }

    pub fn finished(job_index: usize, job_name: impl Into<String>, result: &JobResult) -> Self {
        Self {
            job_index,
            job_name: job_name.into(),
            timestamp: chrono::Utc::now(),
            kind: EventKind::Finished {
                status: result.status,
                duration: result.duration,
                err: result.err.clone(),
            },
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_invariant_holds_across_pushes() {
        let mut summary = Summary::new(3);
        summary.push(JobResult::success("a", Duration::from_millis(1)));
        summary.push(JobResult::failed("b", "boom", Duration::from_millis(1)));
        summary.push(JobResult::skipped("c", "cancelled", Duration::from_millis(1)));

        assert_eq!(summary.total, 3);
        assert_eq!(summary.success + summary.failed + summary.skipped, summary.total);
        assert_eq!(summary.results.len(), summary.total);
        assert!(!summary.all_success());
    }

    #[test]
    fn finished_event_mirrors_job_result() {
        let result = JobResult::failed("sync", "network error", Duration::from_secs(2));
        let event = Event::finished(0, "sync", &result);
        match event.kind {
            EventKind::Finished { status, duration, err } => {
                assert_eq!(status, result.status);
                assert_eq!(duration, result.duration);
                assert_eq!(err, result.err);
            }
            _ => panic!("expected Finished"),
        }
    }
}
