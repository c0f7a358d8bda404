//! Append-only audit log of runner events (§4.2), grounded on the
//! teacher's run-scoped audit logger: a single mutex serializes writes,
//! the first write error is latched and reported at `close`.

use devsync_common::job::{Event, EventKind, JobStatus, Summary};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

struct Inner {
    file: File,
    first_error: Option<String>,
}

pub struct EventLogger {
    inner: Mutex<Inner>,
}

impl EventLogger {
    pub fn create(path: &Path, tool_name: &str) -> anyhow::Result<Self> {
        let mut file = File::create(path)?;
        let header = format!(
            "# {tool_name} job log — {}\n",
            chrono::Utc::now().to_rfc3339()
        );
        file.write_all(header.as_bytes())?;
        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                first_error: None,
            }),
        })
    }

    /// Record one lifecycle event. Write failures are latched, not
    /// propagated, so a full disk doesn't interrupt job execution.
    pub fn log(&self, event: &Event) {
        let line = format_event(event);
        match event.kind {
            EventKind::Finished {
                status: JobStatus::Failed,
                ..
            } => tracing::warn!(target: "devsync::event_log", "{}", line.trim_end()),
            _ => tracing::info!(target: "devsync::event_log", "{}", line.trim_end()),
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.first_error.is_none()
            && let Err(e) = inner.file.write_all(line.as_bytes())
        {
            inner.first_error = Some(e.to_string());
        }
    }

    /// Write the footer and return the first write error encountered, if any.
    pub fn close(&self, summary: &Summary, elapsed: Duration) -> anyhow::Result<()> {
        let footer = format!(
            "# summary: success {} / failed {} / skipped {} / total {}\n# elapsed: {:.3}s\n",
            summary.success,
            summary.failed,
            summary.skipped,
            summary.total,
            elapsed.as_secs_f64(),
        );

        let mut inner = self.inner.lock().unwrap();
        if inner.first_error.is_none()
            && let Err(e) = inner.file.write_all(footer.as_bytes())
        {
            inner.first_error = Some(e.to_string());
        }

        match inner.first_error.take() {
            Some(msg) => Err(anyhow::anyhow!("event log write failed: {msg}")),
            None => Ok(()),
        }
    }
}

fn format_event(event: &Event) -> String {
    let ts = event.timestamp.format("%H:%M:%S%.3f");
    match &event.kind {
        EventKind::Queued => format!("{ts} [QUEUED] {}\n", event.job_name),
        EventKind::Started => format!("{ts} [STARTED] {}\n", event.job_name),
        EventKind::Finished {
            status,
            duration,
            err,
        } => {
            let tag = match status {
                JobStatus::Success => "SUCCESS",
                JobStatus::Failed => "FAILED",
                JobStatus::Skipped => "SKIPPED",
            };
            let mut line = format!(
                "{ts} [{tag}] {} ({:.3}s)",
                event.job_name,
                duration.as_secs_f64()
            );
            if let Some(err) = err {
                line.push_str(&format!(": {err}"));
            }
            line.push('\n');
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devsync_common::job::JobResult;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    #[test]
    fn header_summary_and_footer_are_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = EventLogger::create(&path, "devsync").unwrap();

        logger.log(&Event::queued(0, "sync-repo"));
        logger.log(&Event::started(0, "sync-repo"));
        let result = JobResult::success("sync-repo", StdDuration::from_millis(250));
        logger.log(&Event::finished(0, "sync-repo", &result));

        let mut summary = Summary::new(1);
        summary.push(result);
        logger.close(&summary, StdDuration::from_secs(1)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# devsync job log"));
        assert!(content.contains("[QUEUED] sync-repo"));
        assert!(content.contains("[STARTED] sync-repo"));
        assert!(content.contains("[SUCCESS] sync-repo"));
        assert!(content.contains("# summary: success 1 / failed 0 / skipped 0 / total 1"));
        assert!(content.contains("# elapsed:"));
    }

    #[test]
    fn failed_event_line_includes_error_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = EventLogger::create(&path, "devsync").unwrap();
        let result = JobResult::failed("apt", "exit code 100", StdDuration::from_millis(10));
        logger.log(&Event::finished(0, "apt", &result));

        let mut summary = Summary::new(1);
        summary.push(result);
        logger.close(&summary, StdDuration::from_millis(10)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[FAILED] apt"));
        assert!(content.contains("exit code 100"));
    }
}
