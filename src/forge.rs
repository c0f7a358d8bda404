//! Rate-limit-aware wrapper around an external forge CLI (§4.3).
//!
//! A process-wide concurrency gate of weight 1 — held across the whole
//! subprocess invocation, not just the retry loop — keeps this crate from
//! tripping the forge's secondary rate limits when several pipelines want
//! to talk to it at once.

use crate::clock::Clock;
use crate::errors::AppError;
use crate::process::{ProcessOutput, ProcessRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MAX_ATTEMPTS: u32 = 6;

const RETRYABLE_PATTERNS: &[&str] = &[
    "too many requests",
    "429",
    "rate limit",
    "secondary rate limit",
    "502",
    "503",
    "504",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
];

/// The subset of retryable patterns that specifically indicate rate
/// limiting, as opposed to generic upstream unavailability (502/503/504).
/// Bootstrap (G) uses this split to decide whether to degrade gracefully.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "too many requests",
    "429",
    "rate limit",
    "secondary rate limit",
];

fn matches_any(haystack: &str, patterns: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

fn is_retryable(stderr: &str) -> bool {
    matches_any(stderr, RETRYABLE_PATTERNS)
}

fn is_rate_limit(stderr: &str) -> bool {
    matches_any(stderr, RATE_LIMIT_PATTERNS)
}

/// `Retry-After: <N>` parsed case-insensitively, returned as the raw
/// requested duration (unclamped — clamping happens in `calc_delay`).
fn parse_retry_after(stderr: &str) -> Option<Duration> {
    let lower = stderr.to_lowercase();
    let idx = lower.find("retry-after:")?;
    let rest = &lower[idx + "retry-after:".len()..];
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok().map(Duration::from_secs)
}

fn clamp(d: Duration, min: Duration, max: Duration) -> Duration {
    d.clamp(min, max)
}

/// Pure backoff calculation for attempt `attempt` (1-based) given the
/// previous attempt's stderr. No randomness, so tests can assert exact
/// values.
fn calc_delay(attempt: u32, stderr: &str) -> Duration {
    if let Some(retry_after) = parse_retry_after(stderr) {
        return clamp(
            retry_after + Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(5 * 60),
        );
    }
    let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
    clamp(
        Duration::from_secs(2 * exp),
        Duration::from_secs(2),
        Duration::from_secs(60),
    )
}

/// True iff `err` is the rate-limit-classified variant of an exhausted
/// forge retry. Used by Bootstrap (G) to decide whether forge
/// unavailability should degrade gracefully rather than fail the pipeline.
pub fn is_github_rate_limit_error(err: &AppError) -> bool {
    matches!(err, AppError::ForgeRateLimited(_))
}

/// One repository as listed by the forge CLI (§4.8).
#[derive(Debug, Clone)]
pub struct ForgeRepo {
    pub name: String,
    pub https_url: String,
    pub ssh_url: String,
    pub is_archived: bool,
}

#[derive(Debug, serde::Deserialize)]
struct ForgeRepoJson {
    name: String,
    url: String,
    #[serde(rename = "sshUrl")]
    ssh_url: String,
    #[serde(rename = "isArchived")]
    is_archived: bool,
}

/// One merged pull request as listed by the forge CLI (§4.7 squash-merge
/// preparation).
#[derive(Debug, Clone)]
pub struct MergedPullRequest {
    pub head_ref_name: String,
    pub head_ref_oid: String,
    pub merged_at: chrono::DateTime<chrono::Utc>,
    pub number: u64,
}

#[derive(Debug, serde::Deserialize)]
struct MergedPrJson {
    #[serde(rename = "headRefName")]
    head_ref_name: String,
    #[serde(rename = "headRefOid")]
    head_ref_oid: String,
    #[serde(rename = "mergedAt")]
    merged_at: chrono::DateTime<chrono::Utc>,
    number: u64,
}

const REPO_LIST_LIMIT: u32 = 1000;
const PR_LIST_LIMIT: u32 = 200;

/// For each `headRefName`, keep the most recently merged PR's `headRefOid`;
/// ties broken by the higher PR number (§9 open question, resolved
/// deterministically since `mergedAt` ties are otherwise unordered).
pub fn most_recent_merged_head_by_branch(
    prs: Vec<MergedPullRequest>,
) -> std::collections::HashMap<String, String> {
    let mut best: std::collections::HashMap<String, MergedPullRequest> =
        std::collections::HashMap::new();
    for pr in prs {
        match best.get(&pr.head_ref_name) {
            Some(existing)
                if (existing.merged_at, existing.number) >= (pr.merged_at, pr.number) => {}
            _ => {
                best.insert(pr.head_ref_name.clone(), pr);
            }
        }
    }
    best.into_iter().map(|(k, v)| (k, v.head_ref_oid)).collect()
}

pub struct ForgeClient {
    program: String,
    process: Arc<dyn ProcessRunner>,
    clock: Arc<dyn Clock>,
    gate: Arc<tokio::sync::Semaphore>,
}

impl ForgeClient {
    pub fn new(
        program: impl Into<String>,
        process: Arc<dyn ProcessRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            program: program.into(),
            process,
            clock,
            gate: Arc::new(tokio::sync::Semaphore::new(1)),
        }
    }

    /// Run the forge CLI with `args`, retrying on retryable stderr
    /// patterns up to `MAX_ATTEMPTS` times under the process-wide gate.
    pub async fn run_with_retry(
        &self,
        ctx: &CancellationToken,
        dir: Option<&Path>,
        args: &[String],
    ) -> Result<ProcessOutput, AppError> {
        let _permit = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(AppError::Cancelled("forge gate cancelled".to_string())),
            permit = self.gate.acquire() => permit.map_err(|_| AppError::Cancelled("forge gate closed".to_string()))?,
        };

        let mut last: Option<(String, String)> = None; // (combined output, raw stderr)

        for attempt in 1..=MAX_ATTEMPTS {
            let output = self.process.run(ctx, dir, &self.program, args).await?;
            if output.success {
                return Ok(output);
            }

            if !is_retryable(&output.stderr) {
                return Err(AppError::subprocess(
                    &self.program,
                    args,
                    output.combined_trimmed(),
                ));
            }

            last = Some((output.combined_trimmed(), output.stderr.clone()));

            if attempt == MAX_ATTEMPTS {
                break;
            }
            let delay = calc_delay(attempt, &last.as_ref().unwrap().1);
            self.clock.sleep(ctx, delay).await?;
        }

        let (combined, stderr) = last.expect("loop always records a last attempt before exiting");
        if is_rate_limit(&stderr) {
            Err(AppError::ForgeRateLimited(format!(
                "retry limit reached: {combined}"
            )))
        } else {
            Err(AppError::ForgeExhausted(format!(
                "retry limit reached: {combined}"
            )))
        }
    }

    /// List `owner`'s non-archived-and-archived repositories (§4.8 filters
    /// archived ones out at the call site).
    pub async fn list_repos(
        &self,
        ctx: &CancellationToken,
        owner: &str,
    ) -> Result<Vec<ForgeRepo>, AppError> {
        let args = vec![
            "repo".to_string(),
            "list".to_string(),
            owner.to_string(),
            "--limit".to_string(),
            REPO_LIST_LIMIT.to_string(),
            "--json".to_string(),
            "name,url,sshUrl,isArchived".to_string(),
        ];
        let output = self.run_with_retry(ctx, None, &args).await?;
        let parsed: Vec<ForgeRepoJson> = serde_json::from_str(&output.stdout)
            .map_err(|e| AppError::Other(anyhow::anyhow!("parsing forge repo list: {e}")))?;
        if parsed.len() as u32 >= REPO_LIST_LIMIT {
            tracing::warn!(owner, limit = REPO_LIST_LIMIT, "forge repo list hit its page limit");
        }
        Ok(parsed
            .into_iter()
            .map(|r| ForgeRepo {
                name: r.name,
                https_url: r.url,
                ssh_url: r.ssh_url,
                is_archived: r.is_archived,
            })
            .collect())
    }

    /// List merged pull requests whose base branch is `base`, for squash-merge
    /// detection (§4.7 preparation step).
    pub async fn list_merged_prs(
        &self,
        ctx: &CancellationToken,
        dir: Option<&Path>,
        base: &str,
    ) -> Result<Vec<MergedPullRequest>, AppError> {
        let args = vec![
            "pr".to_string(),
            "list".to_string(),
            "--state".to_string(),
            "merged".to_string(),
            "--base".to_string(),
            base.to_string(),
            "--limit".to_string(),
            PR_LIST_LIMIT.to_string(),
            "--json".to_string(),
            "headRefName,headRefOid,mergedAt,number".to_string(),
        ];
        let output = self.run_with_retry(ctx, dir, &args).await?;
        let parsed: Vec<MergedPrJson> = serde_json::from_str(&output.stdout)
            .map_err(|e| AppError::Other(anyhow::anyhow!("parsing merged PR list: {e}")))?;
        if parsed.len() as u32 >= PR_LIST_LIMIT {
            tracing::warn!(base, limit = PR_LIST_LIMIT, "merged PR list hit its page limit");
        }
        Ok(parsed
            .into_iter()
            .map(|pr| MergedPullRequest {
                head_ref_name: pr.head_ref_name,
                head_ref_oid: pr.head_ref_oid,
                merged_at: pr.merged_at,
                number: pr.number,
            })
            .collect())
    }
}
