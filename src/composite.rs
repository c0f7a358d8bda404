//! Daily Composite (§4.11): secrets → sys update → repo update, with each
//! phase isolated from its peers.

use crate::errors::AppError;
use crate::secrets::SecretProvider;
use crate::tui::{self, RequestSource, TuiRequest};
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub struct PhaseFailure {
    pub phase: String,
    pub message: String,
}

/// Flags shared across every phase of the composite.
pub struct CompositeFlags {
    pub dry_run: bool,
    pub jobs: usize,
    pub tui_request: TuiRequest,
    pub log_file: Option<String>,
}

/// Run the secrets phase: unlock then load-env, each caught rather than
/// propagated. A no-op if `secrets_enabled` is false.
pub async fn run_secrets_phase(
    ctx: &CancellationToken,
    provider: &dyn SecretProvider,
    secrets_enabled: bool,
) {
    if !secrets_enabled {
        tracing::info!("secrets phase disabled; skipping");
        return;
    }

    if let Err(e) = provider.unlock(ctx).await {
        tracing::warn!(error = %e, "vault unlock failed; skipping secrets phase");
        return;
    }

    match provider.load_env(ctx).await {
        Ok(stats) => tracing::info!(loaded = stats.loaded, skipped = stats.skipped, "secrets loaded"),
        Err(e) => tracing::warn!(error = %e, "loading environment variables failed"),
    }
}

/// Run `phases` in order; each phase's error is captured, not propagated,
/// so every later phase still runs. Returns a single composite error
/// summarizing all captured failures, if any.
pub async fn run_phases<F>(phases: Vec<(&str, F)>) -> Result<(), AppError>
where
    F: Future<Output = Result<(), AppError>>,
{
    let mut failures = Vec::new();
    for (name, fut) in phases {
        if let Err(e) = fut.await {
            failures.push(PhaseFailure {
                phase: name.to_string(),
                message: e.to_string(),
            });
        }
    }

    if failures.is_empty() {
        return Ok(());
    }

    let summary = failures
        .iter()
        .map(|f| format!("{}: {}", f.phase, f.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(AppError::Composite(summary))
}

/// Validate the `--tui`/`--no-tui` conflict before any phase runs.
pub fn validate_tui_flags(
    config_default: bool,
    tui_changed: bool,
    tui_value: bool,
    no_tui_changed: bool,
    no_tui_value: bool,
) -> Result<TuiRequest, AppError> {
    tui::resolve_tui_request(
        config_default,
        tui_changed,
        tui_value,
        no_tui_changed,
        no_tui_value,
    )
    .map_err(AppError::Config)
}

impl Default for CompositeFlags {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 0,
            tui_request: TuiRequest {
                requested: false,
                source: RequestSource::None,
            },
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_phases_succeed() {
        let result = run_phases(vec![
            ("sys", Box::pin(async { Ok(()) }) as std::pin::Pin<Box<dyn Future<Output = Result<(), AppError>>>>),
            ("repo", Box::pin(async { Ok(()) })),
        ])
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn one_phase_failing_does_not_stop_the_next_and_is_reported() {
        let executed_repo = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let executed_repo_inner = executed_repo.clone();

        let result = run_phases(vec![
            (
                "sys",
                Box::pin(async { Err(AppError::Other(anyhow::anyhow!("apt failed"))) })
                    as std::pin::Pin<Box<dyn Future<Output = Result<(), AppError>>>>,
            ),
            (
                "repo",
                Box::pin(async move {
                    executed_repo_inner.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                }),
            ),
        ])
        .await;

        assert!(executed_repo.load(std::sync::atomic::Ordering::SeqCst));
        let err = result.unwrap_err();
        assert!(matches!(err, AppError::Composite(_)));
        assert!(err.to_string().contains("sys"));
        assert!(!err.to_string().contains("repo:"));
    }

    #[test]
    fn tui_conflict_is_rejected_before_any_phase_runs() {
        let result = validate_tui_flags(false, true, true, true, true);
        assert!(result.is_err());
    }
}
