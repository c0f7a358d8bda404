//! Typed error hierarchy for the devsync core (§7).

use thiserror::Error;

/// Top-level error type threaded through every pipeline.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("retry limit reached: {0}")]
    ForgeExhausted(String),

    #[error("forge rate limit: {0}")]
    ForgeRateLimited(String),

    #[error("unsafe repository state: {0}")]
    UnsafeRepoState(String),

    #[error("repository root does not exist: {0}")]
    RepoRootNotFound(String),

    #[error("command `{program} {args}` failed: {output}")]
    Subprocess {
        program: String,
        args: String,
        output: String,
    },

    #[error("executable `{0}` not found on PATH")]
    ExecutableNotFound(String),

    #[error("secret provider error: {0}")]
    Secret(String),

    #[error("{0} phase(s) failed")]
    Composite(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True for the class of errors the job layer should classify as
    /// `Skipped` rather than `Failed` (§4.1 status resolution).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::Cancelled(_))
    }

    /// True for the "configured root doesn't exist" class, which pipelines
    /// use to decide whether to hint at `config init` (§7 ConfigError).
    pub fn is_root_not_found(&self) -> bool {
        matches!(self, AppError::RepoRootNotFound(_))
    }

    pub fn subprocess(program: impl Into<String>, args: &[String], output: impl Into<String>) -> Self {
        AppError::Subprocess {
            program: program.into(),
            args: args.join(" "),
            output: output.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_recognized() {
        let err = AppError::Cancelled("deadline exceeded".to_string());
        assert!(err.is_cancellation());
        let other = AppError::Secret("locked".to_string());
        assert!(!other.is_cancellation());
    }

    #[test]
    fn subprocess_error_message_includes_program_and_output() {
        let err = AppError::subprocess("git", &["status".to_string()], "fatal: not a repo");
        let msg = err.to_string();
        assert!(msg.contains("git status"));
        assert!(msg.contains("not a repo"));
    }
}
