//! The `ProcessRunner` and `PathLookup` capabilities (§9 "subprocess seams").
//!
//! Every external process the core invokes — git, the forge CLI, package
//! managers, `sudo -v`, the secret CLI — goes through `ProcessRunner`
//! instead of touching `tokio::process::Command` directly, so pipeline
//! logic can be exercised against a scripted fake.

use crate::errors::AppError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Captured result of one subprocess invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Trimmed stdout+stderr, used to build `AppError::Subprocess`.
    pub fn combined_trimmed(&self) -> String {
        let mut combined = self.stdout.trim().to_string();
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(stderr);
        }
        combined
    }
}

/// Capability seam wrapping subprocess execution with cooperative cancellation.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        ctx: &CancellationToken,
        dir: Option<&Path>,
        program: &str,
        args: &[String],
    ) -> Result<ProcessOutput, AppError>;

    /// Convenience: run and turn a non-zero exit into `AppError::Subprocess`.
    async fn run_checked(
        &self,
        ctx: &CancellationToken,
        dir: Option<&Path>,
        program: &str,
        args: &[String],
    ) -> Result<ProcessOutput, AppError> {
        let output = self.run(ctx, dir, program, args).await?;
        if output.success {
            Ok(output)
        } else {
            Err(AppError::subprocess(program, args, output.combined_trimmed()))
        }
    }

    /// Like `run`, but with extra variables merged into the child's
    /// environment (used by `env run` / secret injection). Default
    /// implementation ignores `env` and delegates to `run`; implementors
    /// that can actually set a child's environment should override it.
    async fn run_with_env(
        &self,
        ctx: &CancellationToken,
        dir: Option<&Path>,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<ProcessOutput, AppError> {
        let _ = env;
        self.run(ctx, dir, program, args).await
    }
}

/// Production `ProcessRunner` backed by `tokio::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(
        &self,
        ctx: &CancellationToken,
        dir: Option<&Path>,
        program: &str,
        args: &[String],
    ) -> Result<ProcessOutput, AppError> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|_| AppError::ExecutableNotFound(program.to_string()))?;

        tokio::select! {
            _ = ctx.cancelled() => {
                child.start_kill().ok();
                Err(AppError::Cancelled(format!("{program} cancelled")))
            }
            result = child.wait_with_output() => {
                let output = result
                    .map_err(|e| AppError::Other(anyhow::anyhow!("failed to wait for {program}: {e}")))?;
                Ok(ProcessOutput {
                    success: output.status.success(),
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
    }

    async fn run_with_env(
        &self,
        ctx: &CancellationToken,
        dir: Option<&Path>,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<ProcessOutput, AppError> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|_| AppError::ExecutableNotFound(program.to_string()))?;

        tokio::select! {
            _ = ctx.cancelled() => {
                child.start_kill().ok();
                Err(AppError::Cancelled(format!("{program} cancelled")))
            }
            result = child.wait_with_output() => {
                let output = result
                    .map_err(|e| AppError::Other(anyhow::anyhow!("failed to wait for {program}: {e}")))?;
                Ok(ProcessOutput {
                    success: output.status.success(),
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
    }
}

/// `$PATH` lookup seam, used for `Updater::is_available()` and clear
/// "executable not found" errors rather than an opaque spawn failure.
pub trait PathLookup: Send + Sync {
    fn find(&self, program: &str) -> Option<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPathLookup;

impl PathLookup for SystemPathLookup {
    fn find(&self, program: &str) -> Option<PathBuf> {
        let path_var = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(program);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

/// Scripted `ProcessRunner` for tests: responses are consumed in FIFO order
/// regardless of program/args, matching the order pipeline code issues them.
#[derive(Default)]
pub struct FakeProcessRunner {
    responses: Mutex<VecDeque<Result<ProcessOutput, AppErrorKind>>>,
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    pub env_calls: Mutex<Vec<Vec<(String, String)>>>,
}

/// A cloneable stand-in for `AppError` (which isn't `Clone`) used only to
/// script fake failures.
#[derive(Debug, Clone)]
pub enum AppErrorKind {
    ExecutableNotFound(String),
    Other(String),
}

impl From<AppErrorKind> for AppError {
    fn from(kind: AppErrorKind) -> Self {
        match kind {
            AppErrorKind::ExecutableNotFound(p) => AppError::ExecutableNotFound(p),
            AppErrorKind::Other(msg) => AppError::Other(anyhow::anyhow!(msg)),
        }
    }
}

impl FakeProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&self, stdout: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(ProcessOutput::ok(stdout)));
    }

    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(ProcessOutput::failure(code, stderr)));
    }

    pub fn push_error(&self, kind: AppErrorKind) {
        self.responses.lock().unwrap().push_back(Err(kind));
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn env_calls(&self) -> Vec<Vec<(String, String)>> {
        self.env_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeProcessRunner {
    async fn run(
        &self,
        ctx: &CancellationToken,
        _dir: Option<&Path>,
        program: &str,
        args: &[String],
    ) -> Result<ProcessOutput, AppError> {
        if ctx.is_cancelled() {
            return Err(AppError::Cancelled(format!("{program} cancelled")));
        }
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(kind)) => Err(kind.into()),
            None => Ok(ProcessOutput::ok("")),
        }
    }

    async fn run_with_env(
        &self,
        ctx: &CancellationToken,
        dir: Option<&Path>,
        program: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<ProcessOutput, AppError> {
        self.env_calls.lock().unwrap().push(env.to_vec());
        self.run(ctx, dir, program, args).await
    }
}
