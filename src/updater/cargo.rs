//! `cargo install-update`-driven driver (§4.4): best-effort, parallelizable.
//!
//! `cargo-install-update` (from `cargo-update`) is an optional extension;
//! when it isn't on `PATH`, this driver reports itself unavailable rather
//! than failing, and the registry drops it with a warning if enabled.

use crate::errors::AppError;
use crate::process::{PathLookup, ProcessRunner};
use crate::updater::Updater;
use async_trait::async_trait;
use devsync_common::config::ManagerConfig;
use devsync_common::sysupdate::{ManagerUpdateResult, PackageChange};
use regex::Regex;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct CargoUpdater {
    process: Arc<dyn ProcessRunner>,
    path_lookup: Arc<dyn PathLookup>,
    config: Mutex<ManagerConfig>,
}

impl CargoUpdater {
    pub fn new(process: Arc<dyn ProcessRunner>, path_lookup: Arc<dyn PathLookup>) -> Self {
        Self {
            process,
            path_lookup,
            config: Mutex::new(ManagerConfig::default()),
        }
    }
}

/// Best-effort parse of `cargo install-update -a` lines of the form
/// `Updating name v1.0.0 -> v1.1.0`.
fn parse_update_output(stdout: &str) -> Vec<PackageChange> {
    let re = Regex::new(r"^Updating\s+(\S+)\s+v(\S+)\s*->\s*v(\S+)$").unwrap();
    stdout
        .lines()
        .filter_map(|line| {
            re.captures(line.trim()).map(|c| PackageChange {
                name: c[1].to_string(),
                current_version: Some(c[2].to_string()),
                new_version: Some(c[3].to_string()),
            })
        })
        .collect()
}

#[async_trait]
impl Updater for CargoUpdater {
    fn name(&self) -> &str {
        "cargo"
    }

    fn display_name(&self) -> &str {
        "cargo (installed binaries)"
    }

    fn is_available(&self) -> bool {
        self.path_lookup.find("cargo-install-update").is_some()
    }

    fn configure(&self, cfg: ManagerConfig) {
        *self.config.lock().unwrap() = cfg;
    }

    async fn update(
        &self,
        ctx: &CancellationToken,
        dry_run: bool,
    ) -> Result<ManagerUpdateResult, AppError> {
        if !self.is_available() {
            return Ok(ManagerUpdateResult {
                message: "cargo-install-update not on PATH; skipped".to_string(),
                ..Default::default()
            });
        }

        if dry_run {
            return Ok(ManagerUpdateResult {
                message: "would run: cargo install-update -a".to_string(),
                ..Default::default()
            });
        }

        let output = self
            .process
            .run_checked(
                ctx,
                None,
                "cargo",
                &["install-update".to_string(), "-a".to_string()],
            )
            .await?;

        let packages = parse_update_output(&output.stdout);
        Ok(ManagerUpdateResult {
            message: "cargo install-update complete".to_string(),
            updated_count: packages.len(),
            packages,
            failed_count: 0,
            errors: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::FakeProcessRunner;

    struct Found;
    impl PathLookup for Found {
        fn find(&self, _program: &str) -> Option<std::path::PathBuf> {
            Some(std::path::PathBuf::from("/home/user/.cargo/bin/cargo-install-update"))
        }
    }
    struct NotFound;
    impl PathLookup for NotFound {
        fn find(&self, _program: &str) -> Option<std::path::PathBuf> {
            None
        }
    }

    #[test]
    fn parses_updating_lines() {
        let stdout = "Updating ripgrep v13.0.0 -> v14.1.0\nnothing to do for bat\n";
        let packages = parse_update_output(stdout);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "ripgrep");
    }

    #[tokio::test]
    async fn unavailable_driver_is_a_graceful_no_op() {
        let process = Arc::new(FakeProcessRunner::new());
        let updater = CargoUpdater::new(process.clone(), Arc::new(NotFound));
        let ctx = CancellationToken::new();
        let result = updater.update(&ctx, false).await.unwrap();
        assert!(result.message.contains("not on PATH"));
        assert_eq!(process.calls().len(), 0);
    }

    #[tokio::test]
    async fn available_driver_runs_and_parses() {
        let process = Arc::new(FakeProcessRunner::new());
        process.push_success("Updating ripgrep v13.0.0 -> v14.1.0\n");
        let updater = CargoUpdater::new(process.clone(), Arc::new(Found));
        let ctx = CancellationToken::new();
        let result = updater.update(&ctx, false).await.unwrap();
        assert_eq!(result.updated_count, 1);
    }
}
