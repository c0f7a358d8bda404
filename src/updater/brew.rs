//! Homebrew driver (§4.4): parallelizable, never requires sudo.

use crate::errors::AppError;
use crate::process::{PathLookup, ProcessRunner};
use crate::updater::Updater;
use async_trait::async_trait;
use devsync_common::config::ManagerConfig;
use devsync_common::sysupdate::{ManagerUpdateResult, PackageChange};
use regex::Regex;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct BrewUpdater {
    process: Arc<dyn ProcessRunner>,
    path_lookup: Arc<dyn PathLookup>,
    config: Mutex<ManagerConfig>,
}

impl BrewUpdater {
    pub fn new(process: Arc<dyn ProcessRunner>, path_lookup: Arc<dyn PathLookup>) -> Self {
        Self {
            process,
            path_lookup,
            config: Mutex::new(ManagerConfig::default()),
        }
    }
}

/// Best-effort parse of `brew upgrade` lines of the form `name old -> new`.
fn parse_upgrade_output(stdout: &str) -> Vec<PackageChange> {
    let re = Regex::new(r"^(\S+)\s+(\S+)\s*->\s*(\S+)$").unwrap();
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
impl Updater for BrewUpdater {
    fn name(&self) -> &str {
        "brew"
    }

    fn display_name(&self) -> &str {
        "Homebrew"
    }

    fn is_available(&self) -> bool {
        self.path_lookup.find("brew").is_some()
    }

    fn configure(&self, cfg: ManagerConfig) {
        *self.config.lock().unwrap() = cfg;
    }

    async fn update(
        &self,
        ctx: &CancellationToken,
        dry_run: bool,
    ) -> Result<ManagerUpdateResult, AppError> {
        if dry_run {
            return Ok(ManagerUpdateResult {
                message: "would run: brew update && brew upgrade".to_string(),
                ..Default::default()
            });
        }

        self.process
            .run_checked(ctx, None, "brew", &["update".to_string()])
            .await?;
        let upgrade = self
            .process
            .run_checked(ctx, None, "brew", &["upgrade".to_string()])
            .await?;

        let packages = parse_upgrade_output(&upgrade.stdout);
        Ok(ManagerUpdateResult {
            message: "brew update complete".to_string(),
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
            Some(std::path::PathBuf::from("/opt/homebrew/bin/brew"))
        }
    }

    #[test]
    fn parses_arrow_lines() {
        let stdout = "==> Upgrading 2 outdated packages:\nfoo 1.0 -> 2.0\nbar 1.2.3 -> 1.3.0\n";
        let packages = parse_upgrade_output(stdout);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "foo");
        assert_eq!(packages[1].new_version.as_deref(), Some("1.3.0"));
    }

    #[tokio::test]
    async fn real_run_invokes_update_then_upgrade() {
        let process = Arc::new(FakeProcessRunner::new());
        process.push_success("");
        process.push_success("foo 1.0 -> 2.0\n");
        let updater = BrewUpdater::new(process.clone(), Arc::new(Found));
        let ctx = CancellationToken::new();
        let result = updater.update(&ctx, false).await.unwrap();
        assert_eq!(result.updated_count, 1);
    }
}
