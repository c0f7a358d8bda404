//! Global npm package driver (§4.4): parallelizable, never requires sudo.

use crate::errors::AppError;
use crate::process::{PathLookup, ProcessRunner};
use crate::updater::Updater;
use async_trait::async_trait;
use devsync_common::config::ManagerConfig;
use devsync_common::sysupdate::{ManagerUpdateResult, PackageChange};
use regex::Regex;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct NpmUpdater {
    process: Arc<dyn ProcessRunner>,
    path_lookup: Arc<dyn PathLookup>,
    config: Mutex<ManagerConfig>,
}

impl NpmUpdater {
    pub fn new(process: Arc<dyn ProcessRunner>, path_lookup: Arc<dyn PathLookup>) -> Self {
        Self {
            process,
            path_lookup,
            config: Mutex::new(ManagerConfig::default()),
        }
    }
}

/// Best-effort parse of `npm update -g` lines of the form `+ name@version`.
fn parse_update_output(stdout: &str) -> Vec<PackageChange> {
    let re = Regex::new(r"^\+\s+(\S+)@(\S+)$").unwrap();
    stdout
        .lines()
        .filter_map(|line| {
            re.captures(line.trim()).map(|c| PackageChange {
                name: c[1].to_string(),
                current_version: None,
                new_version: Some(c[2].to_string()),
            })
        })
        .collect()
}

#[async_trait]
impl Updater for NpmUpdater {
    fn name(&self) -> &str {
        "npm"
    }

    fn display_name(&self) -> &str {
        "npm (global packages)"
    }

    fn is_available(&self) -> bool {
        self.path_lookup.find("npm").is_some()
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
                message: "would run: npm update -g".to_string(),
                ..Default::default()
            });
        }

        let output = self
            .process
            .run_checked(ctx, None, "npm", &["update".to_string(), "-g".to_string()])
            .await?;

        let packages = parse_update_output(&output.stdout);
        Ok(ManagerUpdateResult {
            message: "npm global update complete".to_string(),
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
            Some(std::path::PathBuf::from("/usr/local/bin/npm"))
        }
    }

    #[test]
    fn parses_plus_lines() {
        let stdout = "added 1 package\n+ typescript@5.4.2\n";
        let packages = parse_update_output(stdout);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "typescript");
        assert_eq!(packages[0].new_version.as_deref(), Some("5.4.2"));
    }

    #[tokio::test]
    async fn real_run_invokes_update_dash_g() {
        let process = Arc::new(FakeProcessRunner::new());
        process.push_success("+ typescript@5.4.2\n");
        let updater = NpmUpdater::new(process.clone(), Arc::new(Found));
        let ctx = CancellationToken::new();
        let result = updater.update(&ctx, false).await.unwrap();
        assert_eq!(result.updated_count, 1);
        assert_eq!(
            process.calls()[0],
            ("npm".to_string(), vec!["update".to_string(), "-g".to_string()])
        );
    }
}
