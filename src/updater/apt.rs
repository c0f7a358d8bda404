//! `apt` driver (§4.4): declared exclusive, requires sudo by default.

use crate::errors::AppError;
use crate::process::{PathLookup, ProcessRunner};
use crate::updater::Updater;
use async_trait::async_trait;
use devsync_common::config::ManagerConfig;
use devsync_common::sysupdate::{ManagerUpdateResult, PackageChange};
use regex::Regex;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct AptUpdater {
    process: Arc<dyn ProcessRunner>,
    path_lookup: Arc<dyn PathLookup>,
    config: Mutex<ManagerConfig>,
}

impl AptUpdater {
    pub fn new(process: Arc<dyn ProcessRunner>, path_lookup: Arc<dyn PathLookup>) -> Self {
        Self {
            process,
            path_lookup,
            config: Mutex::new(ManagerConfig::default()),
        }
    }
}

/// Best-effort parse of `apt-get upgrade -y` output lines of the form
/// `Inst <name> [<current>] (<new> ...)`. Unparseable lines are ignored.
fn parse_upgrade_output(stdout: &str) -> Vec<PackageChange> {
    let re = Regex::new(r"^Inst (\S+) \[(\S+)\] \((\S+)").unwrap();
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
impl Updater for AptUpdater {
    fn name(&self) -> &str {
        "apt"
    }

    fn display_name(&self) -> &str {
        "APT"
    }

    fn is_available(&self) -> bool {
        self.path_lookup.find("apt-get").is_some()
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
                message: "would run: apt-get update && apt-get upgrade -y".to_string(),
                ..Default::default()
            });
        }

        self.process
            .run_checked(ctx, None, "apt-get", &["update".to_string()])
            .await?;
        let upgrade = self
            .process
            .run_checked(
                ctx,
                None,
                "apt-get",
                &["upgrade".to_string(), "-y".to_string()],
            )
            .await?;

        let packages = parse_upgrade_output(&upgrade.stdout);
        Ok(ManagerUpdateResult {
            message: "apt update complete".to_string(),
            updated_count: packages.len(),
            packages,
            failed_count: 0,
            errors: Vec::new(),
        })
    }
}
