//! Updater Registry (§4.4): the `Updater` capability plus the process-wide,
//! fixed-order registry of concrete package-manager drivers.

pub mod apt;
pub mod brew;
pub mod cargo;
pub mod npm;

use crate::errors::AppError;
use async_trait::async_trait;
use devsync_common::config::ManagerConfig;
use devsync_common::sysupdate::ManagerUpdateResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Names whose correctness precludes concurrent sibling execution.
pub const EXCLUSIVE_UPDATERS: &[&str] = &["apt"];

/// Names that default to requiring a sudo refresh before their phase runs,
/// absent an explicit per-manager override (§4.9 sudo determination).
pub const SUDO_BY_DEFAULT: &[&str] = &["apt", "snap"];

#[async_trait]
pub trait Updater: Send + Sync {
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;
    fn is_available(&self) -> bool;
    fn configure(&self, cfg: ManagerConfig);
    async fn update(
        &self,
        ctx: &CancellationToken,
        dry_run: bool,
    ) -> Result<ManagerUpdateResult, AppError>;
}

/// True iff `name` requires exclusive execution (§4.9 partition).
pub fn requires_exclusive(name: &str) -> bool {
    EXCLUSIVE_UPDATERS.contains(&name)
}

/// An updater requires a `sudo -v` refresh before its phase iff it is one
/// of `SUDO_BY_DEFAULT` and no explicit override says otherwise (§4.9).
pub fn requires_sudo(name: &str, cfg: Option<&ManagerConfig>) -> bool {
    if let Some(explicit) = cfg.and_then(|c| c.sudo_override()) {
        return explicit;
    }
    SUDO_BY_DEFAULT.contains(&name)
}

/// Process-wide, read-only-after-init registry of available updaters, in
/// their declared order.
pub struct UpdaterRegistry {
    updaters: Vec<Arc<dyn Updater>>,
}

impl UpdaterRegistry {
    pub fn new(updaters: Vec<Arc<dyn Updater>>) -> Self {
        Self { updaters }
    }

    /// The subset selected by `enable`, preserving registry order.
    /// Enabled-but-unavailable updaters are dropped with a warning.
    pub fn get_enabled(&self, enable: &[String]) -> Vec<Arc<dyn Updater>> {
        self.updaters
            .iter()
            .filter(|u| enable.iter().any(|name| name == u.name()))
            .filter(|u| {
                if u.is_available() {
                    true
                } else {
                    tracing::warn!(manager = u.name(), "enabled manager is not available on PATH; skipping");
                    false
                }
            })
            .cloned()
            .collect()
    }
}
