//! Types shared by the updater registry and orchestrator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageChange {
    pub name: String,
    pub current_version: Option<String>,
    pub new_version: Option<String>,
}

/// One manager's update pass outcome (§4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerUpdateResult {
    pub message: String,
    pub packages: Vec<PackageChange>,
    pub updated_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

/// Result of one package manager's update pass; merged commutatively
/// across phases by the update orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStats {
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl UpdateStats {
    pub fn merge(&mut self, other: UpdateStats) {
        self.updated += other.updated;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}
