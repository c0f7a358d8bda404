//! Typed configuration schema (`~/.config/devsync/config.yaml`).
//!
//! Every field defaults to the value documented in the external interface
//! table, so a missing file — or a file missing individual keys — degrades
//! to sane behavior rather than an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub control: ControlConfig,
    pub repo: RepoConfig,
    pub sys: SysConfig,
    pub secrets: SecretsConfig,
    pub ui: UiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            control: ControlConfig::default(),
            repo: RepoConfig::default(),
            sys: SysConfig::default(),
            secrets: SecretsConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub concurrency: usize,
    #[serde(with = "duration_string")]
    pub timeout: Duration,
    pub dry_run: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(600),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub root: Option<String>,
    pub github: GithubConfig,
    pub sync: SyncConfig,
    pub cleanup: CleanupConfig,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            root: None,
            github: GithubConfig::default(),
            sync: SyncConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub owner: String,
    pub protocol: Protocol,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            protocol: Protocol::Https,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Https,
    Ssh,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub auto_stash: bool,
    pub prune: bool,
    pub submodule_update: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub target: Vec<String>,
    pub exclude_branches: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SysConfig {
    pub enable: Vec<String>,
    pub managers: HashMap<String, ManagerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub use_sudo: Option<bool>,
    pub sudo: Option<bool>,
}

impl ManagerConfig {
    /// Either explicit override, preferring `use_sudo` over the legacy `sudo` alias.
    pub fn sudo_override(&self) -> Option<bool> {
        self.use_sudo.or(self.sudo)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub enabled: bool,
    pub provider: String,
    pub items: Vec<String>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "bitwarden".to_string(),
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub tui: bool,
}

/// Parses the `control.timeout` duration string (e.g. `"10m"`, `"90s"`, `"2h"`).
mod duration_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{}s", d.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(raw: &str) -> Result<Duration, String> {
        let raw = raw.trim();
        let (num, unit) = raw.split_at(
            raw.find(|c: char| !c.is_ascii_digit() && c != '.')
                .unwrap_or(raw.len()),
        );
        let value: f64 = num
            .parse()
            .map_err(|_| format!("invalid duration '{raw}'"))?;
        let multiplier = match unit {
            "" | "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "ms" => 0.001,
            other => return Err(format!("unknown duration unit '{other}' in '{raw}'")),
        };
        Ok(Duration::from_secs_f64(value * multiplier))
    }
}

pub use duration_string::parse_duration as parse_duration_string;
