//! Config loader (§4.13/N): finds and parses `~/.config/devsync/config.yaml`.

use crate::errors::AppError;
use devsync_common::config::Config;
use std::path::PathBuf;

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("devsync").join("config.yaml"))
}

/// Loads the user config, defaulting when the file is absent. A present but
/// unparsable file is a hard `Config` error; a missing file is not.
pub fn load() -> Result<Config, AppError> {
    let Some(path) = config_path() else {
        return Ok(Config::default());
    };

    match std::fs::read_to_string(&path) {
        Ok(raw) => serde_yaml::from_str(&raw)
            .map_err(|e| AppError::Config(format!("parsing {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(AppError::Config(format!("reading {}: {e}", path.display()))),
    }
}

/// §7 ConfigError: no config file and no `repo.root` means there is nothing
/// to sync against, so callers should hint at `config init` rather than
/// silently discovering zero repositories.
pub fn require_repo_root(config: &Config) -> Result<String, AppError> {
    config.repo.root.clone().ok_or_else(|| {
        AppError::Config(
            "repo.root is not set; run `devsync config init` or set it in config.yaml".to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_repo_root_errors_with_a_config_init_hint_when_unset() {
        let config = Config::default();
        let err = require_repo_root(&config).unwrap_err();
        assert!(err.to_string().contains("config init"));
    }

    #[test]
    fn require_repo_root_returns_the_configured_value() {
        let mut config = Config::default();
        config.repo.root = Some("~/code".to_string());
        assert_eq!(require_repo_root(&config).unwrap(), "~/code");
    }
}
