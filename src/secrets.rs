//! Secret Provider (§4.12): vault unlock and environment injection behind
//! a capability trait, with a `bw` (Bitwarden CLI) default implementation.

use crate::errors::AppError;
use crate::process::ProcessRunner;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

pub const ENV_LOADED_FLAG: &str = "DEVSYNC_ENV_LOADED";
const SESSION_ENV_VAR: &str = "BW_SESSION";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvStats {
    pub loaded: usize,
    pub skipped: usize,
}

/// Exit status of a command spawned with injected secrets (`env run`).
#[derive(Debug, Clone, Copy)]
pub struct ExitOutcome {
    pub code: i32,
}

#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn unlock(&self, ctx: &CancellationToken) -> Result<(), AppError>;
    async fn load_env(&self, ctx: &CancellationToken) -> Result<EnvStats, AppError>;
    async fn get_env_vars(&self, ctx: &CancellationToken) -> Result<HashMap<String, String>, AppError>;
    async fn run_with_env(
        &self,
        ctx: &CancellationToken,
        cmd: &str,
        args: &[String],
    ) -> Result<ExitOutcome, AppError>;
}

/// Each custom field/note line from `bw list items` rendered as `KEY=VALUE`.
fn parse_env_pairs(raw_items_json: &str) -> Result<Vec<(String, String)>, AppError> {
    #[derive(serde::Deserialize)]
    struct Field {
        name: Option<String>,
        value: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct Item {
        #[serde(default)]
        fields: Vec<Field>,
        #[serde(default)]
        notes: Option<String>,
    }

    let items: Vec<Item> = serde_json::from_str(raw_items_json)
        .map_err(|e| AppError::Secret(format!("parsing vault item list: {e}")))?;

    let mut pairs = Vec::new();
    for item in items {
        for field in item.fields {
            if let (Some(name), Some(value)) = (field.name, field.value) {
                pairs.push((name, value));
            }
        }
        if let Some(notes) = item.notes {
            for line in notes.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    pairs.push((key.trim().to_string(), value.trim().to_string()));
                }
            }
        }
    }
    Ok(pairs)
}

pub struct BitwardenProvider {
    process: std::sync::Arc<dyn ProcessRunner>,
    items: Vec<String>,
    session: Mutex<Option<String>>,
    loaded_vars: RwLock<HashMap<String, String>>,
}

impl BitwardenProvider {
    pub fn new(process: std::sync::Arc<dyn ProcessRunner>, items: Vec<String>) -> Self {
        Self {
            process,
            items,
            session: Mutex::new(None),
            loaded_vars: RwLock::new(HashMap::new()),
        }
    }

    fn session_args(&self) -> Vec<String> {
        match self.session.lock().unwrap().clone() {
            Some(session) => vec!["--session".to_string(), session],
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl SecretProvider for BitwardenProvider {
    async fn unlock(&self, ctx: &CancellationToken) -> Result<(), AppError> {
        let output = self
            .process
            .run(
                ctx,
                None,
                "bw",
                &["unlock".to_string(), "--raw".to_string()],
            )
            .await?;
        if !output.success {
            return Err(AppError::Secret(output.combined_trimmed()));
        }
        let session = output.stdout.trim().to_string();
        std::env::set_var(SESSION_ENV_VAR, &session);
        *self.session.lock().unwrap() = Some(session);
        Ok(())
    }

    async fn load_env(&self, ctx: &CancellationToken) -> Result<EnvStats, AppError> {
        if std::env::var(ENV_LOADED_FLAG).as_deref() == Ok("1") {
            return Ok(EnvStats::default());
        }

        let queries: Vec<String> = if self.items.is_empty() {
            vec![String::new()]
        } else {
            self.items.clone()
        };

        let mut loaded = 0usize;
        let mut skipped = 0usize;
        let mut merged = HashMap::new();

        for query in queries {
            let mut args = vec!["list".to_string(), "items".to_string()];
            args.extend(self.session_args());
            if !query.is_empty() {
                args.push("--search".to_string());
                args.push(query);
            }
            let output = self
                .process
                .run_checked(ctx, None, "bw", &args)
                .await
                .map_err(|e| AppError::Secret(e.to_string()))?;

            let pairs = parse_env_pairs(&output.stdout)?;
            for (key, value) in pairs {
                if key.is_empty() {
                    skipped += 1;
                    continue;
                }
                std::env::set_var(&key, &value);
                merged.insert(key, value);
                loaded += 1;
            }
        }

        *self.loaded_vars.write().unwrap() = merged;
        Ok(EnvStats { loaded, skipped })
    }

    async fn get_env_vars(&self, _ctx: &CancellationToken) -> Result<HashMap<String, String>, AppError> {
        Ok(self.loaded_vars.read().unwrap().clone())
    }

    async fn run_with_env(
        &self,
        ctx: &CancellationToken,
        cmd: &str,
        args: &[String],
    ) -> Result<ExitOutcome, AppError> {
        let env: Vec<(String, String)> = self
            .loaded_vars
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let output = self.process.run_with_env(ctx, None, cmd, args, &env).await?;
        Ok(ExitOutcome {
            code: output.code.unwrap_or(if output.success { 0 } else { 1 }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::FakeProcessRunner;
    use std::sync::Arc;

    fn isolate_env_vars() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: Mutex<()> = Mutex::new(());
        LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[tokio::test]
    async fn unlock_sets_bw_session_from_stdout() {
        let _guard = isolate_env_vars();
        std::env::remove_var(SESSION_ENV_VAR);
        let process = Arc::new(FakeProcessRunner::new());
        process.push_success("session-token-abc\n");
        let provider = BitwardenProvider::new(process, vec![]);
        let ctx = CancellationToken::new();
        provider.unlock(&ctx).await.unwrap();
        assert_eq!(std::env::var(SESSION_ENV_VAR).unwrap(), "session-token-abc");
    }

    #[tokio::test]
    async fn load_env_parses_fields_and_notes_and_skips_when_flag_set() {
        let _guard = isolate_env_vars();
        std::env::set_var(ENV_LOADED_FLAG, "1");
        let process = Arc::new(FakeProcessRunner::new());
        let provider = BitwardenProvider::new(process.clone(), vec![]);
        let ctx = CancellationToken::new();
        let stats = provider.load_env(&ctx).await.unwrap();
        assert_eq!(stats, EnvStats::default());
        assert_eq!(process.calls().len(), 0);
        std::env::remove_var(ENV_LOADED_FLAG);
    }

    #[tokio::test]
    async fn load_env_sets_vars_from_fields_and_notes() {
        let _guard = isolate_env_vars();
        std::env::remove_var(ENV_LOADED_FLAG);
        let process = Arc::new(FakeProcessRunner::new());
        process.push_success(
            r#"[{"fields":[{"name":"API_KEY","value":"secret123"}],"notes":"OTHER=value2\n"}]"#,
        );
        let provider = BitwardenProvider::new(process, vec![]);
        let ctx = CancellationToken::new();
        let stats = provider.load_env(&ctx).await.unwrap();
        assert_eq!(stats.loaded, 2);
        assert_eq!(std::env::var("API_KEY").unwrap(), "secret123");
        assert_eq!(std::env::var("OTHER").unwrap(), "value2");
    }

    #[test]
    fn parse_env_pairs_tolerates_missing_fields() {
        let pairs = parse_env_pairs(r#"[{"fields":[],"notes":null}]"#).unwrap();
        assert!(pairs.is_empty());
    }

    #[tokio::test]
    async fn run_with_env_merges_loaded_vars_into_the_child_process() {
        let _guard = isolate_env_vars();
        std::env::remove_var(ENV_LOADED_FLAG);
        let process = Arc::new(FakeProcessRunner::new());
        process.push_success(r#"[{"fields":[{"name":"API_KEY","value":"secret123"}],"notes":null}]"#);
        process.push_success("");
        let provider = BitwardenProvider::new(process.clone(), vec![]);
        let ctx = CancellationToken::new();
        provider.load_env(&ctx).await.unwrap();

        provider
            .run_with_env(&ctx, "printenv", &["API_KEY".to_string()])
            .await
            .unwrap();

        let env_calls = process.env_calls();
        assert_eq!(env_calls.len(), 1);
        assert!(env_calls[0].contains(&("API_KEY".to_string(), "secret123".to_string())));
    }
}
