use clap::{Parser, Subcommand};
use console::Term;
use devsync::clock::SystemClock;
use devsync::composite;
use devsync::config;
use devsync::env_cmd::{self, ShellDialect};
use devsync::errors::AppError;
use devsync::event_log::EventLogger;
use devsync::forge::ForgeClient;
use devsync::orchestrator;
use devsync::process::{ProcessRunner, SystemPathLookup, SystemProcessRunner};
use devsync::repo::{bootstrap, cleanup, inspector};
use devsync::secrets::{BitwardenProvider, SecretProvider};
use devsync::tui::{self, TuiRequest};
use devsync::updater::apt::AptUpdater;
use devsync::updater::brew::BrewUpdater;
use devsync::updater::cargo::CargoUpdater;
use devsync::updater::npm::NpmUpdater;
use devsync::updater::{Updater, UpdaterRegistry};
use devsync_common::config::Config;
use devsync_common::job::{JobResult, Summary};
use devsync_common::repo::{CleanupOptions, CleanupTarget, UpdateOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "devsync", version, about = "Developer workstation sync")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Secrets → sys update → repo update, in one pass.
    Run {
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value_t = 0)]
        jobs: usize,
        #[arg(long)]
        tui: bool,
        #[arg(long)]
        no_tui: bool,
        #[arg(long)]
        log_file: Option<PathBuf>,
        /// Deadline for the whole run, e.g. "90s", "10m" (default: control.timeout).
        #[arg(long)]
        timeout: Option<String>,
    },
    Sys {
        #[command(subcommand)]
        command: SysCommands,
    },
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Stub: not implemented in this build.
    Doctor,
}

#[derive(Subcommand)]
enum SysCommands {
    Update {
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value_t = 0)]
        jobs: usize,
        #[arg(long)]
        tui: bool,
        #[arg(long)]
        no_tui: bool,
        /// Deadline for this update, e.g. "90s", "10m" (default: control.timeout).
        #[arg(long)]
        timeout: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
enum RepoCommands {
    List {
        #[arg(long)]
        root: Option<String>,
    },
    Update {
        #[arg(long)]
        root: Option<String>,
        #[arg(long, default_value_t = 0)]
        jobs: usize,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        submodule: bool,
        #[arg(long)]
        no_submodule: bool,
        #[arg(long)]
        tui: bool,
        #[arg(long)]
        no_tui: bool,
        /// Deadline for this update, e.g. "90s", "10m" (default: control.timeout).
        #[arg(long)]
        timeout: Option<String>,
    },
    Cleanup {
        #[arg(long)]
        root: Option<String>,
        #[arg(long, default_value_t = 0)]
        jobs: usize,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        tui: bool,
        #[arg(long)]
        no_tui: bool,
        #[arg(long)]
        log_file: Option<PathBuf>,
        /// Deadline for this cleanup, e.g. "90s", "10m" (default: control.timeout).
        #[arg(long)]
        timeout: Option<String>,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    Export,
    Run {
        cmd: String,
        args: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Stub: not implemented in this build.
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(code);
}

fn resolve_tui(config_default: bool, tui: bool, no_tui: bool) -> Result<TuiRequest, AppError> {
    composite::validate_tui_flags(config_default, tui, tui, no_tui, no_tui)
}

/// CLI `--timeout` overrides `control.timeout` when present.
fn resolve_timeout(flag: Option<&str>, config_timeout: Duration) -> Result<Duration, AppError> {
    match flag {
        Some(raw) => devsync_common::config::parse_duration_string(raw).map_err(AppError::Config),
        None => Ok(config_timeout),
    }
}

/// Races a deadline against `ctx`'s own cancellation and cancels `ctx` if the
/// deadline fires first. Returns the join handle so callers can let it run
/// to completion; it exits immediately once `ctx` is cancelled by any source.
fn spawn_deadline(ctx: CancellationToken, timeout: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                eprintln!("devsync: timed out after {timeout:?}, cancelling...");
                ctx.cancel();
            }
            _ = ctx.cancelled() => {}
        }
    })
}

fn warn_if_tui_unavailable(request: TuiRequest) {
    let term_out = Term::stdout();
    let term_err = Term::stderr();
    let (_enabled, warning) =
        tui::resolve_tui_enabled_by_terminal(request, term_out.is_term(), term_err.is_term());
    if let Some(warning) = warning {
        tracing::warn!("{warning}");
    }
}

fn build_registry(process: Arc<dyn ProcessRunner>) -> UpdaterRegistry {
    let path_lookup = Arc::new(SystemPathLookup);
    UpdaterRegistry::new(vec![
        Arc::new(AptUpdater::new(process.clone(), path_lookup.clone())),
        Arc::new(BrewUpdater::new(process.clone(), path_lookup.clone())),
        Arc::new(NpmUpdater::new(process.clone(), path_lookup.clone())),
        Arc::new(CargoUpdater::new(process, path_lookup)),
    ])
}

fn build_secret_provider(process: Arc<dyn ProcessRunner>, config: &Config) -> Arc<dyn SecretProvider> {
    Arc::new(BitwardenProvider::new(process, config.secrets.items.clone()))
}

async fn run(cli: Cli) -> Result<i32, AppError> {
    let config = config::load()?;
    let ctx = CancellationToken::new();
    let process: Arc<dyn ProcessRunner> = Arc::new(SystemProcessRunner);

    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("devsync: interrupted, cancelling...");
                ctx.cancel();
            }
        });
    }

    match cli.command {
        Commands::Run {
            dry_run,
            jobs,
            tui,
            no_tui,
            log_file,
            timeout,
        } => {
            cmd_run(
                &ctx, process, &config, dry_run, jobs, tui, no_tui, log_file, timeout,
            )
            .await
        }
        Commands::Sys { command } => match command {
            SysCommands::Update {
                dry_run,
                jobs,
                tui,
                no_tui,
                timeout,
            } => cmd_sys_update(&ctx, process, &config, dry_run, jobs, tui, no_tui, timeout).await,
            SysCommands::List => cmd_sys_list(process),
        },
        Commands::Repo { command } => match command {
            RepoCommands::List { root } => cmd_repo_list(&ctx, process, &config, root).await,
            RepoCommands::Update {
                root,
                jobs,
                dry_run,
                submodule,
                no_submodule,
                tui,
                no_tui,
                timeout,
            } => {
                cmd_repo_update(
                    &ctx, process, &config, root, jobs, dry_run, submodule, no_submodule, tui,
                    no_tui, timeout,
                )
                .await
            }
            RepoCommands::Cleanup {
                root,
                jobs,
                dry_run,
                tui,
                no_tui,
                log_file,
                timeout,
            } => {
                cmd_repo_cleanup(
                    &ctx, process, &config, root, jobs, dry_run, tui, no_tui, log_file, timeout,
                )
                .await
            }
        },
        Commands::Env { command } => match command {
            EnvCommands::Export => cmd_env_export(&ctx, process, &config).await,
            EnvCommands::Run { cmd, args } => cmd_env_run(&ctx, process, &config, cmd, args).await,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Init => {
                println!("config init: not implemented in this build");
                Ok(0)
            }
        },
        Commands::Doctor => {
            println!("doctor: not implemented in this build");
            Ok(0)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    config: &Config,
    dry_run: bool,
    jobs: usize,
    tui: bool,
    no_tui: bool,
    log_file: Option<PathBuf>,
    timeout: Option<String>,
) -> Result<i32, AppError> {
    let request = resolve_tui(config.ui.tui, tui, no_tui)?;
    warn_if_tui_unavailable(request);

    let timeout = resolve_timeout(timeout.as_deref(), config.control.timeout)?;
    let _deadline = spawn_deadline(ctx.clone(), timeout);

    let started = Instant::now();
    let logger = log_file
        .as_deref()
        .map(|path| EventLogger::create(path, "devsync"))
        .transpose()
        .map_err(|e| AppError::Config(e.to_string()))?;

    if config.secrets.enabled {
        let secrets = build_secret_provider(process.clone(), config);
        composite::run_secrets_phase(ctx, secrets.as_ref(), true).await;
    } else {
        composite::run_secrets_phase(ctx, &NoopSecretProvider, false).await;
    }

    let sys_concurrency = orchestrator::resolve_jobs(jobs, config.control.concurrency);
    let sys_dry_run = dry_run || config.control.dry_run;
    let process_for_sys = process.clone();
    let config_for_sys = config.clone();
    let sys_phase = async move {
        let registry = build_registry(process_for_sys.clone());
        let enabled = registry.get_enabled(&config_for_sys.sys.enable);
        let stats = orchestrator::run(
            ctx,
            process_for_sys.as_ref(),
            enabled,
            sys_concurrency,
            sys_dry_run,
            &config_for_sys.sys.managers,
        )
        .await?;
        tracing::info!(updated = stats.updated, failed = stats.failed, "sys update complete");
        if stats.failed > 0 {
            return Err(AppError::Other(anyhow::anyhow!(
                "{} manager(s) reported failures",
                stats.failed
            )));
        }
        Ok(())
    };

    let repo_concurrency = sys_concurrency;
    let process_for_repo = process.clone();
    let config_for_repo = config.clone();
    let repo_phase = async move {
        run_repo_pipeline(
            ctx,
            process_for_repo,
            &config_for_repo,
            None,
            repo_concurrency,
            sys_dry_run,
            config_for_repo.repo.sync.submodule_update,
        )
        .await
    };

    let result = composite::run_phases(vec![
        (
            "sys",
            Box::pin(sys_phase) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), AppError>> + '_>>,
        ),
        ("repo", Box::pin(repo_phase)),
    ])
    .await;

    if let Some(logger) = logger {
        let mut summary = Summary::new(2);
        let phase_names = ["sys", "repo"];
        for name in phase_names {
            let failed = result
                .as_ref()
                .err()
                .map(|e| e.to_string().contains(name))
                .unwrap_or(false);
            summary.push(if failed {
                JobResult::failed(name, "phase reported failures", Duration::from_secs(0))
            } else {
                JobResult::success(name, Duration::from_secs(0))
            });
        }
        logger
            .close(&summary, started.elapsed())
            .map_err(|e| AppError::Config(e.to_string()))?;
    }

    match result {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("devsync run: {e}");
            Ok(1)
        }
    }
}

/// Stand-in used when the secrets phase is disabled entirely so the
/// composite's skip-logging path still runs through one code path.
struct NoopSecretProvider;

#[async_trait::async_trait]
impl SecretProvider for NoopSecretProvider {
    async fn unlock(&self, _ctx: &CancellationToken) -> Result<(), AppError> {
        Ok(())
    }
    async fn load_env(
        &self,
        _ctx: &CancellationToken,
    ) -> Result<devsync::secrets::EnvStats, AppError> {
        Ok(devsync::secrets::EnvStats::default())
    }
    async fn get_env_vars(
        &self,
        _ctx: &CancellationToken,
    ) -> Result<std::collections::HashMap<String, String>, AppError> {
        Ok(std::collections::HashMap::new())
    }
    async fn run_with_env(
        &self,
        _ctx: &CancellationToken,
        _cmd: &str,
        _args: &[String],
    ) -> Result<devsync::secrets::ExitOutcome, AppError> {
        Ok(devsync::secrets::ExitOutcome { code: 0 })
    }
}

async fn cmd_sys_update(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    config: &Config,
    dry_run: bool,
    jobs: usize,
    tui: bool,
    no_tui: bool,
    timeout: Option<String>,
) -> Result<i32, AppError> {
    let request = resolve_tui(config.ui.tui, tui, no_tui)?;
    warn_if_tui_unavailable(request);

    let timeout = resolve_timeout(timeout.as_deref(), config.control.timeout)?;
    let _deadline = spawn_deadline(ctx.clone(), timeout);

    let registry = build_registry(process.clone());
    let enabled = registry.get_enabled(&config.sys.enable);
    let concurrency = orchestrator::resolve_jobs(jobs, config.control.concurrency);
    let stats = orchestrator::run(
        ctx,
        process.as_ref(),
        enabled,
        concurrency,
        dry_run || config.control.dry_run,
        &config.sys.managers,
    )
    .await?;

    println!("updated: {}", stats.updated);
    println!("failed: {}", stats.failed);
    for err in &stats.errors {
        eprintln!("  - {err}");
    }
    Ok(if stats.failed > 0 { 1 } else { 0 })
}

fn cmd_sys_list(process: Arc<dyn ProcessRunner>) -> Result<i32, AppError> {
    let registry = build_registry(process);
    let all_names: Vec<String> = ["apt", "brew", "npm", "cargo"].iter().map(|s| s.to_string()).collect();
    let available: Vec<String> = registry
        .get_enabled(&all_names)
        .iter()
        .map(|u| u.name().to_string())
        .collect();
    for name in ["apt", "brew", "npm", "cargo"] {
        let tag = if available.iter().any(|a| a == name) { "available" } else { "unavailable" };
        println!("{name:<8} {tag}");
    }
    Ok(0)
}

async fn cmd_repo_list(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    config: &Config,
    root_flag: Option<String>,
) -> Result<i32, AppError> {
    let root = root_flag
        .or_else(|| config.repo.root.clone())
        .ok_or_else(|| config::require_repo_root(config).unwrap_err())?;
    let paths = inspector::discover(&root)?;

    for path in &paths {
        let info = inspector::inspect(ctx, process.as_ref(), path).await?;
        println!("{:<10} {}", format!("{:?}", info.status), path.display());
    }
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
async fn cmd_repo_update(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    config: &Config,
    root_flag: Option<String>,
    jobs: usize,
    dry_run: bool,
    submodule: bool,
    no_submodule: bool,
    tui: bool,
    no_tui: bool,
    timeout: Option<String>,
) -> Result<i32, AppError> {
    let request = resolve_tui(config.ui.tui, tui, no_tui)?;
    warn_if_tui_unavailable(request);

    let timeout = resolve_timeout(timeout.as_deref(), config.control.timeout)?;
    let _deadline = spawn_deadline(ctx.clone(), timeout);

    let submodule_update = if no_submodule {
        false
    } else if submodule {
        true
    } else {
        config.repo.sync.submodule_update
    };

    let concurrency = orchestrator::resolve_jobs(jobs, config.control.concurrency);
    let outcome = run_repo_pipeline(
        ctx,
        process,
        config,
        root_flag,
        concurrency,
        dry_run || config.control.dry_run,
        submodule_update,
    )
    .await;

    match outcome {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("devsync repo update: {e}");
            Ok(1)
        }
    }
}

async fn run_repo_pipeline(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    config: &Config,
    root_flag: Option<String>,
    concurrency: usize,
    dry_run: bool,
    submodule_update: bool,
) -> Result<(), AppError> {
    let root = root_flag
        .or_else(|| config.repo.root.clone())
        .ok_or_else(|| config::require_repo_root(config).unwrap_err())?;

    let mut paths = inspector::discover(&root)?;

    if !config.repo.github.owner.is_empty() {
        let forge = Arc::new(ForgeClient::new("gh", process.clone(), Arc::new(SystemClock)));
        let outcome = bootstrap::bootstrap(
            ctx,
            process.as_ref(),
            &forge,
            &root,
            &config.repo.github.owner,
            config.repo.github.protocol,
            dry_run,
        )
        .await?;
        paths = bootstrap::merge_with_discovered(outcome.ready_paths, paths);
    }

    let opts = UpdateOptions {
        prune: config.repo.sync.prune,
        auto_stash: config.repo.sync.auto_stash,
        submodule_update,
        dry_run,
    };

    let results = devsync::repo::run_update_all(ctx, process, paths, opts, concurrency).await;
    let failed = results.iter().filter(|r| r.is_err()).count();
    for result in &results {
        if let Err(e) = result {
            tracing::warn!(error = %e, "repo update failed");
        }
    }
    if failed > 0 {
        return Err(AppError::Other(anyhow::anyhow!(
            "{failed} repo(s) failed to update"
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_repo_cleanup(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    config: &Config,
    root_flag: Option<String>,
    jobs: usize,
    dry_run: bool,
    tui: bool,
    no_tui: bool,
    log_file: Option<PathBuf>,
    timeout: Option<String>,
) -> Result<i32, AppError> {
    let request = resolve_tui(config.ui.tui, tui, no_tui)?;
    warn_if_tui_unavailable(request);

    let timeout = resolve_timeout(timeout.as_deref(), config.control.timeout)?;
    let _deadline = spawn_deadline(ctx.clone(), timeout);

    if !config.repo.cleanup.enabled {
        println!("repo cleanup is disabled in config.yaml; nothing to do");
        return Ok(0);
    }

    let root = root_flag
        .or_else(|| config.repo.root.clone())
        .ok_or_else(|| config::require_repo_root(config).unwrap_err())?;
    let paths = inspector::discover(&root)?;

    let targets: Vec<CleanupTarget> = config
        .repo
        .cleanup
        .target
        .iter()
        .filter_map(|t| match t.as_str() {
            "merged" => Some(CleanupTarget::Merged),
            "squashed" => Some(CleanupTarget::Squashed),
            _ => None,
        })
        .collect();

    let wants_squashed = targets.contains(&CleanupTarget::Squashed);
    let forge = if wants_squashed && !config.repo.github.owner.is_empty() {
        Some(Arc::new(ForgeClient::new(
            "gh",
            process.clone(),
            Arc::new(SystemClock),
        )))
    } else {
        None
    };

    let concurrency = orchestrator::resolve_jobs(jobs, config.control.concurrency);
    let dry_run = dry_run || config.control.dry_run;

    let mut per_path_opts = Vec::with_capacity(paths.len());
    let mut squash_lookup_failures: Vec<String> = Vec::new();
    for path in &paths {
        let mut squashed_map = std::collections::HashMap::new();
        if let Some(forge) = &forge {
            match cleanup::default_branch(ctx, process.as_ref(), path).await {
                Some(default) => {
                    match forge.list_merged_prs(ctx, Some(path.as_path()), &default).await {
                        Ok(prs) => squashed_map = devsync::forge::most_recent_merged_head_by_branch(prs),
                        Err(e) => {
                            tracing::warn!(
                                path = %path.display(),
                                error = %e,
                                "listing merged PRs failed; squash cleanup degraded for this repo"
                            );
                            squash_lookup_failures.push(format!(
                                "{}: squash-merge lookup failed ({e}); squashed target skipped",
                                path.display()
                            ));
                        }
                    }
                }
                None => {
                    tracing::warn!(
                        path = %path.display(),
                        "could not determine default branch; squash cleanup degraded for this repo"
                    );
                    squash_lookup_failures.push(format!(
                        "{}: could not determine default branch; squashed target skipped",
                        path.display()
                    ));
                }
            }
        }
        per_path_opts.push(CleanupOptions {
            prune: config.repo.sync.prune,
            dry_run,
            targets: targets.clone(),
            exclude_branches: config.repo.cleanup.exclude_branches.clone(),
            squashed_pr_head_by_branch: squashed_map,
        });
    }

    let started = Instant::now();
    let logger = log_file
        .as_deref()
        .map(|path| EventLogger::create(path, "devsync"))
        .transpose()
        .map_err(|e| AppError::Config(e.to_string()))?;

    for msg in &squash_lookup_failures {
        eprintln!("warning: {msg}");
    }

    let results =
        devsync::repo::run_cleanup_all(ctx, process, paths, per_path_opts, concurrency).await;

    let mut summary = Summary::new(results.len());
    let mut failed = 0;
    for result in &results {
        match result {
            Ok(r) => {
                for deleted in &r.deleted_branches {
                    println!("deleted: {deleted}");
                }
                for plan in &r.planned_deletes {
                    println!("would delete ({:?}): {}", plan.target, plan.branch);
                }
                summary.push(JobResult::success("repo", Duration::from_secs(0)));
            }
            Err(e) => {
                failed += 1;
                eprintln!("cleanup failed: {e}");
                summary.push(JobResult::failed("repo", e.to_string(), Duration::from_secs(0)));
            }
        }
    }

    if let Some(logger) = logger {
        logger
            .close(&summary, started.elapsed())
            .map_err(|e| AppError::Config(e.to_string()))?;
    }

    Ok(if failed > 0 { 1 } else { 0 })
}

async fn cmd_env_export(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    config: &Config,
) -> Result<i32, AppError> {
    let provider = build_secret_provider(process, config);
    provider.unlock(ctx).await?;
    let stats = provider.load_env(ctx).await?;
    let vars = provider.get_env_vars(ctx).await?;

    let dialect = if std::env::var_os("PSModulePath").is_some() {
        ShellDialect::PowerShell
    } else {
        ShellDialect::Posix
    };
    let (rendered, warnings) = env_cmd::render_export(&vars, dialect);

    println!("{rendered}");
    eprintln!("loaded {} / skipped {}", stats.loaded, stats.skipped);
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(0)
}

async fn cmd_env_run(
    ctx: &CancellationToken,
    process: Arc<dyn ProcessRunner>,
    config: &Config,
    cmd: String,
    args: Vec<String>,
) -> Result<i32, AppError> {
    let provider = build_secret_provider(process, config);
    provider.unlock(ctx).await?;
    provider.load_env(ctx).await?;
    let outcome = provider.run_with_env(ctx, &cmd, &args).await?;
    Ok(outcome.code)
}
