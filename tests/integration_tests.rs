//! End-to-end CLI tests for devsync.
//!
//! These exercise only what is safe on an arbitrary test machine: help/version
//! output, config-dependent error paths, and stub subcommands. Anything that
//! would shell out to `git`, `gh`, or `bw` is covered at the unit level
//! instead, against `FakeProcessRunner`.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn devsync() -> Command {
    cargo_bin_cmd!("devsync")
}

/// An empty `XDG_CONFIG_HOME` so `devsync::config::load` sees no config file
/// and falls back to `Config::default()`, deterministically across machines.
fn empty_config_home() -> TempDir {
    TempDir::new().unwrap()
}

mod cli_basics {
    use super::*;

    #[test]
    fn help_exits_successfully() {
        devsync().arg("--help").assert().success();
    }

    #[test]
    fn version_exits_successfully() {
        devsync().arg("--version").assert().success();
    }

    #[test]
    fn unknown_subcommand_fails() {
        devsync().arg("not-a-real-command").assert().failure();
    }
}

mod config_and_repo_root {
    use super::*;

    #[test]
    fn repo_list_without_a_configured_root_hints_at_config_init() {
        let home = empty_config_home();
        devsync()
            .env("XDG_CONFIG_HOME", home.path())
            .arg("repo")
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("config init"));
    }

    #[test]
    fn repo_list_with_an_explicit_root_flag_does_not_need_config() {
        let home = empty_config_home();
        let root = TempDir::new().unwrap();
        devsync()
            .env("XDG_CONFIG_HOME", home.path())
            .arg("repo")
            .arg("list")
            .arg("--root")
            .arg(root.path())
            .assert()
            .success();
    }

    #[test]
    fn conflicting_tui_flags_are_rejected_before_any_phase_runs() {
        let home = empty_config_home();
        let root = TempDir::new().unwrap();
        devsync()
            .env("XDG_CONFIG_HOME", home.path())
            .arg("repo")
            .arg("update")
            .arg("--root")
            .arg(root.path())
            .arg("--tui")
            .arg("--no-tui")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--tui"));
    }
}

mod sys_commands {
    use super::*;

    #[test]
    fn sys_list_prints_every_known_manager() {
        let home = empty_config_home();
        let assert = devsync()
            .env("XDG_CONFIG_HOME", home.path())
            .arg("sys")
            .arg("list")
            .assert()
            .success();
        let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
        for manager in ["apt", "brew", "npm", "cargo"] {
            assert!(output.contains(manager), "expected {manager} in sys list output:\n{output}");
        }
    }
}

mod stub_subcommands {
    use super::*;

    #[test]
    fn config_init_is_a_documented_stub() {
        let home = empty_config_home();
        devsync()
            .env("XDG_CONFIG_HOME", home.path())
            .arg("config")
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("not implemented"));
    }

    #[test]
    fn doctor_is_a_documented_stub() {
        let home = empty_config_home();
        devsync()
            .env("XDG_CONFIG_HOME", home.path())
            .arg("doctor")
            .assert()
            .success()
            .stdout(predicate::str::contains("not implemented"));
    }
}
