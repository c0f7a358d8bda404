//! `env export` / `env run` (§4.12, §6): renders the loaded secret
//! environment as shell statements, or injects it into a spawned command.

use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellDialect {
    Posix,
    PowerShell,
}

fn valid_name(name: &str) -> bool {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new("^[A-Z_][A-Z0-9_]*$").unwrap())
        .is_match(name)
}

fn posix_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render `export`/`$env:` statements for each valid, CR/LF-free pair.
/// Invalid entries are reported back as warnings rather than emitted.
pub fn render_export(vars: &HashMap<String, String>, dialect: ShellDialect) -> (String, Vec<String>) {
    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();

    let mut lines = Vec::new();
    let mut warnings = Vec::new();

    for name in names {
        let value = &vars[name];
        if !valid_name(name) {
            warnings.push(format!("skipping {name}: not a valid environment variable name"));
            continue;
        }
        if value.contains('\r') || value.contains('\n') {
            warnings.push(format!("skipping {name}: value contains CR/LF"));
            continue;
        }
        let line = match dialect {
            ShellDialect::Posix => format!("export {name}={}", posix_quote(value)),
            ShellDialect::PowerShell => format!("$env:{name} = {}", powershell_quote(value)),
        };
        lines.push(line);
    }

    (lines.join("\n"), warnings)
}
