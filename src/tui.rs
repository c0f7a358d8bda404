//! TUI Resolver (§4.10): reconciles the config default / CLI flags against
//! actual terminal capability.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSource {
    Flag,
    Config,
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct TuiRequest {
    pub requested: bool,
    pub source: RequestSource,
}

/// `--tui` and `--no-tui` set together is an error. Otherwise `--no-tui` >
/// `--tui` > the config default.
pub fn resolve_tui_request(
    config_default: bool,
    tui_changed: bool,
    tui_value: bool,
    no_tui_changed: bool,
    no_tui_value: bool,
) -> Result<TuiRequest, String> {
    if tui_changed && no_tui_changed {
        return Err("--tui and --no-tui cannot both be set".to_string());
    }
    if no_tui_changed && no_tui_value {
        return Ok(TuiRequest {
            requested: false,
            source: RequestSource::Flag,
        });
    }
    if tui_changed {
        return Ok(TuiRequest {
            requested: tui_value,
            source: RequestSource::Flag,
        });
    }
    Ok(TuiRequest {
        requested: config_default,
        source: if config_default {
            RequestSource::Config
        } else {
            RequestSource::None
        },
    })
}

/// Not requested → disabled, no warning. Requested and both streams are
/// TTYs → enabled. Otherwise disabled with a warning citing the source.
pub fn resolve_tui_enabled_by_terminal(
    request: TuiRequest,
    stdout_is_tty: bool,
    stderr_is_tty: bool,
) -> (bool, Option<String>) {
    if !request.requested {
        return (false, None);
    }
    if stdout_is_tty && stderr_is_tty {
        return (true, None);
    }
    let cited = match request.source {
        RequestSource::Flag => "--tui",
        RequestSource::Config => "ui.tui",
        RequestSource::None => "the default",
    };
    (
        false,
        Some(format!(
            "{cited} requested a TUI, but stdout/stderr are not both terminals; falling back to plain output"
        )),
    )
}
