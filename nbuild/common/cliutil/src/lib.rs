//! Common startup logic for the `nbuild` process, adapted from the
//! teacher's `cliutil` crate: a single place that wires up `tracing`,
//! logs the command line, and turns a top-level `Result` into an
//! `ExitCode`.

use std::process::ExitCode;

use itertools::Itertools;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// Installs a `tracing-subscriber` registry reading `RUST_LOG`
/// (defaulting to `info`) and writing to stderr, as either human-readable
/// text or newline-delimited JSON.
///
/// Returns an error if a subscriber is already installed, which in
/// practice only happens if this is called twice.
pub fn setup_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

/// Logs the current process's command line at info level, escaping each
/// argument so the log line can be pasted back into a shell.
pub fn log_current_command_line() {
    let escaped = std::env::args()
        .map(|s| shell_escape::escape(s.into()).into_owned())
        .join(" ");
    tracing::info!(command = %escaped, "nbuild starting");
}

/// Handles a top-level `Result`, logging the error (with its full
/// `anyhow` context chain) and returning the conventional failure exit
/// code.
pub fn handle_top_level_result(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "fatal error");
            ExitCode::FAILURE
        }
    }
}
