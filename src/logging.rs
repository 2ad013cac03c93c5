//! Tracing subscriber setup.
//!
//! Filter comes from `CHRONOSNAP_LOG` when set, otherwise from `-v`. The TUI
//! owns the terminal, so interactive runs only log when `--log-file` is given.

use crate::cli::Cli;
use anyhow::{Context, Result};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CHRONOSNAP_LOG";

fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "chronosnap=info,warn",
        2 => "chronosnap=debug,info",
        _ => "trace",
    }
}

pub fn init(args: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(args.verbose)));

    if let Some(path) = args.log_file.as_deref() {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
            .map_err(|e| anyhow::anyhow!("init logging: {e}"))?;
        return Ok(());
    }

    if args.is_interactive() && cfg!(feature = "tui") {
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("init logging: {e}"))?;
    Ok(())
}
