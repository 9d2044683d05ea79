use anyhow::Result;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "linkgauge=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Logs to stderr. Used by the headless run and the upload sink.
pub fn init_stderr() {
    fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Logs to `path`, truncating it. The TUI owns the terminal, so this is the
/// only sink it gets.
pub fn init_file(path: &Path) -> Result<()> {
    let file = File::create(path)?;
    fmt()
        .with_env_filter(filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
