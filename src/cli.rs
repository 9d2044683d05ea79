use crate::settings::Settings;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "linkgauge", version, about = "Estimate bandwidth and latency, then rate the link per activity")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the upload sink endpoint the upload phase posts to
    Serve {
        #[arg(long, env = "LINKGAUGE_BIND", default_value = "127.0.0.1:8787")]
        bind: SocketAddr,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run once without the terminal UI and print the result
    #[arg(long)]
    pub headless: bool,

    /// With --headless, print the result as JSON
    #[arg(long, requires = "headless")]
    pub json: bool,

    /// Write logs to this file (the TUI has nowhere else to put them)
    #[arg(long, env = "LINKGAUGE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Wall-clock budget of the download and upload phases, in milliseconds
    #[arg(long, env = "LINKGAUGE_DURATION_MS")]
    pub duration_ms: Option<u64>,

    /// Concurrent download streams
    #[arg(long, env = "LINKGAUGE_STREAMS")]
    pub streams: Option<usize>,

    /// Number of latency samples
    #[arg(long, env = "LINKGAUGE_PING_COUNT")]
    pub ping_count: Option<usize>,

    /// Download payload URL; repeat to build the pool
    #[arg(long = "download-url", env = "LINKGAUGE_DOWNLOAD_URLS", value_delimiter = ',')]
    pub download_urls: Vec<String>,

    /// Base URL of the service exposing /api/speedtest/upload
    #[arg(long, env = "LINKGAUGE_UPLOAD_URL")]
    pub upload_url: Option<String>,

    /// Lightweight URL used for latency sampling
    #[arg(long, env = "LINKGAUGE_PING_URL")]
    pub ping_url: Option<String>,
}

impl RunArgs {
    /// Defaults overridden by whatever was given on the command line or in
    /// the environment.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();

        if let Some(ms) = self.duration_ms {
            settings.phase_budget = Duration::from_millis(ms);
        }
        if let Some(streams) = self.streams {
            settings.streams = streams;
        }
        if let Some(count) = self.ping_count {
            settings.ping_count = count;
        }
        if !self.download_urls.is_empty() {
            settings.download_urls = self.download_urls.clone();
        }
        if let Some(url) = &self.upload_url {
            settings.upload_base_url = url.clone();
        }
        if let Some(url) = &self.ping_url {
            settings.ping_url = url.clone();
        }

        settings
    }
}
