mod app;
mod cli;
mod error;
mod logging;
mod settings;
mod sink;
mod speedtest;
mod ui;

use anyhow::Result;
use app::{poll_event, run_speed_test, App, AppAction, TestUpdate};
use clap::Parser;
use cli::{Cli, Command};
use crossterm::event::Event;
use ratatui::DefaultTerminal;
use settings::Settings;
use speedtest::session::CancelSignal;
use speedtest::TestPhase;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use ui::draw_ui;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Serve { bind }) = cli.command {
        logging::init_stderr();
        return sink::serve(bind).await;
    }

    let settings = cli.run.settings();
    settings.validate()?;

    if cli.run.headless {
        logging::init_stderr();
        return run_headless(settings, cli.run.json).await;
    }

    if let Some(path) = &cli.run.log_file {
        logging::init_file(path)?;
    }

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, settings).await;

    ratatui::restore();
    result
}

async fn run_headless(settings: Settings, json: bool) -> Result<()> {
    let abort = CancelSignal::new();
    let on_interrupt = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping measurement");
            on_interrupt.cancel();
        }
    });

    let (tx, mut rx) = mpsc::channel(64);
    let session = tokio::spawn(run_speed_test(tx, abort, settings));

    while let Some(update) = rx.recv().await {
        match update {
            TestUpdate::DownloadProgress(p) | TestUpdate::UploadProgress(p) => {
                debug!(mbps = p.current_mbps, bytes = p.transferred_bytes, "sample");
            }
            TestUpdate::DownloadComplete { speed_mbps } => info!(speed_mbps, "download complete"),
            TestUpdate::UploadComplete { speed_mbps } => info!(speed_mbps, "upload complete"),
            TestUpdate::PingComplete { avg_ms, .. } => info!(avg_ms, "ping complete"),
            TestUpdate::PingProgress(_) | TestUpdate::Complete(_) => {}
        }
    }

    let result = session.await??;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{result}");
    }

    Ok(())
}

async fn run_app(terminal: &mut DefaultTerminal, settings: Settings) -> Result<()> {
    let mut app = App::new(settings);
    let mut test_rx: Option<mpsc::Receiver<TestUpdate>> = None;

    loop {
        terminal.draw(|frame| draw_ui(frame, &app))?;

        // Drain test updates
        if let Some(rx) = test_rx.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(update) => app.apply_update(update),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        if app.phase.is_running() {
                            app.complete_test();
                        }
                        test_rx = None;
                        break;
                    }
                }
            }
        }

        // Handle input
        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => break,
                    AppAction::StartTest => {
                        app.reset_for_new_test();
                        app.phase = TestPhase::Download;

                        let (tx, rx) = mpsc::channel(64);
                        let abort = CancelSignal::new();

                        app.set_abort(abort.clone());
                        test_rx = Some(rx);

                        let settings = app.settings.clone();
                        tokio::spawn(async move {
                            if let Err(e) = run_speed_test(tx, abort, settings).await {
                                warn!(error = %e, "speed test failed");
                            }
                        });
                    }
                    AppAction::CancelTest => {
                        app.cancel_test();
                        test_rx = None;
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
