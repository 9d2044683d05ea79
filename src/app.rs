use crate::settings::{Settings, SettingsField};
use crate::speedtest::{
    download::DownloadTest,
    meter::ThroughputProgress,
    ping::{PingProgress, PingResult, PingTest},
    session::{CancelSignal, Session},
    upload::UploadTest,
    SpeedTestResult, TestPhase,
};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppView {
    Main,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Download,
    Upload,
    Ping,
}

impl Panel {
    pub fn next(self) -> Self {
        match self {
            Panel::Download => Panel::Upload,
            Panel::Upload => Panel::Ping,
            Panel::Ping => Panel::Download,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Panel::Download => Panel::Ping,
            Panel::Upload => Panel::Download,
            Panel::Ping => Panel::Upload,
        }
    }
}

pub struct App {
    pub phase: TestPhase,
    pub result: SpeedTestResult,
    pub should_quit: bool,

    // UI state
    pub view: AppView,
    pub selected_panel: Panel,

    // Settings
    pub settings: Settings,
    pub selected_setting: SettingsField,

    // Share of the phase budget already spent
    pub download_progress: f64,
    pub upload_progress: f64,
    pub download_bytes: u64,
    pub upload_bytes: u64,

    // Speed samples for charts
    pub download_samples: Vec<f64>,
    pub upload_samples: Vec<f64>,
    pub ping_samples: Vec<f64>,

    abort: Option<CancelSignal>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self {
            phase: TestPhase::Idle,
            result: SpeedTestResult::default(),
            should_quit: false,
            view: AppView::Main,
            selected_panel: Panel::Download,
            settings,
            selected_setting: SettingsField::PhaseBudget,
            download_progress: 0.0,
            upload_progress: 0.0,
            download_bytes: 0,
            upload_bytes: 0,
            download_samples: Vec::new(),
            upload_samples: Vec::new(),
            ping_samples: Vec::new(),
            abort: None,
        }
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match self.view {
            AppView::Main => self.handle_main_key(key),
            AppView::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_main_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Char('s') => {
                if !self.phase.is_running() {
                    self.view = AppView::Settings;
                }
                None
            }
            KeyCode::Enter if !self.phase.is_running() => Some(AppAction::StartTest),
            KeyCode::Esc if self.phase.is_running() => Some(AppAction::CancelTest),
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('j') => {
                self.selected_panel = self.selected_panel.next();
                None
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('k') => {
                self.selected_panel = self.selected_panel.prev();
                None
            }
            _ => None,
        }
    }

    fn handle_settings_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => {
                self.view = AppView::Main;
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_setting = self.selected_setting.prev();
                None
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.selected_setting = self.selected_setting.next();
                None
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.selected_setting.decrease(&mut self.settings);
                None
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.selected_setting.increase(&mut self.settings);
                None
            }
            _ => None,
        }
    }

    pub fn reset_for_new_test(&mut self) {
        self.phase = TestPhase::Idle;
        self.result = SpeedTestResult::default();
        self.download_progress = 0.0;
        self.upload_progress = 0.0;
        self.download_bytes = 0;
        self.upload_bytes = 0;
        self.download_samples.clear();
        self.upload_samples.clear();
        self.ping_samples.clear();
    }

    pub fn apply_update(&mut self, update: TestUpdate) {
        match update {
            TestUpdate::DownloadProgress(p) => {
                self.download_progress = self.budget_share(&p);
                self.download_bytes = p.transferred_bytes;
                self.download_samples = p.speed_samples;
            }
            TestUpdate::DownloadComplete { speed_mbps } => {
                self.result.download_mbps = speed_mbps;
                self.phase = TestPhase::Upload;
            }
            TestUpdate::UploadProgress(p) => {
                self.upload_progress = self.budget_share(&p);
                self.upload_bytes = p.transferred_bytes;
                self.upload_samples = p.speed_samples;
            }
            TestUpdate::UploadComplete { speed_mbps } => {
                self.result.upload_mbps = speed_mbps;
                self.phase = TestPhase::Ping;
            }
            TestUpdate::PingProgress(p) => self.update_ping_progress(p),
            TestUpdate::PingComplete { avg_ms, jitter_ms } => {
                self.result.ping_ms = avg_ms;
                self.result.jitter_ms = jitter_ms;
            }
            TestUpdate::Complete(result) => {
                self.result = result;
                self.complete_test();
            }
        }
    }

    fn budget_share(&self, progress: &ThroughputProgress) -> f64 {
        let budget = self.settings.phase_budget.as_secs_f64();
        if budget <= 0.0 {
            return 0.0;
        }
        (progress.elapsed.as_secs_f64() / budget).min(1.0)
    }

    fn update_ping_progress(&mut self, progress: PingProgress) {
        if let Some(ping) = progress.latest_ping {
            self.ping_samples.push(ping);
            // Keep last 100 samples
            if self.ping_samples.len() > 100 {
                self.ping_samples.remove(0);
            }
        }
    }

    pub fn complete_test(&mut self) {
        self.phase = TestPhase::Complete;
        self.abort = None;
    }

    pub fn set_abort(&mut self, abort: CancelSignal) {
        self.abort = Some(abort);
    }

    pub fn cancel_test(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.cancel();
        }
        self.phase = TestPhase::Idle;
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AppAction {
    Quit,
    StartTest,
    CancelTest,
}

#[derive(Debug, Clone)]
pub enum TestUpdate {
    DownloadProgress(ThroughputProgress),
    DownloadComplete { speed_mbps: f64 },
    UploadProgress(ThroughputProgress),
    UploadComplete { speed_mbps: f64 },
    PingProgress(PingProgress),
    PingComplete { avg_ms: f64, jitter_ms: f64 },
    Complete(SpeedTestResult),
}

/// Runs download, upload and ping strictly in that order. A failing phase
/// reads as zero and the session moves on; an abort skips whatever phases
/// remain. `Complete` is only sent for sessions that were not aborted.
pub async fn run_speed_test(
    update_tx: mpsc::Sender<TestUpdate>,
    abort: CancelSignal,
    settings: Settings,
) -> Result<SpeedTestResult> {
    settings.validate()?;
    let mut session = Session::new(abort);

    // Download test
    session.enter(TestPhase::Download);
    let download = DownloadTest::new(&settings);
    let counter = session.downloaded().clone();
    let phase_abort = session.abort_signal().clone();
    let (download_tx, mut download_rx) = mpsc::channel::<ThroughputProgress>(32);
    let download_handle = tokio::spawn(async move { download.run(&counter, &phase_abort, download_tx).await });

    while let Some(progress) = download_rx.recv().await {
        let _ = update_tx.send(TestUpdate::DownloadProgress(progress)).await;
    }

    let download_mbps = settle("download", download_handle.await).map_or(0.0, |r| r.speed_mbps);
    let _ = update_tx
        .send(TestUpdate::DownloadComplete { speed_mbps: download_mbps })
        .await;

    // Upload test
    let mut upload_mbps = 0.0;
    if !session.is_aborted() {
        session.enter(TestPhase::Upload);
        let counter = session.uploaded().clone();
        let phase_abort = session.abort_signal().clone();
        let upload_settings = settings.clone();
        let (upload_tx, mut upload_rx) = mpsc::channel::<ThroughputProgress>(32);
        let upload_handle = tokio::spawn(async move {
            let upload = UploadTest::new(&upload_settings);
            upload.run(&counter, &phase_abort, upload_tx).await
        });

        while let Some(progress) = upload_rx.recv().await {
            let _ = update_tx.send(TestUpdate::UploadProgress(progress)).await;
        }

        upload_mbps = settle("upload", upload_handle.await).map_or(0.0, |r| r.speed_mbps);
        let _ = update_tx
            .send(TestUpdate::UploadComplete { speed_mbps: upload_mbps })
            .await;
    }

    // Ping test
    let mut ping = PingResult::default();
    if !session.is_aborted() {
        session.enter(TestPhase::Ping);
        let mut test = PingTest::new(&settings);
        let phase_abort = session.abort_signal().clone();
        let (ping_tx, mut ping_rx) = mpsc::channel::<PingProgress>(32);
        let ping_handle = tokio::spawn(async move { test.run(&phase_abort, ping_tx).await });

        while let Some(progress) = ping_rx.recv().await {
            let _ = update_tx.send(TestUpdate::PingProgress(progress)).await;
        }

        ping = settle("ping", ping_handle.await).unwrap_or_default();
        let _ = update_tx
            .send(TestUpdate::PingComplete {
                avg_ms: ping.avg_ms,
                jitter_ms: ping.jitter_ms,
            })
            .await;
    }

    let aborted = session.is_aborted();
    let result = session.finish(download_mbps, upload_mbps, ping.avg_ms, ping.jitter_ms);
    if !aborted {
        let _ = update_tx.send(TestUpdate::Complete(result.clone())).await;
    }

    Ok(result)
}

fn settle<T>(phase: &str, joined: Result<Result<T>, JoinError>) -> Option<T> {
    match joined {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(phase, error = %e, "phase failed, reporting zero");
            None
        }
        Err(e) => {
            warn!(phase, error = %e, "phase task did not finish, reporting zero");
            None
        }
    }
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink;
    use crossterm::event::{KeyEvent, KeyModifiers};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn local_settings() -> (MockServer, Settings) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![3u8; 128 * 1024]))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink_addr = sink::spawn_ephemeral().await;
        let settings = Settings {
            phase_budget: Duration::from_millis(300),
            streams: 2,
            ping_pause: Duration::from_millis(5),
            sample_interval: Duration::from_millis(50),
            download_urls: vec![format!("{}/payload.jpg", server.uri())],
            upload_base_url: format!("http://{sink_addr}"),
            ping_url: format!("{}/ping", server.uri()),
            ..Settings::default()
        };
        (server, settings)
    }

    #[tokio::test]
    async fn session_runs_phases_in_order() {
        let (_server, settings) = local_settings().await;
        let (tx, mut rx) = mpsc::channel(1024);

        let collector = tokio::spawn(async move {
            let mut updates = Vec::new();
            while let Some(update) = rx.recv().await {
                updates.push(update);
            }
            updates
        });

        let result = run_speed_test(tx, CancelSignal::new(), settings).await.unwrap();
        let updates = collector.await.unwrap();

        assert!(result.download_mbps > 0.0);
        assert!(result.upload_mbps > 0.0);
        assert!(result.ping_ms >= 0.0);

        let position = |wanted: fn(&TestUpdate) -> bool| updates.iter().position(wanted).unwrap();
        let download_done = position(|u| matches!(u, TestUpdate::DownloadComplete { .. }));
        let upload_done = position(|u| matches!(u, TestUpdate::UploadComplete { .. }));
        let ping_done = position(|u| matches!(u, TestUpdate::PingComplete { .. }));
        let complete = position(|u| matches!(u, TestUpdate::Complete(_)));
        assert!(download_done < upload_done);
        assert!(upload_done < ping_done);
        assert!(ping_done < complete);

        assert!(updates[..download_done]
            .iter()
            .all(|u| matches!(u, TestUpdate::DownloadProgress(_))));
    }

    #[tokio::test]
    async fn abort_before_start_reports_zeros() {
        let (_server, settings) = local_settings().await;
        let (tx, mut rx) = mpsc::channel(1024);
        let abort = CancelSignal::new();
        abort.cancel();

        let result = run_speed_test(tx, abort, settings).await.unwrap();

        assert_eq!(result.download_mbps, 0.0);
        assert_eq!(result.upload_mbps, 0.0);
        assert_eq!(result.ping_ms, 0.0);

        let mut saw_complete = false;
        while let Ok(update) = rx.try_recv() {
            saw_complete |= matches!(update, TestUpdate::Complete(_));
        }
        assert!(!saw_complete);
    }

    #[tokio::test]
    async fn unreachable_services_degrade_to_zero() {
        let settings = Settings {
            phase_budget: Duration::from_millis(200),
            ping_pause: Duration::from_millis(5),
            download_urls: vec!["http://127.0.0.1:1/payload.jpg".to_string()],
            upload_base_url: "http://127.0.0.1:1".to_string(),
            ping_url: "http://127.0.0.1:1/ping".to_string(),
            ..Settings::default()
        };
        let (tx, _rx) = mpsc::channel(1024);

        let result = run_speed_test(tx, CancelSignal::new(), settings).await.unwrap();

        assert_eq!(result.download_mbps, 0.0);
        assert_eq!(result.upload_mbps, 0.0);
        assert_eq!(result.ping_ms, 0.0);
        assert_eq!(result.ratings.streaming, 1);
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let settings = Settings {
            streams: 0,
            ..Settings::default()
        };
        let (tx, _rx) = mpsc::channel(8);
        assert!(run_speed_test(tx, CancelSignal::new(), settings).await.is_err());
    }

    #[test]
    fn enter_starts_only_when_idle() {
        let mut app = App::new(Settings::default());
        assert!(app.handle_key_event(press(KeyCode::Esc)).is_none());
        assert!(matches!(app.handle_key_event(press(KeyCode::Enter)), Some(AppAction::StartTest)));

        app.phase = TestPhase::Download;
        assert!(app.handle_key_event(press(KeyCode::Enter)).is_none());
        assert!(matches!(app.handle_key_event(press(KeyCode::Esc)), Some(AppAction::CancelTest)));

        app.phase = TestPhase::Complete;
        assert!(matches!(app.handle_key_event(press(KeyCode::Enter)), Some(AppAction::StartTest)));
    }

    #[test]
    fn cancel_raises_abort_signal() {
        let mut app = App::new(Settings::default());
        let abort = CancelSignal::new();
        app.set_abort(abort.clone());
        app.phase = TestPhase::Upload;

        app.cancel_test();

        assert!(abort.is_cancelled());
        assert_eq!(app.phase, TestPhase::Idle);
    }

    #[test]
    fn updates_advance_phases() {
        let mut app = App::new(Settings::default());
        app.phase = TestPhase::Download;

        app.apply_update(TestUpdate::DownloadProgress(ThroughputProgress {
            transferred_bytes: 1_000,
            elapsed: app.settings.phase_budget / 2,
            current_mbps: 12.5,
            speed_samples: vec![10.0, 12.5],
        }));
        assert!((app.download_progress - 0.5).abs() < 1e-9);
        assert_eq!(app.download_bytes, 1_000);
        assert_eq!(app.download_samples, vec![10.0, 12.5]);

        app.apply_update(TestUpdate::DownloadComplete { speed_mbps: 12.5 });
        assert_eq!(app.phase, TestPhase::Upload);
        app.apply_update(TestUpdate::UploadComplete { speed_mbps: 3.0 });
        assert_eq!(app.phase, TestPhase::Ping);

        let result = SpeedTestResult {
            download_mbps: 12.5,
            upload_mbps: 3.0,
            ping_ms: 20.0,
            ..Default::default()
        };
        app.apply_update(TestUpdate::Complete(result.clone()));
        assert_eq!(app.phase, TestPhase::Complete);
        assert_eq!(app.result, result);
    }

    #[test]
    fn settings_view_adjusts_selected_field() {
        let mut app = App::new(Settings::default());
        app.handle_key_event(press(KeyCode::Char('s')));
        assert_eq!(app.view, AppView::Settings);

        app.handle_key_event(press(KeyCode::Down));
        assert_eq!(app.selected_setting, SettingsField::Streams);
        app.handle_key_event(press(KeyCode::Right));
        assert_eq!(app.settings.streams, 5);

        app.handle_key_event(press(KeyCode::Enter));
        assert_eq!(app.view, AppView::Main);
    }
}
