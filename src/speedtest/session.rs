use super::meter::ByteCounter;
use super::rating::Ratings;
use super::{SpeedTestResult, TestPhase};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

/// Cooperative cancellation shared by every task of a phase.
///
/// Once raised it stays raised; waiters observe it at their next yield point.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once raised.
        let _ = rx.wait_for(|raised| *raised).await;
    }

    /// A new signal raised when `budget` elapses or when `self` is raised,
    /// whichever comes first.
    pub fn with_deadline(&self, budget: Duration) -> CancelSignal {
        let phase = CancelSignal::new();
        if self.is_cancelled() {
            phase.cancel();
            return phase;
        }

        let parent = self.clone();
        let child = phase.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(budget) => {}
                _ = parent.cancelled() => {}
                _ = child.cancelled() => {}
            }
            child.cancel();
        });

        phase
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// One run of all three phases.
#[derive(Debug)]
pub struct Session {
    started: Instant,
    phase: TestPhase,
    downloaded: ByteCounter,
    uploaded: ByteCounter,
    abort: CancelSignal,
}

impl Session {
    pub fn new(abort: CancelSignal) -> Self {
        Self {
            started: Instant::now(),
            phase: TestPhase::Idle,
            downloaded: ByteCounter::default(),
            uploaded: ByteCounter::default(),
            abort,
        }
    }

    pub fn phase(&self) -> TestPhase {
        self.phase
    }

    pub fn enter(&mut self, phase: TestPhase) {
        info!(?phase, elapsed_ms = self.started.elapsed().as_millis() as u64, "entering phase");
        self.phase = phase;
    }

    pub fn abort_signal(&self) -> &CancelSignal {
        &self.abort
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub fn downloaded(&self) -> &ByteCounter {
        &self.downloaded
    }

    pub fn uploaded(&self) -> &ByteCounter {
        &self.uploaded
    }

    pub fn finish(&mut self, download_mbps: f64, upload_mbps: f64, ping_ms: f64, jitter_ms: f64) -> SpeedTestResult {
        self.phase = TestPhase::Complete;
        let result = SpeedTestResult {
            download_mbps,
            upload_mbps,
            ping_ms,
            jitter_ms,
            ratings: Ratings::derive(download_mbps, upload_mbps, ping_ms),
        };
        info!(
            download_mbps,
            upload_mbps,
            ping_ms,
            downloaded_bytes = self.downloaded.get(),
            uploaded_bytes = self.uploaded.get(),
            total_ms = self.started.elapsed().as_millis() as u64,
            "session complete"
        );
        result
    }
}
