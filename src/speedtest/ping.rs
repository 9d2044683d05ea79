use super::session::CancelSignal;
use crate::error::ProbeError;
use crate::settings::Settings;
use anyhow::Result;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct PingTest {
    url: String,
    samples: Vec<f64>,
    ping_count: usize,
    pause: Duration,
    timeout: Duration,
}

impl PingTest {
    pub fn new(settings: &Settings) -> Self {
        Self {
            url: settings.ping_url.clone(),
            samples: Vec::new(),
            ping_count: settings.ping_count,
            pause: settings.ping_pause,
            timeout: Duration::from_secs(5),
        }
    }

    /// Takes `ping_count` sequential HEAD round trips. A single failed round
    /// discards every sample and yields a zero result.
    pub async fn run(&mut self, abort: &CancelSignal, progress_tx: mpsc::Sender<PingProgress>) -> Result<PingResult> {
        let client = Client::builder().timeout(self.timeout).build()?;

        self.samples.clear();

        for round in 0..self.ping_count {
            if round > 0 {
                tokio::select! {
                    biased;
                    _ = abort.cancelled() => return Ok(self.discard(round, &ProbeError::Cancelled)),
                    _ = tokio::time::sleep(self.pause) => {}
                }
            }

            match self.round_trip(&client, abort).await {
                Ok(ms) => self.samples.push(ms),
                Err(e) => return Ok(self.discard(round, &e)),
            }

            let _ = progress_tx
                .send(PingProgress {
                    latest_ping: self.samples.last().copied(),
                })
                .await;
        }

        let result = self.calculate_result();
        info!(avg_ms = result.avg_ms, jitter_ms = result.jitter_ms, "ping finished");
        Ok(result)
    }

    async fn round_trip(&self, client: &Client, abort: &CancelSignal) -> Result<f64, ProbeError> {
        let start = Instant::now();
        tokio::select! {
            biased;
            _ = abort.cancelled() => return Err(ProbeError::Cancelled),
            response = client.head(&self.url).send() => {
                // Any status is a completed round trip.
                response?;
            }
        }
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }

    fn discard(&mut self, round: usize, error: &ProbeError) -> PingResult {
        debug!(round, url = %self.url, %error, "ping round failed, discarding samples");
        self.samples.clear();
        PingResult::default()
    }

    fn calculate_result(&self) -> PingResult {
        if self.samples.is_empty() {
            return PingResult::default();
        }

        let avg = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        let jitter = if self.samples.len() > 1 {
            let variance: f64 = self.samples.iter().map(|&x| (x - avg).powi(2)).sum::<f64>()
                / (self.samples.len() - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        PingResult {
            avg_ms: avg.round(),
            jitter_ms: jitter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PingProgress {
    pub latest_ping: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingResult {
    pub avg_ms: f64,
    pub jitter_ms: f64,
}
