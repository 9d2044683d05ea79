use super::meter::{sample_until_cancelled, throughput_mbps, ByteCounter, ThroughputProgress};
use super::session::CancelSignal;
use crate::error::ProbeError;
use crate::settings::Settings;
use crate::sink::UPLOAD_PATH;
use anyhow::Result;
use bytes::Bytes;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Sequentially POSTs one fixed random payload until the phase budget runs
/// out. Progress is counted per completed request, not per byte sent.
pub struct UploadTest {
    payload: Bytes,
    url: String,
    budget: Duration,
    sample_interval: Duration,
}

impl UploadTest {
    pub fn new(settings: &Settings) -> Self {
        let mut rng = rand::rngs::StdRng::from_entropy();
        let mut data = vec![0u8; settings.upload_payload_bytes];
        rng.fill(&mut data[..]);

        Self {
            payload: Bytes::from(data),
            url: upload_endpoint(&settings.upload_base_url),
            budget: settings.phase_budget,
            sample_interval: settings.sample_interval,
        }
    }

    pub async fn run(
        &self,
        counter: &ByteCounter,
        abort: &CancelSignal,
        progress_tx: mpsc::Sender<ThroughputProgress>,
    ) -> Result<UploadResult> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let cancel = abort.with_deadline(self.budget);
        let start = Instant::now();
        let baseline = counter.get();

        let uploads = async {
            let mut failures = 0u64;
            while !cancel.is_cancelled() {
                match self.post_once(&client, &cancel).await {
                    Ok(()) => counter.add(self.payload_len() as u64),
                    Err(ProbeError::Cancelled) => break,
                    Err(e) => {
                        failures += 1;
                        debug!(url = %self.url, error = %e, "upload request failed, skipping");
                    }
                }
            }
            failures
        };
        let sampler = sample_until_cancelled(counter, start, self.sample_interval, &cancel, &progress_tx);
        let (failures, ()) = tokio::join!(uploads, sampler);

        let elapsed = start.elapsed();
        let bytes = counter.get() - baseline;
        let speed_mbps = throughput_mbps(bytes, elapsed);
        info!(bytes, failures, elapsed_ms = elapsed.as_millis() as u64, speed_mbps, "upload finished");

        Ok(UploadResult { speed_mbps, bytes, elapsed })
    }

    async fn post_once(&self, client: &Client, cancel: &CancelSignal) -> Result<(), ProbeError> {
        // `Bytes` clones share the allocation.
        let request = client.post(&self.url).body(self.payload.clone()).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            response = request => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status));
        }
        Ok(())
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

fn upload_endpoint(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), UPLOAD_PATH)
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub speed_mbps: f64,
    pub bytes: u64,
    pub elapsed: Duration,
}
