use super::meter::{sample_until_cancelled, throughput_mbps, ByteCounter, ThroughputProgress};
use super::session::CancelSignal;
use crate::error::ProbeError;
use crate::settings::Settings;
use anyhow::Result;
use futures::future::join_all;
use futures::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Saturates the downlink with parallel GET streams against a pool of large
/// payloads until the phase budget runs out.
pub struct DownloadTest {
    urls: Vec<String>,
    streams: usize,
    budget: Duration,
    sample_interval: Duration,
}

impl DownloadTest {
    pub fn new(settings: &Settings) -> Self {
        Self {
            urls: settings.download_urls.clone(),
            streams: settings.streams,
            budget: settings.phase_budget,
            sample_interval: settings.sample_interval,
        }
    }

    pub async fn run(
        &self,
        counter: &ByteCounter,
        abort: &CancelSignal,
        progress_tx: mpsc::Sender<ThroughputProgress>,
    ) -> Result<DownloadResult> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let cancel = abort.with_deadline(self.budget);
        let start = Instant::now();
        let baseline = counter.get();

        let streams = (0..self.streams).map(|id| self.stream(id, &client, counter, &cancel));
        let sampler = sample_until_cancelled(counter, start, self.sample_interval, &cancel, &progress_tx);
        tokio::join!(join_all(streams), sampler);

        let elapsed = start.elapsed();
        let bytes = counter.get() - baseline;
        let speed_mbps = throughput_mbps(bytes, elapsed);
        info!(bytes, elapsed_ms = elapsed.as_millis() as u64, speed_mbps, "download finished");

        Ok(DownloadResult { speed_mbps, bytes, elapsed })
    }

    async fn stream(&self, id: usize, client: &Client, counter: &ByteCounter, cancel: &CancelSignal) {
        let mut requests = 0u64;
        while !cancel.is_cancelled() {
            let Some(url) = self.next_url() else { break };
            requests += 1;
            match fetch_into(client, &url, counter, cancel).await {
                Ok(()) => {}
                Err(ProbeError::Cancelled) => break,
                Err(e) => debug!(stream = id, %url, error = %e, "download request failed, retrying"),
            }
        }
        debug!(stream = id, requests, "download stream stopped");
    }

    fn next_url(&self) -> Option<String> {
        let mut rng = rand::thread_rng();
        let base = self.urls.choose(&mut rng)?;
        Some(cache_busted(base, rng.gen()))
    }
}

/// Appends a random query parameter so intermediaries cannot serve the
/// payload from cache.
fn cache_busted(base: &str, nonce: u64) -> String {
    match reqwest::Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("cb", &nonce.to_string());
            url.into()
        }
        Err(_) => {
            let sep = if base.contains('?') { '&' } else { '?' };
            format!("{base}{sep}cb={nonce}")
        }
    }
}

/// Streams one response body into `counter`. Chunks that arrive after
/// `cancel` is raised are not counted.
async fn fetch_into(
    client: &Client,
    url: &str,
    counter: &ByteCounter,
    cancel: &CancelSignal,
) -> Result<(), ProbeError> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
        response = client.get(url).send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(ProbeError::Status(status));
    }

    let mut stream = response.bytes_stream();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            next = stream.next() => next,
        };

        match next {
            Some(chunk) => counter.add(chunk?.len() as u64),
            None => return Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub speed_mbps: f64,
    pub bytes: u64,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(urls: Vec<String>) -> Settings {
        Settings {
            phase_budget: Duration::from_millis(400),
            streams: 3,
            sample_interval: Duration::from_millis(50),
            download_urls: urls,
            ..Settings::default()
        }
    }

    #[test]
    fn cache_buster_appends_query() {
        assert_eq!(
            cache_busted("https://cdn.example.com/big.jpg", 7),
            "https://cdn.example.com/big.jpg?cb=7"
        );
        assert_eq!(
            cache_busted("https://cdn.example.com/big.jpg?w=4000", 7),
            "https://cdn.example.com/big.jpg?w=4000&cb=7"
        );
    }

    #[tokio::test]
    async fn saturates_until_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 256 * 1024]))
            .mount(&server)
            .await;

        let test = DownloadTest::new(&settings_for(vec![format!("{}/big.jpg", server.uri())]));
        let counter = ByteCounter::default();
        let (tx, mut rx) = mpsc::channel(256);

        let result = test.run(&counter, &CancelSignal::new(), tx).await.unwrap();

        assert!(result.bytes > 0);
        assert_eq!(result.bytes, counter.get());
        assert!(result.speed_mbps > 0.0);
        assert!(result.elapsed >= Duration::from_millis(400));
        assert!(result.elapsed < Duration::from_secs(5));

        let mut previous = 0;
        while let Ok(progress) = rx.try_recv() {
            assert!(progress.transferred_bytes >= previous);
            previous = progress.transferred_bytes;
        }
        assert!(previous > 0);
    }

    #[tokio::test]
    async fn failing_streams_report_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let test = DownloadTest::new(&settings_for(vec![format!("{}/big.jpg", server.uri())]));
        let (tx, _rx) = mpsc::channel(256);

        let result = test.run(&ByteCounter::default(), &CancelSignal::new(), tx).await.unwrap();

        assert_eq!(result.bytes, 0);
        assert_eq!(result.speed_mbps, 0.0);
        // Streams keep retrying until the deadline.
        assert!(server.received_requests().await.unwrap().len() > 3);
    }

    #[tokio::test]
    async fn immediate_abort_reports_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 1024]))
            .mount(&server)
            .await;

        let abort = CancelSignal::new();
        abort.cancel();

        let test = DownloadTest::new(&settings_for(vec![format!("{}/big.jpg", server.uri())]));
        let (tx, _rx) = mpsc::channel(16);
        let result = test.run(&ByteCounter::default(), &abort, tx).await.unwrap();

        assert_eq!(result.bytes, 0);
        assert_eq!(result.speed_mbps, 0.0);
        assert!(!result.speed_mbps.is_nan());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
