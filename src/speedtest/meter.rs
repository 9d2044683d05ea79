use super::session::CancelSignal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const MAX_SAMPLES: usize = 200;

/// Monotonic byte counter shared by every transfer task of a phase.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Megabits per second, rounded to two decimals. Zero bytes or zero elapsed
/// time yields `0.0`.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return 0.0;
    }
    round2(bytes as f64 * 8.0 / secs / 1_000_000.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone)]
pub struct ThroughputProgress {
    pub transferred_bytes: u64,
    pub elapsed: Duration,
    pub current_mbps: f64,
    pub speed_samples: Vec<f64>,
}

/// Publishes the cumulative-average throughput every `every` until `cancel`
/// is raised.
pub async fn sample_until_cancelled(
    counter: &ByteCounter,
    started: Instant,
    every: Duration,
    cancel: &CancelSignal,
    progress_tx: &mpsc::Sender<ThroughputProgress>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick completes immediately.
    ticker.tick().await;

    let mut speed_samples: Vec<f64> = Vec::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let elapsed = started.elapsed();
        let transferred_bytes = counter.get();
        let current_mbps = throughput_mbps(transferred_bytes, elapsed);

        speed_samples.push(current_mbps);
        if speed_samples.len() > MAX_SAMPLES {
            speed_samples.remove(0);
        }

        let _ = progress_tx
            .send(ThroughputProgress {
                transferred_bytes,
                elapsed,
                current_mbps,
                speed_samples: speed_samples.clone(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn one_megabyte_in_one_second_is_eight_mbps() {
        assert_eq!(throughput_mbps(1_000_000, Duration::from_secs(1)), 8.0);
    }

    #[test]
    fn ten_megabytes_over_eight_seconds_is_ten_mbps() {
        assert_eq!(throughput_mbps(10_000_000, Duration::from_secs(8)), 10.0);
    }

    #[test]
    fn degenerate_inputs_are_zero() {
        assert_eq!(throughput_mbps(0, Duration::from_secs(8)), 0.0);
        assert_eq!(throughput_mbps(0, Duration::ZERO), 0.0);
        assert_eq!(throughput_mbps(1_000, Duration::ZERO), 0.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        // 1234567 * 8 / 3 / 1e6 = 3.292178...
        assert_eq!(throughput_mbps(1_234_567, Duration::from_secs(3)), 3.29);
        assert_eq!(round2(2.345_001), 2.35);
    }

    #[test]
    fn counter_accumulates() {
        let counter = ByteCounter::default();
        let shared = counter.clone();
        counter.add(10);
        shared.add(32);
        assert_eq!(counter.get(), 42);
    }

    proptest! {
        #[test]
        fn throughput_is_finite_and_non_negative(bytes in 0u64..10_000_000_000, millis in 0u64..120_000) {
            let mbps = throughput_mbps(bytes, Duration::from_millis(millis));
            prop_assert!(mbps.is_finite());
            prop_assert!(mbps >= 0.0);
        }

        #[test]
        fn throughput_matches_formula(bytes in 1u64..10_000_000_000, millis in 1u64..120_000) {
            let secs = millis as f64 / 1000.0;
            let exact = bytes as f64 * 8.0 / secs / 1_000_000.0;
            let mbps = throughput_mbps(bytes, Duration::from_millis(millis));
            prop_assert!((mbps - exact).abs() <= 0.0051);
        }
    }

    #[tokio::test]
    async fn sampler_publishes_until_cancelled() {
        let counter = ByteCounter::default();
        counter.add(500_000);
        let cancel = CancelSignal::new();
        let (tx, mut rx) = mpsc::channel(64);

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            stopper.cancel();
        });

        sample_until_cancelled(&counter, Instant::now(), Duration::from_millis(20), &cancel, &tx).await;
        drop(tx);

        let mut last = None;
        while let Some(progress) = rx.recv().await {
            assert_eq!(progress.transferred_bytes, 500_000);
            assert!(progress.current_mbps > 0.0);
            last = Some(progress);
        }
        let last = last.expect("at least one sample");
        assert!(!last.speed_samples.is_empty());
    }
}
