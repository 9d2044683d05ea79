pub mod download;
pub mod meter;
pub mod ping;
pub mod rating;
pub mod session;
pub mod upload;

use rating::{label, Ratings};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpeedTestResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub jitter_ms: f64,
    pub ratings: Ratings,
}

impl fmt::Display for SpeedTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Download  {:>9.2} Mbps", self.download_mbps)?;
        writeln!(f, "Upload    {:>9.2} Mbps", self.upload_mbps)?;
        writeln!(f, "Ping      {:>9.0} ms (jitter {:.1} ms)", self.ping_ms, self.jitter_ms)?;
        for (activity, score) in self.ratings.entries() {
            writeln!(f, "{:<10}{:>4}/5  {}", activity, score, label(score))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Idle,
    Download,
    Upload,
    Ping,
    Complete,
}

impl TestPhase {
    pub fn is_running(self) -> bool {
        matches!(self, TestPhase::Download | TestPhase::Upload | TestPhase::Ping)
    }
}
