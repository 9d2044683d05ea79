use crate::error::SettingsError;
use std::time::Duration;

pub const DEFAULT_DOWNLOAD_URLS: &[&str] = &[
    "https://upload.wikimedia.org/wikipedia/commons/3/3f/Fronalpstock_big.jpg",
    "https://upload.wikimedia.org/wikipedia/commons/f/ff/Pizigani_1367_Chart_10MB.jpg",
    "https://upload.wikimedia.org/wikipedia/commons/2/2d/Snake_River_%285mb%29.jpg",
];
pub const DEFAULT_UPLOAD_BASE_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_PING_URL: &str = "https://www.google.com/favicon.ico";

const MIN_BUDGET: Duration = Duration::from_secs(2);
const MAX_BUDGET: Duration = Duration::from_secs(30);
const BUDGET_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Settings {
    /// Hard wall-clock deadline for each of the download and upload phases.
    pub phase_budget: Duration,
    pub streams: usize,
    pub upload_payload_bytes: usize,
    pub ping_count: usize,
    pub ping_pause: Duration,
    pub sample_interval: Duration,
    pub download_urls: Vec<String>,
    pub upload_base_url: String,
    pub ping_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            phase_budget: Duration::from_millis(8000),
            streams: 4,
            upload_payload_bytes: 1024 * 1024,
            ping_count: 5,
            ping_pause: Duration::from_millis(200),
            sample_interval: Duration::from_millis(200),
            download_urls: DEFAULT_DOWNLOAD_URLS.iter().map(|u| u.to_string()).collect(),
            upload_base_url: DEFAULT_UPLOAD_BASE_URL.to_string(),
            ping_url: DEFAULT_PING_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.phase_budget.is_zero() {
            return Err(SettingsError::ZeroBudget);
        }
        if self.streams == 0 {
            return Err(SettingsError::ZeroStreams);
        }
        if self.upload_payload_bytes == 0 {
            return Err(SettingsError::EmptyPayload);
        }
        if self.ping_count == 0 {
            return Err(SettingsError::ZeroPingCount);
        }
        if self.sample_interval.is_zero() {
            return Err(SettingsError::ZeroSampleInterval);
        }
        if self.download_urls.is_empty() {
            return Err(SettingsError::EmptyUrlPool);
        }

        let urls = self
            .download_urls
            .iter()
            .chain([&self.upload_base_url, &self.ping_url]);
        for url in urls {
            reqwest::Url::parse(url).map_err(|e| SettingsError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    pub fn budget_secs(&self) -> u64 {
        self.phase_budget.as_secs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    PhaseBudget,
    Streams,
    PingCount,
}

impl SettingsField {
    pub fn next(self) -> Self {
        match self {
            SettingsField::PhaseBudget => SettingsField::Streams,
            SettingsField::Streams => SettingsField::PingCount,
            SettingsField::PingCount => SettingsField::PhaseBudget,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            SettingsField::PhaseBudget => SettingsField::PingCount,
            SettingsField::Streams => SettingsField::PhaseBudget,
            SettingsField::PingCount => SettingsField::Streams,
        }
    }

    pub fn increase(self, settings: &mut Settings) {
        match self {
            SettingsField::PhaseBudget => {
                settings.phase_budget = (settings.phase_budget + BUDGET_STEP).min(MAX_BUDGET);
            }
            SettingsField::Streams => {
                settings.streams = (settings.streams + 1).min(16);
            }
            SettingsField::PingCount => {
                settings.ping_count = (settings.ping_count + 1).min(20);
            }
        }
    }

    pub fn decrease(self, settings: &mut Settings) {
        match self {
            SettingsField::PhaseBudget => {
                settings.phase_budget = settings
                    .phase_budget
                    .saturating_sub(BUDGET_STEP)
                    .max(MIN_BUDGET);
            }
            SettingsField::Streams => {
                settings.streams = settings.streams.saturating_sub(1).max(1);
            }
            SettingsField::PingCount => {
                settings.ping_count = settings.ping_count.saturating_sub(1).max(1);
            }
        }
    }
}
