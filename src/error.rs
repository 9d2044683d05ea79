use reqwest::StatusCode;
use thiserror::Error;

/// Why a single probe request produced no measurement.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    /// The phase deadline passed or the caller aborted. Not a failure.
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("phase budget must be greater than zero")]
    ZeroBudget,

    #[error("at least one download stream is required")]
    ZeroStreams,

    #[error("upload payload must not be empty")]
    EmptyPayload,

    #[error("at least one ping sample is required")]
    ZeroPingCount,

    #[error("sample interval must be greater than zero")]
    ZeroSampleInterval,

    #[error("download URL pool is empty")]
    EmptyUrlPool,

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}
