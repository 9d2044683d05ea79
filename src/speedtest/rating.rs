//! Activity suitability scores derived from a finished measurement.
//!
//! Every activity is a cascade of tiers ordered from worst to best. The first
//! tier whose predicate holds decides the score; a measurement that violates
//! none of them scores [`BEST_SCORE`]. All comparisons are strict.

use serde::Serialize;

pub const BEST_SCORE: u8 = 5;

#[derive(Debug, Clone, Copy)]
struct Measurements {
    download_mbps: f64,
    upload_mbps: f64,
    ping_ms: f64,
}

struct Tier {
    score: u8,
    violated: fn(&Measurements) -> bool,
}

const GAMING: &[Tier] = &[
    Tier { score: 1, violated: |m| m.ping_ms > 100.0 || m.download_mbps < 5.0 },
    Tier { score: 2, violated: |m| m.ping_ms > 70.0 || m.download_mbps < 10.0 },
    Tier { score: 3, violated: |m| m.ping_ms > 50.0 || m.upload_mbps < 1.0 },
    Tier { score: 4, violated: |m| m.ping_ms > 30.0 || m.download_mbps < 25.0 },
];

const STREAMING: &[Tier] = &[
    Tier { score: 1, violated: |m| m.ping_ms > 200.0 || m.download_mbps < 3.0 },
    Tier { score: 2, violated: |m| m.download_mbps < 5.0 },
    Tier { score: 3, violated: |m| m.download_mbps < 8.0 },
    Tier { score: 4, violated: |m| m.download_mbps < 25.0 },
];

const BROWSING: &[Tier] = &[
    Tier { score: 1, violated: |m| m.ping_ms > 300.0 || m.download_mbps < 1.0 },
    Tier { score: 2, violated: |m| m.ping_ms > 200.0 || m.download_mbps < 2.0 },
    Tier { score: 3, violated: |m| m.ping_ms > 100.0 || m.download_mbps < 5.0 },
    Tier { score: 4, violated: |m| m.ping_ms > 60.0 || m.download_mbps < 10.0 },
];

const CALLING: &[Tier] = &[
    Tier {
        score: 1,
        violated: |m| m.ping_ms > 300.0 || m.upload_mbps < 0.5 || m.download_mbps < 1.0,
    },
    Tier {
        score: 2,
        violated: |m| m.ping_ms > 150.0 || m.upload_mbps < 1.0 || m.download_mbps < 1.5,
    },
    Tier {
        score: 3,
        violated: |m| m.ping_ms > 100.0 || m.upload_mbps < 1.5 || m.download_mbps < 3.0,
    },
    Tier {
        score: 4,
        violated: |m| m.ping_ms > 50.0 || m.upload_mbps < 3.0 || m.download_mbps < 5.0,
    },
];

fn cascade(tiers: &[Tier], m: &Measurements) -> u8 {
    tiers
        .iter()
        .find(|tier| (tier.violated)(m))
        .map_or(BEST_SCORE, |tier| tier.score)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Ratings {
    pub gaming: u8,
    pub streaming: u8,
    pub browsing: u8,
    pub calling: u8,
}

impl Ratings {
    pub fn derive(download_mbps: f64, upload_mbps: f64, ping_ms: f64) -> Self {
        let m = Measurements {
            download_mbps,
            upload_mbps,
            ping_ms,
        };
        Self {
            gaming: cascade(GAMING, &m),
            streaming: cascade(STREAMING, &m),
            browsing: cascade(BROWSING, &m),
            calling: cascade(CALLING, &m),
        }
    }

    pub fn entries(&self) -> [(&'static str, u8); 4] {
        [
            ("gaming", self.gaming),
            ("streaming", self.streaming),
            ("browsing", self.browsing),
            ("calling", self.calling),
        ]
    }
}

pub fn label(score: u8) -> &'static str {
    match score {
        0 | 1 => "Poor",
        2 => "Fair",
        3 => "Good",
        4 => "Great",
        _ => "Excellent",
    }
}
