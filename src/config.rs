//! Run configuration.

use std::time::Duration;

use crate::scoring::DEFAULT_SPAM_FLOOR;

/// Default upper bound on each navigation wait.
pub const DEFAULT_NAV_TIMEOUT: Duration = Duration::from_secs(30);

/// Default fixed pause for challenge interstitials to resolve.
pub const DEFAULT_CHALLENGE_DWELL: Duration = Duration::from_secs(8);

/// Configuration for one acquisition run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Free-text item class to search for.
    pub query: String,
    /// Capture screenshot and HTML-sample diagnostics.
    pub debug: bool,
    /// Raw proxy strings as supplied by the operator. Parsed at draw time;
    /// malformed entries are dropped, not fatal.
    pub proxies: Vec<String>,
    /// Prices at or below this are treated as placeholder listings.
    pub spam_floor: i64,
    pub nav_timeout: Duration,
    pub challenge_dwell: Duration,
}

impl ScanConfig {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            debug: false,
            proxies: Vec::new(),
            spam_floor: DEFAULT_SPAM_FLOOR,
            nav_timeout: DEFAULT_NAV_TIMEOUT,
            challenge_dwell: DEFAULT_CHALLENGE_DWELL,
        }
    }

    /// Apply environment overrides.
    ///
    /// - `SOUQ_SPAM_FLOOR` - spam floor in AED
    /// - `SOUQ_NAV_TIMEOUT_SECS` - per-navigation timeout
    /// - `SOUQ_CHALLENGE_DWELL_SECS` - challenge dwell
    /// - `SOUQ_PROXIES` - comma-separated proxy strings, appended to any
    ///   supplied on the command line
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("SOUQ_SPAM_FLOOR") {
            if let Ok(floor) = value.parse() {
                self.spam_floor = floor;
            }
        }
        if let Ok(value) = std::env::var("SOUQ_NAV_TIMEOUT_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                self.nav_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(value) = std::env::var("SOUQ_CHALLENGE_DWELL_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                self.challenge_dwell = Duration::from_secs(secs);
            }
        }
        if let Ok(value) = std::env::var("SOUQ_PROXIES") {
            self.proxies.extend(
                value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            );
        }
        self
    }
}
