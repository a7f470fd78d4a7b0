//! souqscout - marketplace listing acquisition and price-anomaly scanning.
//!
//! Acquires classified-listing data from an anti-bot protected marketplace
//! (headless browser session with stealth evasion, optional proxy binding,
//! multi-strategy HTML extraction) and scores each batch for statistical
//! price anomalies: batch median, spread, ROI at median resale, and z-score.
//!
//! One [`acquire::MarketScanner::run`] call is one fully independent run:
//! one proxy draw, one browser session, one query, one in-memory report.

pub mod acquire;
pub mod browser;
pub mod cli;
pub mod config;
pub mod extract;
pub mod logbuf;
pub mod models;
pub mod navigate;
pub mod proxy;
pub mod scoring;

pub use acquire::MarketScanner;
pub use config::ScanConfig;
pub use models::{DealMetrics, Diagnostics, Listing, ScanReport, ScoredListing};
pub use proxy::ProxyEndpoint;
