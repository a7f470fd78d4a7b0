//! Batch price statistics and anomaly scoring.
//!
//! Scoring is a pure function of one extracted batch: the median stands in
//! for "market value" (robust to the skew of self-reported asking prices),
//! and each listing gets its spread, ROI, and standardized distance relative
//! to that batch. There is no historical baseline; a new batch means a fresh
//! set of metrics.

use tracing::debug;

use crate::models::{DealMetrics, Listing, ScoredListing};

/// Prices at or below this are treated as data-entry artifacts ("1 AED"
/// placeholder listings), not real offers.
pub const DEFAULT_SPAM_FLOOR: i64 = 100;

/// Z-score at or below which a listing counts as a statistically significant
/// underprice. The engine computes the signal; acting on it is the caller's
/// call.
pub const UNDERPRICE_Z_THRESHOLD: f64 = -1.5;

/// Score a batch of listings against its own price distribution.
///
/// Records priced at or below `spam_floor` are dropped before the statistics
/// are computed. If that drops the entire batch, the original records are
/// returned unscored (`metrics: None`) rather than returning nothing.
pub fn score_listings(listings: Vec<Listing>, spam_floor: i64) -> Vec<ScoredListing> {
    if listings.is_empty() {
        return Vec::new();
    }

    let filtered: Vec<Listing> = listings
        .iter()
        .filter(|listing| listing.price > spam_floor)
        .cloned()
        .collect();

    if filtered.is_empty() {
        debug!(
            "spam floor {} swallowed all {} listings, returning batch unscored",
            spam_floor,
            listings.len()
        );
        return listings
            .into_iter()
            .map(|listing| ScoredListing {
                listing,
                metrics: None,
            })
            .collect();
    }

    let prices: Vec<f64> = filtered.iter().map(|l| l.price as f64).collect();
    let market_median = median(&prices);
    // A single-listing batch has no defined dispersion, and a uniform batch
    // has zero; both substitute 1 so the z-score stays finite.
    let std_dev = match sample_std_dev(&prices) {
        Some(s) if s > 0.0 => s,
        _ => 1.0,
    };

    filtered
        .into_iter()
        .map(|listing| {
            let price = listing.price as f64;
            let profit = market_median - price;
            let metrics = DealMetrics {
                market_median,
                profit,
                roi_percent: 100.0 * profit / price,
                z_score: (price - market_median) / std_dev,
            };
            ScoredListing {
                listing,
                metrics: Some(metrics),
            }
        })
        .collect()
}

/// Whether a scored listing clears the underprice significance threshold.
pub fn is_significant_underprice(scored: &ScoredListing) -> bool {
    scored
        .metrics
        .map(|m| m.z_score <= UNDERPRICE_Z_THRESHOLD)
        .unwrap_or(false)
}

/// Median with midpoint interpolation for even-sized samples.
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Sample standard deviation (n - 1 denominator). `None` below two samples.
fn sample_std_dev(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1) as f64;
    Some(variance.sqrt())
}
