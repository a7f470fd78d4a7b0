//! Data model for one acquisition run.
//!
//! Everything here has value semantics and a lifetime of a single batch:
//! records are built once by the extractor, scored once against their own
//! batch, and handed to the caller inside a [`ScanReport`] that is never
//! mutated afterward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized classified listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing title as shown on the card.
    pub title: String,
    /// The query label the run was acquired with. The engine echoes the
    /// operator's query rather than attempting model classification.
    pub model_label: String,
    /// Asking price in whole AED, stripped of currency text and separators.
    /// Always positive; cards without a parsable price never become records.
    pub price: i64,
    /// Seller-reported location, empty when the card carries none.
    pub location: String,
    /// Absolute link to the listing.
    pub url: String,
    /// When this record was extracted.
    pub observed_at: DateTime<Utc>,
}

/// Batch-relative deal metrics.
///
/// All four fields are derived together from the same filtered batch median
/// and dispersion. They are meaningless outside that batch and are never
/// recomputed field-by-field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DealMetrics {
    /// Median asking price of the filtered batch.
    pub market_median: f64,
    /// `market_median - price`: the spread captured by buying this listing
    /// and reselling at the batch median.
    pub profit: f64,
    /// `100 * profit / price`. Negative for listings priced above market.
    pub roi_percent: f64,
    /// Standardized distance of the price from the batch median. Strongly
    /// negative values flag statistically significant underprices.
    pub z_score: f64,
}

/// A listing together with its batch-relative metrics.
///
/// `metrics` is `None` only on the documented spam-floor fallback path, where
/// the whole batch fell at or below the floor and is returned unscored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredListing {
    #[serde(flatten)]
    pub listing: Listing,
    pub metrics: Option<DealMetrics>,
}

/// Diagnostic artifacts from one run, for the presentation layer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    /// Status observed on the query document response. 407 marks a proxy
    /// credential failure, 0 means the navigation never produced a response.
    pub http_status: u16,
    /// Server of the proxy drawn for the run, if any.
    pub proxy_used: Option<String>,
    /// Bounded prefix of the final markup. Populated only in debug runs.
    pub html_sample: String,
    /// Downscaled JPEG of the final page. Populated only in debug runs.
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
}

/// The result bundle of one acquisition run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub listings: Vec<ScoredListing>,
    pub diagnostics: Diagnostics,
    /// Timestamped operator-visible trail, oldest first, capacity-bounded.
    pub logs: Vec<String>,
}

impl ScanReport {
    /// True when the run produced no records, whatever the reason.
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}
