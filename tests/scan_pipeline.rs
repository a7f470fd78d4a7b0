//! Pipeline tests: markup in, scored batch out.
//!
//! Everything below the browser seam is exercised end-to-end; navigation
//! itself needs a live Chrome and stays out of the test suite.

use souqscout::extract::extract_listings;
use souqscout::models::Listing;
use souqscout::navigate::{contains_challenge, search_url};
use souqscout::proxy::ProxyEndpoint;
use souqscout::scoring::{score_listings, DEFAULT_SPAM_FLOOR};

fn result_page(prices: &[&str]) -> String {
    let cards: String = prices
        .iter()
        .enumerate()
        .map(|(i, price)| {
            format!(
                r#"<div data-testid="listing-card">
                     <a href="/ad/item-{i}"></a>
                     <p data-testid="subheading-text">iPhone 15 Pro #{i}</p>
                     <span data-testid="listing-price">{price}</span>
                     <span data-testid="listing-location">Dubai Marina</span>
                   </div>"#
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", cards)
}

#[test]
fn markup_to_scored_batch() {
    let html = result_page(&["AED 1,000", "AED 1,000", "AED 500"]);
    let listings = extract_listings(&html, "iPhone 15 Pro");
    assert_eq!(listings.len(), 3);

    let scored = score_listings(listings, DEFAULT_SPAM_FLOOR);
    assert_eq!(scored.len(), 3);

    // The batch shares one median.
    let medians: Vec<f64> = scored
        .iter()
        .map(|s| s.metrics.unwrap().market_median)
        .collect();
    assert!(medians.iter().all(|m| *m == 1000.0));

    // The underpriced record carries the full spread.
    let deal = scored.iter().find(|s| s.listing.price == 500).unwrap();
    let m = deal.metrics.unwrap();
    assert_eq!(m.profit, 500.0);
    assert_eq!(m.roi_percent, 100.0);
    assert!(m.z_score < 0.0 && m.z_score.is_finite());
}

#[test]
fn unparsable_prices_never_reach_scoring() {
    let html = result_page(&["AED 3,200", "Call for price", "AED 2,900"]);
    let listings = extract_listings(&html, "iPhone 15 Pro");
    assert_eq!(listings.len(), 2);
    assert!(listings.iter().all(|l| l.price > 0));
}

#[test]
fn spam_only_batch_survives_unscored() {
    let html = result_page(&["AED 1", "AED 5", "AED 99"]);
    let listings = extract_listings(&html, "iPhone 15 Pro");
    let scored = score_listings(listings.clone(), DEFAULT_SPAM_FLOOR);
    assert_eq!(scored.len(), listings.len());
    assert!(scored.iter().all(|s| s.metrics.is_none()));
}

#[test]
fn query_label_and_links_stamped_through() {
    let html = result_page(&["AED 2,000"]);
    let listings = extract_listings(&html, "iPhone 15 Pro");
    assert_eq!(listings[0].model_label, "iPhone 15 Pro");
    assert_eq!(listings[0].url, "https://uae.dubizzle.com/ad/item-0");
    assert_eq!(listings[0].location, "Dubai Marina");
}

#[test]
fn fallback_markup_still_scores() {
    let html = r#"
        <html><body>
          <div class="ListingCard--x1">
            <h2>Rolex Submariner</h2>
            <span class="price-label">AED 45,000</span>
            <span class="location-label">Business Bay</span>
          </div>
          <div class="ListingCard--x1">
            <h2>Rolex Submariner no box</h2>
            <span class="price-label">AED 38,000</span>
            <span class="location-label">Deira</span>
          </div>
        </body></html>
    "#;
    let listings = extract_listings(html, "Rolex Submariner");
    assert_eq!(listings.len(), 2);
    let scored = score_listings(listings, DEFAULT_SPAM_FLOOR);
    assert!(scored.iter().all(|s| s.metrics.is_some()));
}

#[test]
fn challenge_page_yields_no_records_but_is_detectable() {
    let html = r#"<html><head><title>Just a moment...</title></head>
        <body><script src="/cdn-cgi/challenge-platform/h/b/orchestrate"></script></body></html>"#;
    assert!(contains_challenge(html));
    assert!(extract_listings(html, "iPhone").is_empty());
}

#[test]
fn proxy_resolution_end_to_end() {
    let endpoint = ProxyEndpoint::parse("1.2.3.4:8080:alice:secret").unwrap();
    assert_eq!(endpoint.server, "http://1.2.3.4:8080");
    let creds = endpoint.credentials.unwrap();
    assert_eq!(creds.username, "alice");
    assert_eq!(creds.password, "secret");

    assert!(ProxyEndpoint::parse("no-colons-here").is_none());
}

#[test]
fn scoring_same_batch_twice_is_identical() {
    let html = result_page(&["AED 900", "AED 1,250", "AED 780", "AED 3,400"]);
    let listings = extract_listings(&html, "iPhone 15 Pro");

    // Cloning keeps observed_at identical, so both passes see the same input.
    let frozen: Vec<Listing> = listings;
    let first = score_listings(frozen.clone(), DEFAULT_SPAM_FLOOR);
    let second = score_listings(frozen, DEFAULT_SPAM_FLOOR);
    assert_eq!(first, second);
}

#[test]
fn query_url_shape() {
    assert_eq!(
        search_url("Gaming PC RTX 4080"),
        "https://uae.dubizzle.com/search/?q=Gaming%20PC%20RTX%204080"
    );
}
