//! Structured listing extraction from marketplace result markup.
//!
//! The upstream markup is unversioned and changes without notice, so
//! extraction is an ordered table of selector strategies: the primary
//! strategy targets the site's `data-testid` tags, and looser class-substring
//! strategies pick up when the tags move. The first strategy that yields any
//! records wins; later strategies are never consulted. A failure on one card
//! skips that card only.

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::models::Listing;
use crate::navigate::SITE_ORIGIN;

/// Selector set for locating listing cards and their fields.
struct SelectorStrategy {
    name: &'static str,
    card: &'static str,
    title: &'static str,
    price: &'static str,
    location: &'static str,
}

/// Strategies in priority order.
const STRATEGIES: &[SelectorStrategy] = &[
    SelectorStrategy {
        name: "test-id",
        card: r#"[data-testid="listing-card"]"#,
        title: r#"[data-testid="subheading-text"], [data-testid="heading-text"]"#,
        price: r#"[data-testid="listing-price"]"#,
        location: r#"[data-testid="listing-location"]"#,
    },
    SelectorStrategy {
        name: "card-class",
        card: r#"div[class*="ListingCard"], li[class*="ListingCard"]"#,
        title: "h2, h3",
        price: r#"[class*="price"], [class*="Price"]"#,
        location: r#"[class*="location"], [class*="Location"]"#,
    },
    SelectorStrategy {
        name: "generic-listing",
        card: r#"li[class*="listing"], article"#,
        title: "h2, h3, h4",
        price: r#"[class*="price"], [class*="Price"]"#,
        location: r#"[class*="location"], [class*="Location"]"#,
    },
];

/// Extract listing records from result-page markup.
///
/// `query_label` is echoed into every record's `model_label`; the engine does
/// not attempt semantic model classification.
pub fn extract_listings(html: &str, query_label: &str) -> Vec<Listing> {
    let document = Html::parse_document(html);

    for strategy in STRATEGIES {
        let records = apply_strategy(&document, strategy, query_label);
        if !records.is_empty() {
            debug!(
                "strategy '{}' extracted {} listings",
                strategy.name,
                records.len()
            );
            return records;
        }
        debug!("strategy '{}' matched nothing, falling through", strategy.name);
    }

    warn!("no extraction strategy matched any listing card");
    Vec::new()
}

fn apply_strategy(document: &Html, strategy: &SelectorStrategy, query_label: &str) -> Vec<Listing> {
    let card_selector = match Selector::parse(strategy.card) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut records = Vec::new();
    for card in document.select(&card_selector) {
        match extract_card(&card, strategy, query_label) {
            Some(listing) => records.push(listing),
            // Missing title, missing price element, or unparsable price text:
            // skip this card, keep the batch.
            None => debug!("skipped a malformed listing card"),
        }
    }
    records
}

fn extract_card(
    card: &ElementRef,
    strategy: &SelectorStrategy,
    query_label: &str,
) -> Option<Listing> {
    let title = select_text(card, strategy.title)?;
    let price_text = select_text(card, strategy.price)?;
    let price = parse_price(&price_text)?;
    let location = select_text(card, strategy.location).unwrap_or_default();
    let url = card_link(card)
        .map(|href| resolve_link(&href))
        .unwrap_or_else(|| format!("{}/search/", SITE_ORIGIN));

    Some(Listing {
        title,
        model_label: query_label.to_string(),
        price,
        location,
        url,
        observed_at: Utc::now(),
    })
}

/// First non-empty text match inside the card for a selector list.
fn select_text(card: &ElementRef, selectors: &str) -> Option<String> {
    let selector = Selector::parse(selectors).ok()?;
    for element in card.select(&selector) {
        let text: String = element.text().collect();
        let text = text.trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    None
}

/// Anchor target for a card: the card itself when it is an `<a>`, otherwise
/// its first descendant anchor.
fn card_link(card: &ElementRef) -> Option<String> {
    if card.value().name() == "a" {
        if let Some(href) = card.value().attr("href") {
            return Some(href.to_string());
        }
    }
    let selector = Selector::parse("a[href]").ok()?;
    card.select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.to_string())
}

/// Keep digit characters of the raw price text and parse them as a whole-AED
/// amount. No digits, a zero value, or overflow all mean "no parsable price".
pub fn parse_price(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    match digits.parse::<i64>() {
        Ok(value) if value > 0 => Some(value),
        _ => None,
    }
}

/// Absolute links pass through; everything else is anchored to the site
/// origin.
pub fn resolve_link(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", SITE_ORIGIN, href)
    } else {
        format!("{}/{}", SITE_ORIGIN, href)
    }
}
