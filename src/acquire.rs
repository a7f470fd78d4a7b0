//! End-to-end acquisition orchestration.
//!
//! One invocation is one run: one proxy draw, one browser session, one
//! query, one scored batch. The failure posture is total: any stage failure
//! produces a report with an empty record list and a populated diagnostic
//! trail, never a propagated error. The session is torn down on every path
//! before the outcome is even inspected.

use rand::Rng;
use tracing::{info, warn};

use crate::browser::{BrowserSession, SessionConfig};
use crate::config::ScanConfig;
use crate::extract::extract_listings;
use crate::logbuf::{RunLog, DEFAULT_LOG_CAPACITY};
use crate::models::{Diagnostics, ScanReport};
use crate::navigate::{NavError, NavOutcome, Navigator, PROXY_AUTH_STATUS};
use crate::proxy::ProxyEndpoint;
use crate::scoring::score_listings;

/// Upper bound on the markup prefix kept in debug diagnostics.
const HTML_SAMPLE_CHARS: usize = 2000;

/// Runs one acquisition per [`MarketScanner::run`] call. Invocations are
/// fully independent; concurrent callers must construct their own scanner.
pub struct MarketScanner {
    config: ScanConfig,
}

impl MarketScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Execute one acquisition run. Infallible by contract: every failure
    /// mode collapses into an empty-record report.
    pub async fn run(&self) -> ScanReport {
        let mut log = RunLog::new(DEFAULT_LOG_CAPACITY);
        info!("starting scan for '{}'", self.config.query);
        log.push(&format!("scan start: {}", self.config.query));

        let proxy = self.draw_proxy(&mut log);
        let proxy_used = proxy.as_ref().map(|p| p.server.clone());
        if let Some(ref server) = proxy_used {
            log.push(&format!("proxy drawn: {}", server));
        }

        let session_config = SessionConfig::randomized(proxy, self.config.nav_timeout);
        log.push(&format!("user agent: {}", session_config.user_agent));

        let session = match BrowserSession::launch(&session_config).await {
            Ok(session) => session,
            Err(e) => {
                warn!("browser launch failed: {:#}", e);
                log.push(&format!("browser launch failed: {}", e));
                return failed_report(0, proxy_used, log);
            }
        };

        let mut navigator = Navigator::new(
            &self.config.query,
            self.config.debug,
            self.config.nav_timeout,
            self.config.challenge_dwell,
        );
        let nav_result = navigator.run(session.page(), &mut log).await;

        // Teardown happens before the outcome is interpreted so that no
        // early return below can leak the session.
        session.close().await;

        let outcome = match nav_result {
            Ok(outcome) => outcome,
            Err(e) => {
                let status = match &e {
                    NavError::ProxyAuth(_) => PROXY_AUTH_STATUS,
                    _ => 0,
                };
                warn!("navigation failed: {}", e);
                log.push(&format!("navigation failed: {}", e));
                return failed_report(status, proxy_used, log);
            }
        };

        self.assemble(outcome, proxy_used, log)
    }

    /// Parse the operator's proxy strings and draw one uniformly at random.
    /// Malformed entries are excluded from the draw, not reported as errors.
    fn draw_proxy(&self, log: &mut RunLog) -> Option<ProxyEndpoint> {
        if self.config.proxies.is_empty() {
            return None;
        }

        let candidates: Vec<ProxyEndpoint> = self
            .config
            .proxies
            .iter()
            .filter_map(|raw| ProxyEndpoint::parse(raw))
            .collect();

        let dropped = self.config.proxies.len() - candidates.len();
        if dropped > 0 {
            log.push(&format!("ignored {} malformed proxy entries", dropped));
        }
        if candidates.is_empty() {
            log.push("no usable proxy, connecting directly");
            return None;
        }

        let mut rng = rand::rng();
        let pick = rng.random_range(0..candidates.len());
        Some(candidates[pick].clone())
    }

    fn assemble(
        &self,
        outcome: NavOutcome,
        proxy_used: Option<String>,
        mut log: RunLog,
    ) -> ScanReport {
        let listings = extract_listings(&outcome.html, &self.config.query);
        log.push(&format!("extracted {} listings", listings.len()));
        if listings.is_empty() && outcome.challenge_detected {
            log.push("zero listings behind a challenge page: likely blocked, not empty");
        }

        let scored = score_listings(listings, self.config.spam_floor);
        log.push(&format!("scored {} records", scored.len()));

        let html_sample = if self.config.debug {
            outcome.html.chars().take(HTML_SAMPLE_CHARS).collect()
        } else {
            String::new()
        };

        ScanReport {
            listings: scored,
            diagnostics: Diagnostics {
                http_status: outcome.http_status,
                proxy_used,
                html_sample,
                screenshot: outcome.screenshot,
            },
            logs: log.into_entries(),
        }
    }
}

fn failed_report(http_status: u16, proxy_used: Option<String>, log: RunLog) -> ScanReport {
    ScanReport {
        listings: Vec::new(),
        diagnostics: Diagnostics {
            http_status,
            proxy_used,
            html_sample: String::new(),
            screenshot: None,
        },
        logs: log.into_entries(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner_with_proxies(proxies: Vec<&str>) -> MarketScanner {
        let mut config = ScanConfig::new("iPhone 15 Pro");
        config.proxies = proxies.into_iter().map(String::from).collect();
        MarketScanner::new(config)
    }

    #[test]
    fn draw_skips_malformed_entries() {
        let scanner = scanner_with_proxies(vec!["not a proxy", "1.2.3.4:8080:alice:secret"]);
        let mut log = RunLog::default();
        let drawn = scanner.draw_proxy(&mut log).unwrap();
        assert_eq!(drawn.server, "http://1.2.3.4:8080");
        assert!(log.len() > 0);
    }

    #[test]
    fn draw_with_no_usable_entries_is_none() {
        let scanner = scanner_with_proxies(vec!["junk", "also junk"]);
        let mut log = RunLog::default();
        assert!(scanner.draw_proxy(&mut log).is_none());
    }

    #[test]
    fn draw_without_proxies_is_silent() {
        let scanner = scanner_with_proxies(vec![]);
        let mut log = RunLog::default();
        assert!(scanner.draw_proxy(&mut log).is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn draw_is_uniform_over_valid_entries() {
        let scanner = scanner_with_proxies(vec!["10.0.0.1:8080", "10.0.0.2:8080"]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let mut log = RunLog::default();
            if let Some(endpoint) = scanner.draw_proxy(&mut log) {
                seen.insert(endpoint.server);
            }
        }
        // Both candidates should show up over 64 draws.
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn failed_report_shape() {
        let mut log = RunLog::default();
        log.push("navigation failed: proxy authentication failed");
        let report = failed_report(407, Some("http://1.2.3.4:8080".into()), log);
        assert!(report.is_empty());
        assert_eq!(report.diagnostics.http_status, 407);
        assert_eq!(
            report.diagnostics.proxy_used.as_deref(),
            Some("http://1.2.3.4:8080")
        );
        assert_eq!(report.logs.len(), 1);
    }

    #[test]
    fn assemble_scores_extracted_markup() {
        let markup = r#"
            <div data-testid="listing-card">
              <p data-testid="subheading-text">iPhone 15 Pro</p>
              <span data-testid="listing-price">AED 3,000</span>
            </div>
            <div data-testid="listing-card">
              <p data-testid="subheading-text">iPhone 15 Pro urgent</p>
              <span data-testid="listing-price">AED 2,000</span>
            </div>
        "#;
        let scanner = scanner_with_proxies(vec![]);
        let outcome = NavOutcome {
            http_status: 200,
            html: markup.to_string(),
            challenge_detected: false,
            screenshot: None,
        };
        let report = scanner.assemble(outcome, None, RunLog::default());
        assert_eq!(report.listings.len(), 2);
        assert!(report.listings.iter().all(|l| l.metrics.is_some()));
        assert_eq!(report.diagnostics.http_status, 200);
        // Not a debug run: no HTML sample retained.
        assert!(report.diagnostics.html_sample.is_empty());
    }

    #[test]
    fn assemble_bounds_html_sample_in_debug_runs() {
        let mut config = ScanConfig::new("iPhone");
        config.debug = true;
        let scanner = MarketScanner::new(config);
        let outcome = NavOutcome {
            http_status: 403,
            html: "x".repeat(10_000),
            challenge_detected: true,
            screenshot: None,
        };
        let report = scanner.assemble(outcome, None, RunLog::default());
        assert_eq!(report.diagnostics.html_sample.len(), HTML_SAMPLE_CHARS);
        assert_eq!(report.diagnostics.http_status, 403);
        assert!(report.is_empty());
    }
}
