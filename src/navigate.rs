//! Query navigation: warm-up, search, challenge handling, content capture.
//!
//! A run moves through an explicit phase machine so that every blocking step
//! is visible and individually bounded:
//!
//! `Idle -> WarmingUp -> Searching -> ChallengeWait -> Content -> Done`
//!
//! with `Failed` as the terminal error phase. The warm-up visit to the site
//! root picks up baseline cookies before the query request; the challenge
//! dwell is a fixed, non-adaptive pause with no verification loop.

use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::logbuf::RunLog;

/// Origin of the marketplace. Relative listing links are anchored here.
pub const SITE_ORIGIN: &str = "https://uae.dubizzle.com";

/// Status reported when the proxy layer rejects our credentials.
pub const PROXY_AUTH_STATUS: u16 = 407;

/// Markup signatures of challenge interstitials served in front of content.
const CHALLENGE_SIGNATURES: &[&str] = &[
    "cf-challenge",
    "challenge-platform",
    "Just a moment",
    "_cf_chl_opt",
    "turnstile",
];

/// Chrome network error fragments that implicate the proxy tunnel rather
/// than the origin.
const PROXY_ERROR_MARKERS: &[&str] = &["ERR_PROXY_", "ERR_TUNNEL_", "ERR_NO_SUPPORTED_PROXIES"];

/// How long to watch the CDP event stream for the document response after a
/// navigation completes.
const STATUS_WATCH_WINDOW: Duration = Duration::from_millis(1500);

/// Settle pause after the lazy-load scroll.
const SCROLL_SETTLE: Duration = Duration::from_millis(500);

/// Bounds of the randomized human-pace pause between warm-up and search.
const HUMAN_PAUSE_MS: (u64, u64) = (1000, 2600);

#[derive(Debug, Error)]
pub enum NavError {
    /// The proxy rejected the connection; distinct from origin blocking so
    /// the operator knows to fix credentials, not selectors.
    #[error("proxy authentication failed: {0}")]
    ProxyAuth(String),
    #[error("navigation timed out after {0:?}")]
    Timeout(Duration),
    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// Phases of one acquisition run, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavPhase {
    Idle,
    WarmingUp,
    Searching,
    ChallengeWait,
    Content,
    Done,
    Failed,
}

/// What navigation hands to the extractor.
#[derive(Debug, Clone, Default)]
pub struct NavOutcome {
    /// Status of the query document response; 200 when CDP reported nothing.
    pub http_status: u16,
    pub html: String,
    pub challenge_detected: bool,
    /// Only captured when the caller asked for diagnostics.
    pub screenshot: Option<Vec<u8>>,
}

/// Drives one session page through the acquisition phases.
pub struct Navigator {
    query: String,
    capture_screenshot: bool,
    nav_timeout: Duration,
    challenge_dwell: Duration,
    phase: NavPhase,
}

impl Navigator {
    pub fn new(
        query: &str,
        capture_screenshot: bool,
        nav_timeout: Duration,
        challenge_dwell: Duration,
    ) -> Self {
        Self {
            query: query.to_string(),
            capture_screenshot,
            nav_timeout,
            challenge_dwell,
            phase: NavPhase::Idle,
        }
    }

    pub fn phase(&self) -> NavPhase {
        self.phase
    }

    /// Run the phase machine to completion. Any error leaves the machine in
    /// `Failed`; the caller still owns session teardown.
    pub async fn run(&mut self, page: &Page, log: &mut RunLog) -> Result<NavOutcome, NavError> {
        match self.drive(page, log).await {
            Ok(outcome) => {
                self.phase = NavPhase::Done;
                Ok(outcome)
            }
            Err(e) => {
                self.phase = NavPhase::Failed;
                Err(e)
            }
        }
    }

    async fn drive(&mut self, page: &Page, log: &mut RunLog) -> Result<NavOutcome, NavError> {
        // Warm-up: hit the root first so the query request arrives with
        // baseline cookies instead of as a cold first contact.
        self.phase = NavPhase::WarmingUp;
        log.push("warming up at site root");
        self.goto_with_status(page, SITE_ORIGIN).await?;
        human_pause().await;

        self.phase = NavPhase::Searching;
        let url = search_url(&self.query);
        log.push(&format!("searching {}", url));
        let http_status = self.goto_with_status(page, &url).await?;

        let mut html = self.page_content(page).await?;
        let challenge_detected = contains_challenge(&html);
        if challenge_detected {
            self.phase = NavPhase::ChallengeWait;
            log.push(&format!(
                "challenge interstitial detected, dwelling {:?}",
                self.challenge_dwell
            ));
            // Fixed dwell, then proceed regardless of outcome; there is no
            // check that the challenge actually cleared.
            tokio::time::sleep(self.challenge_dwell).await;
        }

        self.phase = NavPhase::Content;
        if let Err(e) = page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
        {
            debug!("lazy-load scroll skipped: {}", e);
        }
        tokio::time::sleep(SCROLL_SETTLE).await;

        html = self.page_content(page).await?;
        let screenshot = if self.capture_screenshot {
            capture_screenshot(page).await
        } else {
            None
        };
        log.push(&format!(
            "captured {} bytes of markup (status {})",
            html.len(),
            http_status
        ));

        Ok(NavOutcome {
            http_status,
            html,
            challenge_detected,
            screenshot,
        })
    }

    /// Navigate and report the document response status.
    ///
    /// The status is not attached to the navigation result by CDP; a
    /// response listener opened before the `goto` is drained briefly for the
    /// main document response, defaulting to 200 when none shows up.
    async fn goto_with_status(&self, page: &Page, url: &str) -> Result<u16, NavError> {
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| NavError::Navigation(e.to_string()))?;

        match tokio::time::timeout(self.nav_timeout, page.goto(url)).await {
            Err(_) => return Err(NavError::Timeout(self.nav_timeout)),
            Ok(Err(e)) => {
                let message = e.to_string();
                if PROXY_ERROR_MARKERS.iter().any(|m| message.contains(m)) {
                    return Err(NavError::ProxyAuth(message));
                }
                return Err(NavError::Navigation(message));
            }
            Ok(Ok(_)) => {}
        }

        let mut status = 200u16;
        let deadline = Instant::now() + STATUS_WATCH_WINDOW;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, responses.next()).await {
                Ok(Some(event)) if event.r#type == ResourceType::Document => {
                    status = event.response.status as u16;
                    break;
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }

        if status == PROXY_AUTH_STATUS {
            return Err(NavError::ProxyAuth(format!("document status {}", status)));
        }
        Ok(status)
    }

    async fn page_content(&self, page: &Page) -> Result<String, NavError> {
        match tokio::time::timeout(self.nav_timeout, page.content()).await {
            Err(_) => Err(NavError::Timeout(self.nav_timeout)),
            Ok(Err(e)) => Err(NavError::Navigation(e.to_string())),
            Ok(Ok(html)) => Ok(html),
        }
    }
}

/// Construct the query URL for a search label.
pub fn search_url(query: &str) -> String {
    format!("{}/search/?q={}", SITE_ORIGIN, urlencoding::encode(query))
}

/// Whether markup carries a known challenge-service signature.
pub fn contains_challenge(html: &str) -> bool {
    CHALLENGE_SIGNATURES.iter().any(|sig| html.contains(sig))
}

/// Randomized pause modelling human inter-page timing.
async fn human_pause() {
    let ms = {
        let mut rng = rand::rng();
        rng.random_range(HUMAN_PAUSE_MS.0..=HUMAN_PAUSE_MS.1)
    };
    debug!("human-pace pause {}ms", ms);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Downscaled JPEG of the current viewport. Best effort: a failed capture
/// costs the run nothing but the artifact.
async fn capture_screenshot(page: &Page) -> Option<Vec<u8>> {
    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Jpeg)
        .quality(45)
        .full_page(false)
        .build();
    match page.screenshot(params).await {
        Ok(bytes) => {
            debug!("captured {} byte screenshot", bytes.len());
            Some(bytes)
        }
        Err(e) => {
            warn!("screenshot capture failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_query() {
        assert_eq!(
            search_url("iPhone 15 Pro"),
            "https://uae.dubizzle.com/search/?q=iPhone%2015%20Pro"
        );
        assert_eq!(
            search_url("PS5 & friends"),
            "https://uae.dubizzle.com/search/?q=PS5%20%26%20friends"
        );
    }

    #[test]
    fn challenge_signatures_detected() {
        assert!(contains_challenge(
            "<html><head><title>Just a moment...</title></head></html>"
        ));
        assert!(contains_challenge(
            r#"<script src="/cdn-cgi/challenge-platform/h/b/orchestrate"></script>"#
        ));
        assert!(contains_challenge("window._cf_chl_opt = {};"));
        assert!(!contains_challenge(
            "<html><body><div data-testid=\"listing-card\"></div></body></html>"
        ));
    }

    #[test]
    fn navigator_starts_idle() {
        let nav = Navigator::new(
            "iPhone",
            false,
            Duration::from_secs(30),
            Duration::from_secs(8),
        );
        assert_eq!(nav.phase(), NavPhase::Idle);
    }

    #[test]
    fn proxy_error_markers_match_chrome_codes() {
        for message in [
            "net::ERR_PROXY_CONNECTION_FAILED",
            "net::ERR_TUNNEL_CONNECTION_FAILED",
            "net::ERR_NO_SUPPORTED_PROXIES",
        ] {
            assert!(PROXY_ERROR_MARKERS.iter().any(|m| message.contains(m)));
        }
        assert!(!PROXY_ERROR_MARKERS
            .iter()
            .any(|m| "net::ERR_NAME_NOT_RESOLVED".contains(m)));
    }
}
