//! Browser session lifecycle for one acquisition run.
//!
//! Uses chromiumoxide (CDP) with stealth evasion to get past bot detection
//! on the marketplace. Each run owns exactly one session: launched with a
//! randomized fingerprint, optionally bound to a proxy, and torn down by the
//! orchestrator on every exit path. Sessions are never shared or reused;
//! carried-over cookies would poison the anti-bot posture of the next run.

mod stealth;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::cdp::browser_protocol::fetch::{
    AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams,
    ContinueWithAuthParams, EnableParams, EventAuthRequired, EventRequestPaused,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::proxy::{ProxyCredentials, ProxyEndpoint};

pub use stealth::STEALTH_SCRIPTS;

/// Desktop Chrome user agents the session fingerprint is drawn from.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

/// Common desktop window sizes, paired with the user agent draw.
const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1680, 1050),
    (1536, 864),
    (1440, 900),
    (1366, 768),
];

/// Configuration for one browser session. Chosen once per run and destroyed
/// with the session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub proxy: Option<ProxyEndpoint>,
    /// Upper bound applied to each navigation wait.
    pub nav_timeout: Duration,
}

impl SessionConfig {
    /// Draw a fingerprint uniformly at random from the fixed pools.
    pub fn randomized(proxy: Option<ProxyEndpoint>, nav_timeout: Duration) -> Self {
        let mut rng = rand::rng();
        let user_agent = USER_AGENTS[rng.random_range(0..USER_AGENTS.len())].to_string();
        let viewport = VIEWPORTS[rng.random_range(0..VIEWPORTS.len())];
        Self {
            user_agent,
            viewport,
            proxy,
            nav_timeout,
        }
    }
}

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

/// Find a Chrome executable on this host.
fn find_chrome() -> Result<PathBuf> {
    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            debug!("found Chrome at {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    debug!("found Chrome in PATH: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(anyhow!(
        "Chrome/Chromium not found. Install it:\n\
         - Arch/Manjaro: sudo pacman -S chromium\n\
         - Ubuntu/Debian: sudo apt install chromium-browser\n\
         - Fedora: sudo dnf install chromium"
    ))
}

/// One headless browser session with its single page.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a session for the given config. One attempt; a launch failure
    /// (bad executable, unreachable proxy) surfaces to the caller unretried.
    pub async fn launch(config: &SessionConfig) -> Result<Self> {
        let chrome = find_chrome()?;
        info!("launching headless browser");

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--metrics-recording-only")
            .arg("--no-sandbox") // required in containers and restricted deployments
            .arg("--disable-gpu")
            .arg(format!(
                "--window-size={},{}",
                config.viewport.0, config.viewport.1
            ));

        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server));
        }

        let browser_config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        match Self::prepare_page(&browser, config).await {
            Ok(page) => Ok(Self {
                browser,
                page,
                handler: handler_task,
            }),
            Err(e) => {
                // The session must not outlive a failed setup.
                let mut browser = browser;
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                Err(e)
            }
        }
    }

    /// Open the session page and install the anti-fingerprinting patches.
    /// The webdriver patch is registered before any navigation so the very
    /// first document already sees it unset.
    async fn prepare_page(browser: &Browser, config: &SessionConfig) -> Result<Page> {
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open session page")?;

        page.execute(SetUserAgentOverrideParams::new(config.user_agent.clone()))
            .await
            .context("failed to override user agent")?;

        for script in STEALTH_SCRIPTS {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
                (*script).to_string(),
            ))
            .await
            .context("failed to register stealth script")?;
        }

        if let Some(credentials) = config.proxy.as_ref().and_then(|p| p.credentials.clone()) {
            relay_proxy_auth(&page, credentials).await?;
        }

        Ok(page)
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Tear the session down. Consumes the session so no navigation can
    /// follow; safe to call on every exit path.
    pub async fn close(mut self) {
        let _ = self.page.close().await;
        if let Err(e) = self.browser.close().await {
            debug!("browser close: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

/// Answer proxy authentication challenges over the CDP Fetch domain.
///
/// Chrome's `--proxy-server` flag carries no credentials, so an authenticated
/// endpoint needs a relay: requests pause at the interception point, auth
/// challenges are answered with the endpoint's credentials, and everything
/// else is waved through unchanged.
async fn relay_proxy_auth(page: &Page, credentials: ProxyCredentials) -> Result<()> {
    page.execute(EnableParams::builder().handle_auth_requests(true).build())
        .await
        .context("failed to enable request interception for proxy auth")?;

    let mut auth_requests = page
        .event_listener::<EventAuthRequired>()
        .await
        .context("failed to listen for auth challenges")?;
    let mut paused_requests = page
        .event_listener::<EventRequestPaused>()
        .await
        .context("failed to listen for paused requests")?;

    let relay_page = page.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = auth_requests.next() => {
                    let Some(event) = event else { break };
                    let challenge = AuthChallengeResponse::builder()
                        .response(AuthChallengeResponseResponse::ProvideCredentials)
                        .username(credentials.username.clone())
                        .password(credentials.password.clone())
                        .build();
                    let challenge = match challenge {
                        Ok(c) => c,
                        Err(e) => {
                            debug!("malformed auth challenge response: {}", e);
                            continue;
                        }
                    };
                    let params = ContinueWithAuthParams::builder()
                        .request_id(event.request_id.clone())
                        .auth_challenge_response(challenge)
                        .build();
                    match params {
                        Ok(params) => {
                            if let Err(e) = relay_page.execute(params).await {
                                debug!("proxy auth relay: {}", e);
                            }
                        }
                        Err(e) => debug!("malformed auth continuation: {}", e),
                    }
                }
                event = paused_requests.next() => {
                    let Some(event) = event else { break };
                    let params = ContinueRequestParams::builder()
                        .request_id(event.request_id.clone())
                        .build();
                    match params {
                        Ok(params) => {
                            if let Err(e) = relay_page.execute(params).await {
                                debug!("request continuation: {}", e);
                            }
                        }
                        Err(e) => debug!("malformed request continuation: {}", e),
                    }
                }
            }
        }
    });

    Ok(())
}
