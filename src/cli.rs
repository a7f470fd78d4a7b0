//! CLI front-end.
//!
//! A thin consumer of the acquisition core: it builds a [`ScanConfig`],
//! runs one scan, applies the operator's ROI/price display filters, and
//! renders the result. Filtering thresholds live here, not in the engine.

use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::acquire::MarketScanner;
use crate::config::ScanConfig;
use crate::models::{ScanReport, ScoredListing};
use crate::scoring::is_significant_underprice;

#[derive(Parser)]
#[command(name = "souq")]
#[command(about = "Marketplace listing acquisition and price-anomaly scanner")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Scan live listings for one query and rank arbitrage candidates
    Scan {
        /// Item class to search for (e.g. "iPhone 15 Pro")
        query: String,
        /// Minimum ROI percentage to display
        #[arg(long, default_value = "15.0")]
        min_roi: f64,
        /// Maximum price to display in AED (0 = unlimited)
        #[arg(long, default_value = "0")]
        max_price: i64,
        /// Proxy endpoint (repeatable; host:port:user:pass,
        /// user:pass@host:port, or host:port)
        #[arg(long = "proxy")]
        proxies: Vec<String>,
        /// Capture screenshot and HTML-sample diagnostics
        #[arg(short, long)]
        debug: bool,
        /// Emit the full report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            query,
            min_roi,
            max_price,
            proxies,
            debug,
            json,
        } => scan(query, min_roi, max_price, proxies, debug, json).await,
    }
}

async fn scan(
    query: String,
    min_roi: f64,
    max_price: i64,
    proxies: Vec<String>,
    debug: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = ScanConfig::new(query.clone()).with_env_overrides();
    config.debug = debug;
    config.proxies.extend(proxies);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("scanning live listings for '{}'...", query));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let scanner = MarketScanner::new(config);
    let report = scanner.run().await;

    spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    render_report(&report, &query, min_roi, max_price);

    if debug {
        if let Some(ref bytes) = report.diagnostics.screenshot {
            std::fs::write("souq-debug.jpg", bytes)?;
            println!("  screenshot saved to souq-debug.jpg");
        }
    }

    Ok(())
}

fn render_report(report: &ScanReport, query: &str, min_roi: f64, max_price: i64) {
    println!(
        "{} {}",
        style("Scan:").bold(),
        style(query).cyan().bold()
    );
    println!("  scanned listings: {}", report.listings.len());

    if report.is_empty() {
        println!(
            "  {} (status {})",
            style("no listings acquired").yellow(),
            report.diagnostics.http_status
        );
        if let Some(ref proxy) = report.diagnostics.proxy_used {
            println!("  proxy used: {}", proxy);
        }
        for line in report.logs.iter().rev().take(5).rev() {
            println!("  {}", style(line).dim());
        }
        return;
    }

    let mut deals: Vec<&ScoredListing> = report
        .listings
        .iter()
        .filter(|s| {
            s.metrics
                .map(|m| m.roi_percent >= min_roi)
                .unwrap_or(false)
        })
        .filter(|s| max_price == 0 || s.listing.price <= max_price)
        .collect();
    deals.sort_by(|a, b| {
        let roi_a = a.metrics.map(|m| m.roi_percent).unwrap_or(0.0);
        let roi_b = b.metrics.map(|m| m.roi_percent).unwrap_or(0.0);
        roi_b.total_cmp(&roi_a)
    });

    println!(
        "  deals at or above {:.0}% ROI: {}",
        min_roi,
        style(deals.len()).green().bold()
    );

    for deal in deals {
        // metrics is always present here: the filter above drops unscored records
        let Some(m) = deal.metrics else { continue };
        let flag = if is_significant_underprice(deal) {
            style("ANOMALY").green().bold().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:>7} AED  median {:>9.0}  profit {:>8.0}  roi {:>6.1}%  z {:>5.2}  {} {}",
            deal.listing.price,
            m.market_median,
            m.profit,
            m.roi_percent,
            m.z_score,
            truncate(&deal.listing.title, 48),
            flag
        );
        println!(
            "           {}  {}",
            style(&deal.listing.location).dim(),
            style(&deal.listing.url).dim()
        );
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
