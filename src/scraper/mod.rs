//! Source scraper integration module
//!
//! The importer never scrapes a bank site itself. It hands credentials and options to a
//! `SourceScraper` and receives either the scraped accounts or a classified failure.

/// HTTP client for a scraping service
mod client;
/// Type definitions for scrape requests and results
mod types;

pub use client::HttpScraperClient;
pub use types::*;

/// Contract of an external data source.
#[async_trait::async_trait]
pub trait SourceScraper: Send + Sync {
	/// Scrape every account reachable with `credentials`.
	///
	/// A transport failure is an `Err`; a scrape the source itself rejected comes back as an
	/// unsuccessful `ScrapeResult`.
	async fn scrape(
		&self,
		credentials: &Credentials,
		options: &ScraperOptions,
	) -> Result<ScrapeResult, ScraperError>;
}
