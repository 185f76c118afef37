//!
//! HTTP client for a scraping service.
//!
//! The service owns the browser automation for every supported institution. One request
//! scrapes one source: `POST {url}` with `{companyId, credentials, options}`, answered with a
//! scrape result document.

use super::types::*;
use super::SourceScraper;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Scraping a site can take minutes, so the timeout is generous.
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(600);

/// Scraping service client
#[derive(Clone)]
pub struct HttpScraperClient {
	http_client: Client,
	scrape_url: String,
}

impl HttpScraperClient {
	pub fn new(scrape_url: String) -> Result<Self, ScraperError> {
		let http_client = Client::builder().timeout(SCRAPE_TIMEOUT).build()?;

		Ok(Self {
			http_client,
			scrape_url,
		})
	}
}

#[async_trait::async_trait]
impl SourceScraper for HttpScraperClient {
	async fn scrape(
		&self,
		credentials: &Credentials,
		options: &ScraperOptions,
	) -> Result<ScrapeResult, ScraperError> {
		info!(
			"{}: Scraping transactions from {:?}",
			options.company_id.to_uppercase(),
			options.start_date
		);

		let response = self
			.http_client
			.post(&self.scrape_url)
			.json(&json!({
				"companyId": options.company_id,
				"credentials": credentials,
				"options": options,
			}))
			.send()
			.await?
			.error_for_status()?;

		let result: ScrapeResult = response.json().await?;
		debug!(
			"{}: Scrape finished (success: {}, accounts: {})",
			options.company_id.to_uppercase(),
			result.success,
			result.accounts.len()
		);

		Ok(result)
	}
}
