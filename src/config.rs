//! Importer configuration.
//!
//! Loaded from a TOML or JSON file (chosen by extension). Dates inside TOML must be quoted
//! RFC 3339 strings, e.g. `startDate = "2024-01-01T00:00:00Z"`.

use crate::gateway::{AccountType, LedgerSettings};
use crate::scraper::{Credentials, ScraperOptions};
use crate::sync::retry::{RetryPolicy, RetrySetting};
use crate::sync::types::ImportError;
use crate::sync::window::CronPreset;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the last-run marker.
pub const DEFAULT_LAST_RUN_PATH: &str = "./cache/lastCronRunTime";

/// One external data source to import from.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
	#[serde(default)]
	pub credentials: Credentials,
	pub options: ScraperOptions,
	/// Overrides the global retry policy for this source's calls.
	#[serde(default)]
	pub retry: Option<RetrySetting>,
	/// Type of ledger account created for newly seen accounts.
	#[serde(default)]
	pub account_type: AccountType,
}

impl SourceConfig {
	pub fn new(options: ScraperOptions) -> Self {
		Self {
			credentials: Credentials::default(),
			options,
			retry: None,
			account_type: AccountType::default(),
		}
	}

	pub fn company_id(&self) -> &str {
		&self.options.company_id
	}

	/// Copy of this source with another start date.
	pub fn with_start_date(&self, start_date: DateTime<Utc>) -> Self {
		let mut derived = self.clone();
		derived.options.start_date = Some(start_date);
		derived
	}
}

/// Schedule of the host's timer.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CronConfig {
	pub preset: CronPreset,
	/// Run once immediately when the schedule starts.
	#[serde(default)]
	pub run_on_start: bool,
	#[serde(default)]
	pub timezone: Option<Tz>,
}

/// Full importer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ImporterConfig {
	pub ledger: LedgerSettings,
	pub sources: Vec<SourceConfig>,
	/// Process-wide retry policy.
	#[serde(default)]
	pub retry: Option<RetryPolicy>,
	/// Delete every ledger account before importing (asks for confirmation).
	#[serde(default)]
	pub cleanup: bool,
	#[serde(default)]
	pub should_download_chromium: bool,
	#[serde(default)]
	pub chromium_install_path: Option<PathBuf>,
	/// `Some(false)` silences logging entirely.
	#[serde(default)]
	pub show_logs: Option<bool>,
	/// Zone used to turn transaction timestamps into ledger dates.
	#[serde(default)]
	pub timezone: Option<Tz>,
	#[serde(default = "default_last_run_path")]
	pub last_run_path: PathBuf,
	/// Write the last-run marker even when some sources failed.
	#[serde(default)]
	pub advance_marker_on_partial_failure: bool,
	#[serde(default)]
	pub cron: Option<CronConfig>,
}

fn default_last_run_path() -> PathBuf {
	PathBuf::from(DEFAULT_LAST_RUN_PATH)
}

impl ImporterConfig {
	/// Minimal configuration for `ledger` and `sources`, every other setting defaulted.
	pub fn new(ledger: LedgerSettings, sources: Vec<SourceConfig>) -> Self {
		Self {
			ledger,
			sources,
			retry: None,
			cleanup: false,
			should_download_chromium: false,
			chromium_install_path: None,
			show_logs: None,
			timezone: None,
			last_run_path: default_last_run_path(),
			advance_marker_on_partial_failure: false,
			cron: None,
		}
	}

	pub fn from_toml_str(content: &str) -> Result<Self, ImportError> {
		let config: Self =
			toml::from_str(content).map_err(|e| ImportError::ConfigError(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_json_str(content: &str) -> Result<Self, ImportError> {
		let config: Self = serde_json::from_str(content)
			.map_err(|e| ImportError::ConfigError(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	/// Load and validate a `.json` or `.toml` file.
	pub fn load(path: &Path) -> Result<Self, ImportError> {
		let content = std::fs::read_to_string(path)?;
		match path.extension().and_then(|e| e.to_str()) {
			Some("json") => Self::from_json_str(&content),
			_ => Self::from_toml_str(&content),
		}
	}

	pub fn validate(&self) -> Result<(), ImportError> {
		if self.sources.is_empty() {
			return Err(ImportError::ConfigError(
				"at least one source must be configured".to_string(),
			));
		}

		if let Some(policy) = &self.retry {
			policy
				.validate()
				.map_err(|e| ImportError::ConfigError(format!("retry: {}", e)))?;
		}

		for (index, source) in self.sources.iter().enumerate() {
			if source.company_id().trim().is_empty() {
				return Err(ImportError::ConfigError(format!(
					"sources[{}]: companyId must not be empty",
					index
				)));
			}

			if let Some(RetrySetting::Policy(policy)) = &source.retry {
				policy.validate().map_err(|e| {
					ImportError::ConfigError(format!(
						"sources[{}] ({}): retry: {}",
						index,
						source.company_id(),
						e
					))
				})?;
			}
		}

		Ok(())
	}

	/// Zone for ledger dates, UTC unless configured.
	pub fn timezone(&self) -> Tz {
		self.timezone.unwrap_or(Tz::UTC)
	}
}
