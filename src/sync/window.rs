//! Incremental synchronization windows.
//!
//! A scheduled run scrapes each source from an effective start date derived from the last
//! completed run and the source's own configured start date. Everything here is pure; the
//! persisted marker is read by the caller and passed in.

use crate::config::SourceConfig;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How far the stored last-run marker is moved back before use.
pub const DEFAULT_SAFETY_MARGIN_DAYS: i64 = 3;

/// Schedules the importer can be driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CronPreset {
	/// Every minute, for trying a setup out.
	Test,
	Daily,
	Weekly,
	Monthly,
	/// First and fifteenth of the month.
	Biweekly,
}

impl CronPreset {
	/// Cron expression for the host's timer.
	pub fn expression(&self) -> &'static str {
		match self {
			CronPreset::Test => "* * * * *",
			CronPreset::Daily => "0 0 * * *",
			CronPreset::Weekly => "0 0 * * 0",
			CronPreset::Monthly => "0 0 1 * *",
			CronPreset::Biweekly => "0 0 1,15 * *",
		}
	}

	/// Nominal period between two runs.
	pub fn lookback(&self) -> Duration {
		match self {
			CronPreset::Test => Duration::days(60),
			CronPreset::Daily => Duration::days(1),
			CronPreset::Weekly => Duration::days(7),
			CronPreset::Monthly => Duration::days(30),
			CronPreset::Biweekly => Duration::days(15),
		}
	}
}

/// Effective start date from an (already adjusted) prior-run time and a configured date.
///
/// The prior run wins only when it is more recent than the configured date, or when no date
/// is configured.
pub fn plan_window(
	prior_run: Option<DateTime<Utc>>,
	configured_start: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
	match (prior_run, configured_start) {
		(Some(prior), Some(configured)) if prior > configured => Some(prior),
		(Some(_), Some(configured)) => Some(configured),
		(Some(prior), None) => Some(prior),
		(None, configured) => configured,
	}
}

/// Computes per-source start dates for a scheduled run.
#[derive(Debug, Clone, Copy)]
pub struct SyncWindowPlanner {
	safety_margin: Duration,
}

impl Default for SyncWindowPlanner {
	fn default() -> Self {
		Self::new(Duration::days(DEFAULT_SAFETY_MARGIN_DAYS))
	}
}

impl SyncWindowPlanner {
	pub fn new(safety_margin: Duration) -> Self {
		Self { safety_margin }
	}

	/// Move a stored marker back by the safety margin, for late-arriving transactions.
	pub fn adjust_marker(&self, stored: DateTime<Utc>) -> DateTime<Utc> {
		stored - self.safety_margin
	}

	/// Start date used when there is neither a marker nor a configured date.
	pub fn fallback_start(&self, preset: CronPreset, now: DateTime<Utc>) -> DateTime<Utc> {
		now - preset.lookback() * 2
	}

	/// Effective start date for one source.
	pub fn plan(
		&self,
		stored_marker: Option<DateTime<Utc>>,
		configured_start: Option<DateTime<Utc>>,
		preset: CronPreset,
		now: DateTime<Utc>,
	) -> DateTime<Utc> {
		let prior = stored_marker.map(|m| self.adjust_marker(m));
		plan_window(prior, configured_start).unwrap_or_else(|| self.fallback_start(preset, now))
	}

	/// Derive this run's copy of every source config with its effective start date set.
	pub fn plan_sources(
		&self,
		sources: &[SourceConfig],
		stored_marker: Option<DateTime<Utc>>,
		preset: CronPreset,
		now: DateTime<Utc>,
	) -> Vec<SourceConfig> {
		sources
			.iter()
			.map(|source| {
				let start =
					self.plan(stored_marker, source.options.start_date, preset, now);
				debug!(
					"Planned window for {} from {}",
					source.company_id(),
					start
				);
				source.with_start_date(start)
			})
			.collect()
	}
}
