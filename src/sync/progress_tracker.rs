//! Progress tracking for import runs.
//!
//! This module provides the `ImportProgressTracker`, which records what happened to every
//! source and account during one run: which sources succeeded or failed, which accounts were
//! created, skipped or imported, and how many transactions the ledger added or updated.
//!
//! The orchestrator feeds the tracker while it walks the sources and hands the resulting
//! `RunSummary` to callers and to the finish hooks.

use crate::gateway::ImportResult;

use serde::Serialize;
use tracing::{info, warn};

/// Final state of one source in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOutcome {
    Succeeded,
    Failed,
}

/// Service for tracking import progress
#[derive(Debug, Clone, Default)]
pub struct ImportProgressTracker {
    /// Outcome of every processed source, in processing order
    source_outcomes: Vec<(String, SourceOutcome)>,
    /// Ledger accounts created during this run
    accounts_created: usize,
    /// External accounts skipped because they had no transactions
    accounts_skipped: usize,
    /// Accounts whose import went through without in-band errors
    accounts_imported: usize,
    /// Accounts whose import the ledger answered with in-band errors
    accounts_with_errors: usize,
    /// Transactions the ledger added
    transactions_added: usize,
    /// Transactions the ledger recognized as re-imports
    transactions_updated: usize,
    /// Scraped transactions dropped for lack of an identifier
    transactions_dropped: usize,
}

impl ImportProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_source(&mut self, company_id: &str, outcome: SourceOutcome) {
        self.source_outcomes.push((company_id.to_string(), outcome));
    }

    pub fn record_created_account(&mut self) {
        self.accounts_created += 1;
    }

    pub fn record_skipped_account(&mut self) {
        self.accounts_skipped += 1;
    }

    pub fn record_dropped_transactions(&mut self, count: usize) {
        self.transactions_dropped += count;
    }

    /// Record the ledger's answer to one account import.
    pub fn record_import(&mut self, result: &ImportResult) {
        if result.has_errors() {
            self.accounts_with_errors += 1;
            return;
        }

        self.accounts_imported += 1;
        self.transactions_added += result.added.len();
        self.transactions_updated += result.updated.len();
    }

    /// Log the running totals.
    pub fn log_progress(&self) {
        info!("Import progress: {}", self.get_stats().summary());
    }

    /// Get run statistics as a RunSummary struct
    pub fn get_stats(&self) -> RunSummary {
        RunSummary {
            sources: self.source_outcomes.clone(),
            accounts_created: self.accounts_created,
            accounts_skipped: self.accounts_skipped,
            accounts_imported: self.accounts_imported,
            accounts_with_errors: self.accounts_with_errors,
            transactions_added: self.transactions_added,
            transactions_updated: self.transactions_updated,
            transactions_dropped: self.transactions_dropped,
        }
    }
}

/// Statistics about one import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub sources: Vec<(String, SourceOutcome)>,
    pub accounts_created: usize,
    pub accounts_skipped: usize,
    pub accounts_imported: usize,
    pub accounts_with_errors: usize,
    pub transactions_added: usize,
    pub transactions_updated: usize,
    pub transactions_dropped: usize,
}

impl RunSummary {
    /// True when every source succeeded.
    ///
    /// In-band import errors do not count as a failed source.
    pub fn success(&self) -> bool {
        self.sources
            .iter()
            .all(|(_, outcome)| *outcome == SourceOutcome::Succeeded)
    }

    pub fn failed_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|(_, outcome)| *outcome == SourceOutcome::Failed)
            .map(|(company, _)| company.as_str())
            .collect()
    }

    /// Get a human-readable summary of the run statistics
    pub fn summary(&self) -> String {
        let failed = self.failed_sources();
        format!(
            "{} of {} sources succeeded: {} accounts imported ({} created, {} skipped, {} with errors), {} transactions added, {} updated, {} dropped{}",
            self.sources.len() - failed.len(),
            self.sources.len(),
            self.accounts_imported,
            self.accounts_created,
            self.accounts_skipped,
            self.accounts_with_errors,
            self.transactions_added,
            self.transactions_updated,
            self.transactions_dropped,
            if failed.is_empty() {
                String::new()
            } else {
                format!(" (failed: {})", failed.join(", "))
            }
        )
    }

    /// Log the summary at a level matching the outcome.
    pub fn log(&self) {
        if self.success() {
            info!("Import finished: {}", self.summary());
        } else {
            warn!("Import finished with failures: {}", self.summary());
        }
    }
}
