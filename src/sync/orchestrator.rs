//! Import orchestrator and integration point for all sync services.
//!
//! This module defines the `ImportOrchestrator`, which drives one import run end to end: it
//! initializes the ledger connection, optionally wipes the ledger, walks the configured sources
//! one after another and reports every outcome through the event dispatcher.
//!
//! The orchestrator is responsible for:
//! - Guarding the ledger connection lifecycle (`LifecycleState`) in one place
//! - Running each source's scrape, reconcile, map and import steps under the retry policy
//! - Containing a source's failure at the source boundary so the run continues
//! - Planning incremental windows and maintaining the last-run marker for scheduled runs
//!
//! Sources are processed strictly in sequence. The only concurrency is in cleanup, where the
//! account deletions are independent and run together.

use crate::config::{CronConfig, ImporterConfig, SourceConfig};
use crate::gateway::{ImportResult, LedgerGateway, LedgerTransaction};
use crate::scraper::{ExternalAccount, SourceScraper};
use crate::sync::{
    cleanup::{Confirmation, StdinConfirmation},
    events::{
        EventDispatcher, ImportEvent, ImportEventHandler, ImportFailure, ImportSuccess,
        PlannedWindow,
    },
    progress_tracker::{ImportProgressTracker, RunSummary, SourceOutcome},
    reconciler::AccountReconciler,
    retry::RetryExecutor,
    state_persistence::{FileLastRunRepository, LastRunRepository},
    transaction_mapper::TransactionMapper,
    types::{ImportError, LifecycleState},
    window::{CronPreset, SyncWindowPlanner},
};
use crate::utils::format_minor_units;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Supplies a browser executable for scrapers that drive one.
#[async_trait::async_trait]
pub trait BrowserProvisioner: Send + Sync {
    /// Make a browser available, installing it under `install_path` when given.
    async fn provision(&self, install_path: Option<&Path>) -> Result<PathBuf, ImportError>;
}

/// Outcome of a confirmed cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    /// Account id and error of every deletion that failed.
    pub failed: Vec<(String, String)>,
}

/// Per-source processing: scrape, reconcile, map, import.
struct SourcePipeline {
    gateway: Arc<dyn LedgerGateway>,
    scraper: Arc<dyn SourceScraper>,
    reconciler: AccountReconciler,
    mapper: TransactionMapper,
    retry: RetryExecutor,
    /// Browser handed to every scraper that does not name its own.
    executable_path: Option<PathBuf>,
}

impl SourcePipeline {
    async fn scrape(&self, source: &SourceConfig) -> Result<Vec<ExternalAccount>, ImportError> {
        let mut options = source.options.clone();
        if options.executable_path.is_none() {
            options.executable_path = self.executable_path.clone();
        }

        let scraper = self.scraper.as_ref();
        let credentials = &source.credentials;
        let options = &options;
        let context = format!("scrape {}", source.company_id());

        self.retry
            .execute(&context, source.retry.as_ref(), || async move {
                let result = scraper
                    .scrape(credentials, options)
                    .await
                    .map_err(ImportError::from)?;
                result.into_accounts().map_err(ImportError::from)
            })
            .await
    }

    async fn import_transactions(
        &self,
        source: &SourceConfig,
        account_name: &str,
        account_id: &str,
        transactions: &[LedgerTransaction],
    ) -> Result<ImportResult, ImportError> {
        let gateway = self.gateway.as_ref();
        let context = format!("import transactions into {}", account_name);

        self.retry
            .execute(&context, source.retry.as_ref(), || async move {
                gateway
                    .import_transactions(account_id, transactions)
                    .await
                    .map_err(ImportError::from)
            })
            .await
    }

    /// Process one source. Any error returned fails the whole source.
    async fn process(
        &self,
        source: &SourceConfig,
        dispatcher: &mut EventDispatcher,
        tracker: &mut ImportProgressTracker,
    ) -> Result<(), ImportError> {
        let company_id = source.company_id();
        let start_date = source.options.start_date;

        let accounts = self.scrape(source).await?;
        info!(
            company_id,
            accounts = accounts.len(),
            "Scraped source"
        );

        for account in &accounts {
            if account.txns.is_empty() {
                warn!(
                    company_id,
                    account = %account.account_number,
                    "No transactions found for account"
                );
                tracker.record_skipped_account();
                continue;
            }

            let resolved = self
                .reconciler
                .resolve_or_create(
                    company_id,
                    account,
                    source.account_type,
                    &self.retry,
                    source.retry.as_ref(),
                )
                .await?;
            if resolved.created {
                tracker.record_created_account();
            }

            let gateway = self.gateway.as_ref();
            let transactions = self.mapper.map(&resolved.account_id, &account.txns, |amount| {
                gateway.amount_to_minor_units(amount)
            });
            tracker.record_dropped_transactions(account.txns.len() - transactions.len());

            info!(
                account_name = %resolved.account_name,
                account_id = %resolved.account_id,
                count = transactions.len(),
                total = %format_minor_units(
                    transactions
                        .iter()
                        .fold(0i64, |total, t| total.saturating_add(t.amount))
                ),
                "Importing transactions"
            );

            let result = self
                .import_transactions(
                    source,
                    &resolved.account_name,
                    &resolved.account_id,
                    &transactions,
                )
                .await?;
            tracker.record_import(&result);

            if result.has_errors() {
                error!(
                    account_name = %resolved.account_name,
                    account_id = %resolved.account_id,
                    errors = ?result.errors,
                    "Ledger reported errors while importing transactions"
                );
                continue;
            }

            info!(
                account_name = %resolved.account_name,
                account_id = %resolved.account_id,
                added = result.added.len(),
                updated = result.updated.len(),
                "Transactions imported"
            );

            dispatcher
                .dispatch(&ImportEvent::ImportSucceeded(ImportSuccess {
                    ledger_account_id: resolved.account_id,
                    account_name: resolved.account_name,
                    added: result.added,
                    updated: result.updated,
                    errors: result.errors,
                    start_date,
                }))
                .await;
        }

        Ok(())
    }
}

/// Main import orchestrator that coordinates all sync components.
///
/// One instance owns one ledger connection. Callers must not drive overlapping runs on the same
/// instance; `&mut self` on every run entry point enforces this within one task.
pub struct ImportOrchestrator {
    config: ImporterConfig,
    state: LifecycleState,

    // Services
    pipeline: SourcePipeline,
    dispatcher: EventDispatcher,
    last_run: Box<dyn LastRunRepository>,
    planner: SyncWindowPlanner,
    confirmation: Box<dyn Confirmation>,
    provisioner: Option<Box<dyn BrowserProvisioner>>,
}

impl ImportOrchestrator {
    /// Create an orchestrator over `gateway` and `scraper`.
    ///
    /// The last-run marker lives at `config.last_run_path` and cleanup asks on standard input;
    /// both can be replaced with the `with_*` methods.
    pub fn new(
        config: ImporterConfig,
        gateway: Arc<dyn LedgerGateway>,
        scraper: Arc<dyn SourceScraper>,
    ) -> Self {
        let pipeline = SourcePipeline {
            reconciler: AccountReconciler::new(gateway.clone()),
            mapper: TransactionMapper::new(config.timezone()),
            retry: RetryExecutor::new(config.retry),
            executable_path: None,
            gateway,
            scraper,
        };
        let last_run = Box::new(FileLastRunRepository::new(config.last_run_path.clone()));

        Self {
            config,
            state: LifecycleState::Uninitialized,
            pipeline,
            dispatcher: EventDispatcher::new(),
            last_run,
            planner: SyncWindowPlanner::default(),
            confirmation: Box::new(StdinConfirmation),
            provisioner: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Box<dyn ImportEventHandler>) -> Self {
        self.dispatcher.register_handler(handler);
        self
    }

    pub fn with_last_run_repository(mut self, repository: Box<dyn LastRunRepository>) -> Self {
        self.last_run = repository;
        self
    }

    pub fn with_confirmation(mut self, confirmation: Box<dyn Confirmation>) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_browser_provisioner(mut self, provisioner: Box<dyn BrowserProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn with_window_planner(mut self, planner: SyncWindowPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Replace the account reconciler, e.g. to use another `AccountDirectory`.
    pub fn with_reconciler(mut self, reconciler: AccountReconciler) -> Self {
        self.pipeline.reconciler = reconciler;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    fn transition(&mut self, next: LifecycleState) -> Result<(), ImportError> {
        if !self.state.can_transition_to(next) {
            return Err(ImportError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        debug!("Lifecycle {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Connect to the ledger and download the budget. Does nothing when already `Ready`.
    pub async fn init(&mut self) -> Result<(), ImportError> {
        if self.state == LifecycleState::Ready {
            debug!("Ledger already initialized");
            return Ok(());
        }

        info!("Initializing ledger connection");
        self.transition(LifecycleState::Initializing)?;

        match self.initialize().await {
            Ok(()) => {
                self.transition(LifecycleState::Ready)?;
                info!("Ledger ready");
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize ledger: {}", e);
                self.transition(LifecycleState::Uninitialized)?;
                Err(e)
            }
        }
    }

    async fn initialize(&mut self) -> Result<(), ImportError> {
        if self.config.should_download_chromium {
            match &self.provisioner {
                Some(provisioner) => {
                    let path = provisioner
                        .provision(self.config.chromium_install_path.as_deref())
                        .await?;
                    info!("Using browser at {:?}", path);
                    self.pipeline.executable_path = Some(path);
                }
                None => warn!("Browser download requested but no provisioner is configured"),
            }
        }

        let gateway = self.pipeline.gateway.as_ref();
        let settings = &self.config.ledger;

        self.pipeline
            .retry
            .execute("initialize ledger", None, || async move {
                gateway.init(settings).await.map_err(ImportError::from)?;
                gateway
                    .download_ledger(&settings.sync_id)
                    .await
                    .map_err(ImportError::from)
            })
            .await
    }

    /// Delete every ledger account after the operator confirms.
    ///
    /// Fails with `NotInitialized` before `init`, and with `CleanupDeclined` on anything but an
    /// explicit yes.
    pub async fn cleanup(&mut self) -> Result<CleanupReport, ImportError> {
        if self.state != LifecycleState::Ready {
            return Err(ImportError::NotInitialized);
        }

        if !self
            .confirmation
            .confirm("Are you sure you want to delete all accounts?")
            .await?
        {
            info!("Cleanup cancelled by user");
            return Err(ImportError::CleanupDeclined);
        }

        let gateway = self.pipeline.gateway.as_ref();
        let accounts = self
            .pipeline
            .retry
            .execute("list accounts", None, || async move {
                gateway.list_accounts().await.map_err(ImportError::from)
            })
            .await?;

        let results = join_all(accounts.iter().map(|account| async move {
            (account.id.clone(), gateway.delete_account(&account.id).await)
        }))
        .await;

        let mut report = CleanupReport::default();
        for (account_id, result) in results {
            match result {
                Ok(()) => report.deleted.push(account_id),
                Err(e) => {
                    warn!("Failed to delete account {}: {}", account_id, e);
                    report.failed.push((account_id, e.to_string()));
                }
            }
        }

        info!(
            deleted_accounts = report.deleted.len(),
            errors = report.failed.len(),
            "Cleanup finished"
        );
        Ok(report)
    }

    /// Release the ledger connection. Does nothing unless `Ready`.
    pub async fn shutdown(&mut self) -> Result<(), ImportError> {
        if self.state != LifecycleState::Ready {
            debug!("Nothing to shut down in state {:?}", self.state);
            return Ok(());
        }

        info!("Shutting down ledger connection");
        self.transition(LifecycleState::ShuttingDown)?;
        if let Err(e) = self.pipeline.gateway.shutdown().await {
            warn!("Ledger shutdown reported an error: {}", e);
        }
        self.transition(LifecycleState::ShutDown)
    }

    /// Import every configured source with its configured start date.
    ///
    /// Only an initialization failure is returned as an error; source failures are reported
    /// through the dispatcher and reflected in the summary.
    pub async fn import(&mut self, should_shutdown: bool) -> Result<RunSummary, ImportError> {
        let sources = self.config.sources.clone();
        self.run(&sources, should_shutdown).await
    }

    async fn run(
        &mut self,
        sources: &[SourceConfig],
        should_shutdown: bool,
    ) -> Result<RunSummary, ImportError> {
        self.init().await?;

        if self.config.cleanup {
            match self.cleanup().await {
                Ok(_) => {}
                Err(e) => warn!("Cleanup skipped: {}", e),
            }
        }

        let summary = self.import_sources(sources).await;

        if should_shutdown {
            self.shutdown().await?;
        }

        Ok(summary)
    }

    async fn import_sources(&mut self, sources: &[SourceConfig]) -> RunSummary {
        let mut tracker = ImportProgressTracker::new();

        for source in sources {
            let company_id = source.company_id();
            info!(
                company_id,
                start_date = ?source.options.start_date,
                "Importing source"
            );

            let outcome = self
                .pipeline
                .process(source, &mut self.dispatcher, &mut tracker)
                .await;
            match outcome {
                Ok(()) => tracker.record_source(company_id, SourceOutcome::Succeeded),
                Err(e) => {
                    error!(
                        company_id,
                        error = %e,
                        causes = ?e.causes(),
                        "Source failed"
                    );
                    tracker.record_source(company_id, SourceOutcome::Failed);
                    self.dispatcher
                        .dispatch(&ImportEvent::ImportFailed(ImportFailure::from_error(
                            company_id,
                            source.options.start_date,
                            &e,
                        )))
                        .await;
                }
            }
            tracker.log_progress();
        }

        let summary = tracker.get_stats();
        summary.log();
        self.dispatcher
            .dispatch(&ImportEvent::ImportFinished {
                summary: summary.clone(),
            })
            .await;
        summary
    }

    /// One scheduled run: plan windows from the last-run marker, import, advance the marker.
    ///
    /// The connection stays open for the next run. The marker is set to `now` after a fully
    /// successful run, or after any run when `advance_marker_on_partial_failure` is set.
    pub async fn run_scheduled(
        &mut self,
        preset: CronPreset,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, ImportError> {
        self.init().await?;

        let stored = match self.last_run.load().await {
            Ok(marker) => marker,
            Err(e) => {
                warn!("Could not read last-run marker, planning without it: {}", e);
                None
            }
        };
        let sources = self
            .planner
            .plan_sources(&self.config.sources, stored, preset, now);

        let windows = sources
            .iter()
            .filter_map(|s| {
                s.options.start_date.map(|start_date| PlannedWindow {
                    company_id: s.company_id().to_string(),
                    start_date,
                })
            })
            .collect();
        self.dispatcher
            .dispatch(&ImportEvent::CronStarted { windows })
            .await;

        let summary = self.run(&sources, false).await?;

        let marker_advanced =
            if summary.success() || self.config.advance_marker_on_partial_failure {
                match self.last_run.save(now).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to save last-run marker: {}", e);
                        false
                    }
                }
            } else {
                warn!(
                    "Not advancing last-run marker, failed sources: {}",
                    summary.failed_sources().join(", ")
                );
                false
            };

        self.dispatcher
            .dispatch(&ImportEvent::CronFinished {
                summary: summary.clone(),
                marker_advanced,
            })
            .await;

        Ok(summary)
    }

    /// Prepare a schedule: initialize, and run once right away when `run_on_start` is set.
    ///
    /// The timer itself belongs to the host, which calls `run_scheduled` on every tick of
    /// `cron.preset.expression()`.
    pub async fn start_schedule(
        &mut self,
        cron: &CronConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<RunSummary>, ImportError> {
        self.init().await?;
        info!(
            "Schedule ready with expression {} ({:?})",
            cron.preset.expression(),
            cron.timezone
        );

        if !cron.run_on_start {
            return Ok(None);
        }

        self.run_scheduled(cron.preset, now).await.map(Some)
    }
}
