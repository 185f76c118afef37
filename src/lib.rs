//! Imports bank and card transactions scraped from external institutions into a budgeting
//! ledger.
//!
//! An [`ImportOrchestrator`] walks the configured sources in order. For each source it scrapes
//! the accounts, finds or creates the matching ledger account through a marker note, maps the
//! transactions and imports them idempotently. Every external call runs under a bounded retry
//! policy and a failing source never stops the others.

pub mod config;
pub mod gateway;
pub mod scraper;
pub mod sync;
pub mod telemetry;
pub mod utils;

pub use config::{CronConfig, ImporterConfig, SourceConfig};
pub use gateway::{LedgerGateway, MemoryLedgerGateway, RpcLedgerGateway};
pub use scraper::{HttpScraperClient, SourceScraper};
pub use sync::{ImportError, ImportEvent, ImportOrchestrator, RunSummary};
