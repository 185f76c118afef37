//! Budgeting ledger integration module
//!
//! This module defines the contract the importer relies on to talk to the budgeting ledger,
//! together with a JSON-RPC client for a ledger bridge process and an in-memory ledger.
//! Every call is treated as a fallible remote call.

/// JSON-RPC client for the ledger bridge
mod client;
/// In-memory ledger used for dry runs and tests
pub mod memory;
/// Type definitions for ledger data structures
mod types;

pub use client::RpcLedgerGateway;
pub use memory::MemoryLedgerGateway;
pub use types::*;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Contract of the external budgeting ledger.
#[async_trait::async_trait]
pub trait LedgerGateway: Send + Sync {
	/// Connect to the ledger server.
	async fn init(&self, settings: &LedgerSettings) -> Result<(), GatewayError>;

	/// Download the budget identified by `sync_id` so it can be read and written.
	async fn download_ledger(&self, sync_id: &str) -> Result<(), GatewayError>;

	async fn list_accounts(&self) -> Result<Vec<LedgerAccount>, GatewayError>;

	/// Create an account and return its id.
	async fn create_account(
		&self,
		spec: &AccountSpec,
		opening_balance: i64,
	) -> Result<String, GatewayError>;

	async fn delete_account(&self, account_id: &str) -> Result<(), GatewayError>;

	/// Return every note whose text contains `filter`.
	async fn query_notes(&self, filter: &str) -> Result<Vec<Note>, GatewayError>;

	/// Attach (or replace) the note of `target_id`.
	async fn attach_note(&self, target_id: &str, text: &str) -> Result<(), GatewayError>;

	/// Import transactions idempotently, keyed by `imported_id`.
	async fn import_transactions(
		&self,
		account_id: &str,
		transactions: &[LedgerTransaction],
	) -> Result<ImportResult, GatewayError>;

	/// Convert a major-unit amount to the ledger's integer minor units.
	fn amount_to_minor_units(&self, amount: Decimal) -> i64 {
		amount_to_integer(amount)
	}

	/// Release the connection.
	async fn shutdown(&self) -> Result<(), GatewayError>;
}

/// Round `amount × 100` half up, the ledger client's own conversion rule.
///
/// Values outside the `i64` range saturate.
pub fn amount_to_integer(amount: Decimal) -> i64 {
	let saturated = if amount.is_sign_negative() {
		i64::MIN
	} else {
		i64::MAX
	};

	amount
		.checked_mul(Decimal::ONE_HUNDRED)
		.and_then(|cents| cents.checked_add(Decimal::new(5, 1)))
		.map(|cents| cents.floor())
		.and_then(|cents| cents.to_i64())
		.unwrap_or(saturated)
}
