//! In-memory ledger.
//!
//! Keeps accounts, notes and imported transactions in process memory and follows the ledger's
//! import semantics: a transaction whose `imported_id` was seen before on the same account is an
//! update, not a new row. Failures can be injected per method to exercise retry paths.

use super::types::*;
use super::LedgerGateway;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct LedgerState {
	initialized: bool,
	downloaded: Option<String>,
	shutdowns: usize,
	next_id: u64,
	accounts: Vec<LedgerAccount>,
	opening_balances: HashMap<String, i64>,
	notes: Vec<Note>,
	transactions: HashMap<String, Vec<LedgerTransaction>>,
	injected_failures: HashMap<String, usize>,
	pending_import_errors: Vec<String>,
	calls: HashMap<String, usize>,
}

/// Ledger kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryLedgerGateway {
	state: Mutex<LedgerState>,
}

impl MemoryLedgerGateway {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, LedgerState> {
		self.state
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Count the call and fail it if a failure was injected for `method`.
	fn enter(&self, method: &str) -> Result<MutexGuard<'_, LedgerState>, GatewayError> {
		let mut state = self.state();
		*state.calls.entry(method.to_string()).or_default() += 1;

		if let Some(remaining) = state.injected_failures.get_mut(method) {
			if *remaining > 0 {
				*remaining -= 1;
				debug!("Injected failure for {}", method);
				return Err(GatewayError::RpcError {
					method: method.to_string(),
					message: "injected failure".to_string(),
				});
			}
		}

		Ok(state)
	}

	/// Make the next `count` calls of `method` fail with an RPC error.
	pub fn inject_failures(&self, method: &str, count: usize) {
		self.state()
			.injected_failures
			.insert(method.to_string(), count);
	}

	/// Make the next import report `errors` in-band instead of importing.
	pub fn reject_next_import(&self, errors: Vec<String>) {
		self.state().pending_import_errors = errors;
	}

	/// Number of times `method` was called, failed calls included.
	pub fn call_count(&self, method: &str) -> usize {
		self.state().calls.get(method).copied().unwrap_or(0)
	}

	/// Seed an existing account, optionally carrying a note.
	pub fn seed_account(&self, account: LedgerAccount, note: Option<&str>) {
		let mut state = self.state();
		if let Some(text) = note {
			state.notes.push(Note {
				id: format!("{}{}", ACCOUNT_NOTE_PREFIX, account.id),
				note: text.to_string(),
			});
		}
		state.opening_balances.insert(account.id.clone(), 0);
		state.accounts.push(account);
	}

	pub fn accounts(&self) -> Vec<LedgerAccount> {
		self.state().accounts.clone()
	}

	pub fn notes(&self) -> Vec<Note> {
		self.state().notes.clone()
	}

	pub fn transactions(&self, account_id: &str) -> Vec<LedgerTransaction> {
		self.state()
			.transactions
			.get(account_id)
			.cloned()
			.unwrap_or_default()
	}

	/// Opening balance plus every imported amount.
	pub fn balance(&self, account_id: &str) -> Option<i64> {
		let state = self.state();
		let opening = *state.opening_balances.get(account_id)?;
		let imported: i64 = state
			.transactions
			.get(account_id)
			.map(|txns| txns.iter().map(|t| t.amount).sum())
			.unwrap_or(0);
		Some(opening + imported)
	}

	pub fn is_initialized(&self) -> bool {
		self.state().initialized
	}

	pub fn downloaded_ledger(&self) -> Option<String> {
		self.state().downloaded.clone()
	}

	pub fn shutdown_count(&self) -> usize {
		self.state().shutdowns
	}
}

#[async_trait::async_trait]
impl LedgerGateway for MemoryLedgerGateway {
	async fn init(&self, _settings: &LedgerSettings) -> Result<(), GatewayError> {
		let mut state = self.enter("init")?;
		state.initialized = true;
		Ok(())
	}

	async fn download_ledger(&self, sync_id: &str) -> Result<(), GatewayError> {
		let mut state = self.enter("download_ledger")?;
		if !state.initialized {
			return Err(GatewayError::NotInitialized);
		}
		state.downloaded = Some(sync_id.to_string());
		Ok(())
	}

	async fn list_accounts(&self) -> Result<Vec<LedgerAccount>, GatewayError> {
		let state = self.enter("list_accounts")?;
		Ok(state.accounts.clone())
	}

	async fn create_account(
		&self,
		spec: &AccountSpec,
		opening_balance: i64,
	) -> Result<String, GatewayError> {
		let mut state = self.enter("create_account")?;
		state.next_id += 1;
		let id = format!("acc-{}", state.next_id);

		state.accounts.push(LedgerAccount {
			id: id.clone(),
			name: spec.name.clone(),
			account_type: spec.account_type,
			closed: false,
		});
		state.opening_balances.insert(id.clone(), opening_balance);
		Ok(id)
	}

	async fn delete_account(&self, account_id: &str) -> Result<(), GatewayError> {
		let mut state = self.enter("delete_account")?;
		let before = state.accounts.len();
		state.accounts.retain(|a| a.id != account_id);
		if state.accounts.len() == before {
			return Err(GatewayError::AccountNotFound(account_id.to_string()));
		}

		state.opening_balances.remove(account_id);
		state.transactions.remove(account_id);
		state.notes.retain(|n| n.account_id() != Some(account_id));
		Ok(())
	}

	async fn query_notes(&self, filter: &str) -> Result<Vec<Note>, GatewayError> {
		let state = self.enter("query_notes")?;
		Ok(state
			.notes
			.iter()
			.filter(|n| n.note.contains(filter))
			.cloned()
			.collect())
	}

	async fn attach_note(&self, target_id: &str, text: &str) -> Result<(), GatewayError> {
		let mut state = self.enter("attach_note")?;
		match state.notes.iter_mut().find(|n| n.id == target_id) {
			Some(existing) => existing.note = text.to_string(),
			None => state.notes.push(Note {
				id: target_id.to_string(),
				note: text.to_string(),
			}),
		}
		Ok(())
	}

	async fn import_transactions(
		&self,
		account_id: &str,
		transactions: &[LedgerTransaction],
	) -> Result<ImportResult, GatewayError> {
		let mut state = self.enter("import_transactions")?;
		if !state.accounts.iter().any(|a| a.id == account_id) {
			return Err(GatewayError::AccountNotFound(account_id.to_string()));
		}

		if !state.pending_import_errors.is_empty() {
			let errors = std::mem::take(&mut state.pending_import_errors);
			return Ok(ImportResult {
				errors,
				..ImportResult::default()
			});
		}

		let mut result = ImportResult::default();
		let stored = state.transactions.entry(account_id.to_string()).or_default();
		for txn in transactions {
			match stored.iter_mut().find(|t| t.imported_id == txn.imported_id) {
				Some(existing) => {
					*existing = txn.clone();
					result.updated.push(txn.imported_id.clone());
				}
				None => {
					stored.push(txn.clone());
					result.added.push(txn.imported_id.clone());
				}
			}
		}

		Ok(result)
	}

	async fn shutdown(&self) -> Result<(), GatewayError> {
		let mut state = self.enter("shutdown")?;
		state.initialized = false;
		state.shutdowns += 1;
		Ok(())
	}
}
