//! Binding of external accounts to ledger accounts.
//!
//! The ledger offers no structured per-account metadata, so the binding is written as a marker
//! inside the note attached to the ledger account. That encoding stays behind the
//! `AccountDirectory` trait; the reconciler only asks "which account is this" and "remember
//! that this is that account".

use crate::gateway::{ACCOUNT_NOTE_PREFIX, AccountSpec, AccountType, LedgerGateway};
use crate::scraper::ExternalAccount;
use crate::sync::retry::{RetryExecutor, RetrySetting};
use crate::sync::types::ImportError;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Marker text identifying the ledger account bound to `account_number`.
pub fn account_marker(account_number: &str) -> String {
	format!("#externalAccountNumber:{} DO NOT DELETE", account_number)
}

/// Lookup and binding of external account numbers to ledger account ids.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
	/// Ledger account bound to `external_id`, if any.
	async fn find(&self, external_id: &str) -> Result<Option<String>, ImportError>;

	/// Record that `account_id` represents `external_id`.
	async fn bind(&self, account_id: &str, external_id: &str) -> Result<(), ImportError>;
}

/// `AccountDirectory` backed by marker notes stored in the ledger.
pub struct NoteAccountDirectory {
	gateway: Arc<dyn LedgerGateway>,
}

impl NoteAccountDirectory {
	pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
		Self { gateway }
	}
}

#[async_trait]
impl AccountDirectory for NoteAccountDirectory {
	async fn find(&self, external_id: &str) -> Result<Option<String>, ImportError> {
		let marker = account_marker(external_id);
		let notes = self.gateway.query_notes(&marker).await?;

		// The ledger filter is a plain substring search; keep only notes carrying the full marker
		// on account ids.
		let matches: Vec<&str> = notes
			.iter()
			.filter(|note| note.note.contains(&marker))
			.filter_map(|note| note.account_id())
			.collect();

		if matches.len() > 1 {
			warn!(
				"External account {} is bound to {} ledger accounts ({}), using the first",
				external_id,
				matches.len(),
				matches.join(", ")
			);
		}

		Ok(matches.first().map(|id| id.to_string()))
	}

	async fn bind(&self, account_id: &str, external_id: &str) -> Result<(), ImportError> {
		let note_id = format!("{}{}", ACCOUNT_NOTE_PREFIX, account_id);
		self.gateway
			.attach_note(&note_id, &account_marker(external_id))
			.await?;
		Ok(())
	}
}

/// Ledger account an external account resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
	pub account_id: String,
	pub account_name: String,
	/// Whether the account was created by this resolution.
	pub created: bool,
}

/// Finds or creates the ledger account for each external account.
pub struct AccountReconciler {
	gateway: Arc<dyn LedgerGateway>,
	directory: Box<dyn AccountDirectory>,
}

impl AccountReconciler {
	/// Reconciler using marker notes in `gateway` as the directory.
	pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
		let directory = Box::new(NoteAccountDirectory::new(gateway.clone()));
		Self::with_directory(gateway, directory)
	}

	pub fn with_directory(
		gateway: Arc<dyn LedgerGateway>,
		directory: Box<dyn AccountDirectory>,
	) -> Self {
		Self { gateway, directory }
	}

	/// Name given to a newly created ledger account.
	pub fn account_name(source_id: &str, account_number: &str) -> String {
		format!("{}_{}", source_id, account_number)
	}

	/// Opening balance in minor units so that, once every scraped transaction is imported, the
	/// ledger balance equals the balance the source reported.
	///
	/// Fails with `ReconcileError` when the scraped amounts overflow.
	pub fn opening_balance(&self, account: &ExternalAccount) -> Result<i64, ImportError> {
		let Some(balance) = account.balance else {
			return Ok(0);
		};

		let opening = account
			.transactions_total()
			.and_then(|total| balance.checked_sub(total))
			.ok_or_else(|| {
				ImportError::ReconcileError(format!(
					"opening balance of account {} overflows",
					account.account_number
				))
			})?;

		Ok(self.gateway.amount_to_minor_units(opening))
	}

	/// Return the ledger account bound to `account`, creating and binding one if needed.
	///
	/// Lookup, creation and binding are retried as separate steps so a failed bind never
	/// creates a second account. A bind that still fails leaves an unmarked account behind,
	/// which the next run cannot recognize.
	pub async fn resolve_or_create(
		&self,
		source_id: &str,
		account: &ExternalAccount,
		account_type: AccountType,
		retry: &RetryExecutor,
		setting: Option<&RetrySetting>,
	) -> Result<ResolvedAccount, ImportError> {
		let number = account.account_number.as_str();
		let account_name = Self::account_name(source_id, number);
		let directory = self.directory.as_ref();

		let lookup_context = format!("look up account {}", account_name);
		let existing = retry
			.execute(&lookup_context, setting, || async move {
				directory.find(number).await
			})
			.await?;

		if let Some(account_id) = existing {
			debug!("Found ledger account {} for {}", account_id, account_name);
			return Ok(ResolvedAccount {
				account_id,
				account_name,
				created: false,
			});
		}

		let opening_balance = self.opening_balance(account)?;
		let spec = AccountSpec {
			name: account_name.clone(),
			account_type,
			offbudget: false,
		};
		let gateway = self.gateway.as_ref();
		let spec_ref = &spec;

		let create_context = format!("create account {}", account_name);
		let account_id = retry
			.execute(&create_context, setting, || async move {
				gateway
					.create_account(spec_ref, opening_balance)
					.await
					.map_err(ImportError::from)
			})
			.await?;

		info!(
			account_id = %account_id,
			account_name = %account_name,
			opening_balance,
			"Created ledger account"
		);

		let bind_context = format!("mark account {}", account_name);
		let id_ref = account_id.as_str();
		if let Err(e) = retry
			.execute(&bind_context, setting, || async move {
				directory.bind(id_ref, number).await
			})
			.await
		{
			error!(
				"Ledger account {} was created for {} but could not be marked, the next run will create a duplicate: {}",
				account_id, account_name, e
			);
			return Err(e);
		}

		Ok(ResolvedAccount {
			account_id,
			account_name,
			created: true,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::gateway::{LedgerAccount, MemoryLedgerGateway};
	use crate::scraper::{SourceTransaction, TransactionStatus};
	use rust_decimal::Decimal;
	use rust_decimal_macros::dec;

	fn external(number: &str, balance: Option<Decimal>, amounts: &[Decimal]) -> ExternalAccount {
		ExternalAccount {
			account_number: number.to_string(),
			balance,
			txns: amounts
				.iter()
				.enumerate()
				.map(|(i, amount)| SourceTransaction {
					identifier: None,
					description: format!("txn {}", i),
					date: "2024-01-01T00:00:00Z".parse().unwrap(),
					charged_amount: *amount,
					category: None,
					memo: None,
					status: TransactionStatus::Completed,
				})
				.collect(),
		}
	}

	fn no_retry() -> RetryExecutor {
		RetryExecutor::default()
	}

	#[test]
	fn marker_format() {
		assert_eq!(
			account_marker("12345"),
			"#externalAccountNumber:12345 DO NOT DELETE"
		);
	}

	#[tokio::test]
	async fn existing_marker_resolves_without_creating() {
		let ledger = Arc::new(MemoryLedgerGateway::new());
		ledger.seed_account(
			LedgerAccount {
				id: "abc".to_string(),
				name: "hapoalim_12345".to_string(),
				account_type: AccountType::Checking,
				closed: false,
			},
			Some(account_marker("12345").as_str()),
		);
		let reconciler = AccountReconciler::new(ledger.clone());

		let resolved = reconciler
			.resolve_or_create(
				"hapoalim",
				&external("12345", None, &[]),
				AccountType::Checking,
				&no_retry(),
				None,
			)
			.await
			.unwrap();

		assert_eq!(resolved.account_id, "abc");
		assert!(!resolved.created);
		assert_eq!(ledger.call_count("create_account"), 0);
		assert_eq!(ledger.accounts().len(), 1);
	}

	#[tokio::test]
	async fn unmarked_account_is_created_and_marked_once() {
		let ledger = Arc::new(MemoryLedgerGateway::new());
		let reconciler = AccountReconciler::new(ledger.clone());

		let resolved = reconciler
			.resolve_or_create(
				"max",
				&external("9876", Some(dec!(100)), &[dec!(-20), dec!(5.5)]),
				AccountType::Credit,
				&no_retry(),
				None,
			)
			.await
			.unwrap();

		assert!(resolved.created);
		assert_eq!(resolved.account_name, "max_9876");
		assert_eq!(ledger.call_count("create_account"), 1);

		let notes = ledger.notes();
		assert_eq!(notes.len(), 1);
		assert_eq!(notes[0].id, format!("account-{}", resolved.account_id));
		assert!(notes[0].note.contains("#externalAccountNumber:9876 DO NOT DELETE"));

		let accounts = ledger.accounts();
		assert_eq!(accounts[0].name, "max_9876");
		assert_eq!(accounts[0].account_type, AccountType::Credit);
		// 100 - (-20 + 5.5) = 114.5
		assert_eq!(ledger.balance(&resolved.account_id), Some(11450));
	}

	#[tokio::test]
	async fn second_resolution_reuses_the_created_account() {
		let ledger = Arc::new(MemoryLedgerGateway::new());
		let reconciler = AccountReconciler::new(ledger.clone());
		let account = external("555", None, &[dec!(-1)]);

		let first = reconciler
			.resolve_or_create("leumi", &account, AccountType::Checking, &no_retry(), None)
			.await
			.unwrap();
		let second = reconciler
			.resolve_or_create("leumi", &account, AccountType::Checking, &no_retry(), None)
			.await
			.unwrap();

		assert_eq!(first.account_id, second.account_id);
		assert!(!second.created);
		assert_eq!(ledger.accounts().len(), 1);
	}

	#[tokio::test]
	async fn prefix_numbers_do_not_collide() {
		let ledger = Arc::new(MemoryLedgerGateway::new());
		ledger.seed_account(
			LedgerAccount {
				id: "long".to_string(),
				name: "bank_1234".to_string(),
				account_type: AccountType::Checking,
				closed: false,
			},
			Some(account_marker("1234").as_str()),
		);
		let directory = NoteAccountDirectory::new(ledger.clone());

		assert_eq!(directory.find("123").await.unwrap(), None);
		assert_eq!(directory.find("1234").await.unwrap(), Some("long".to_string()));
	}

	#[test]
	fn missing_balance_opens_at_zero() {
		let reconciler = AccountReconciler::new(Arc::new(MemoryLedgerGateway::new()));

		assert_eq!(
			reconciler
				.opening_balance(&external("1", None, &[dec!(-50)]))
				.unwrap(),
			0
		);
		assert_eq!(
			reconciler
				.opening_balance(&external("1", Some(dec!(0)), &[dec!(-50)]))
				.unwrap(),
			5000
		);
	}

	#[tokio::test]
	async fn overflowing_balance_fails_without_creating() {
		let ledger = Arc::new(MemoryLedgerGateway::new());
		let reconciler = AccountReconciler::new(ledger.clone());
		let account = external("77", Some(Decimal::MAX), &[dec!(-1)]);

		assert!(matches!(
			reconciler.opening_balance(&account),
			Err(ImportError::ReconcileError(_))
		));

		let err = reconciler
			.resolve_or_create("hapoalim", &account, AccountType::Checking, &no_retry(), None)
			.await
			.unwrap_err();

		assert!(matches!(err, ImportError::ReconcileError(_)));
		assert_eq!(ledger.call_count("create_account"), 0);
		assert!(ledger.accounts().is_empty());
	}

	#[tokio::test]
	async fn failed_bind_is_retried_without_recreating() {
		let ledger = Arc::new(MemoryLedgerGateway::new());
		ledger.inject_failures("attach_note", 1);
		let reconciler = AccountReconciler::new(ledger.clone());
		let retry = RetryExecutor::new(Some(crate::sync::retry::RetryPolicy::new(
			2,
			std::time::Duration::from_millis(1),
			std::time::Duration::from_millis(1),
		)));

		let resolved = reconciler
			.resolve_or_create(
				"discount",
				&external("42", None, &[]),
				AccountType::Savings,
				&retry,
				None,
			)
			.await
			.unwrap();

		assert!(resolved.created);
		assert_eq!(ledger.call_count("create_account"), 1);
		assert_eq!(ledger.call_count("attach_note"), 2);
		assert_eq!(ledger.notes().len(), 1);
	}
}
