use crate::gateway::LedgerTransaction;
use crate::scraper::{SourceTransaction, TransactionStatus};

use chrono_tz::Tz;
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Turns scraped transactions into ledger transactions.
///
/// Mapping is pure: the same input always yields the same output, in the same order.
#[derive(Debug, Clone, Copy)]
pub struct TransactionMapper {
	/// Zone in which a transaction timestamp is read as a calendar date.
	timezone: Tz,
}

impl Default for TransactionMapper {
	fn default() -> Self {
		Self::new(Tz::UTC)
	}
}

impl TransactionMapper {
	pub fn new(timezone: Tz) -> Self {
		Self { timezone }
	}

	/// Map one scraped transaction, `None` when it carries no usable identifier.
	pub fn map_transaction<F>(
		&self,
		account_id: &str,
		transaction: &SourceTransaction,
		to_minor_units: &F,
	) -> Option<LedgerTransaction>
	where
		F: Fn(Decimal) -> i64,
	{
		let Some(imported_id) = transaction.identifier.as_ref().and_then(|id| id.token()) else {
			debug!(
				"Skipping transaction without identifier: {} on {}",
				transaction.description, transaction.date
			);
			return None;
		};

		Some(LedgerTransaction {
			imported_id,
			account: account_id.to_string(),
			date: transaction.date.with_timezone(&self.timezone).date_naive(),
			amount: to_minor_units(transaction.charged_amount),
			payee_name: transaction.description.clone(),
			imported_payee: transaction.description.clone(),
			notes: transaction.memo.clone(),
			cleared: transaction.status == TransactionStatus::Completed,
		})
	}

	/// Map a batch of scraped transactions for `account_id`, dropping unidentified ones.
	pub fn map<F>(
		&self,
		account_id: &str,
		transactions: &[SourceTransaction],
		to_minor_units: F,
	) -> Vec<LedgerTransaction>
	where
		F: Fn(Decimal) -> i64,
	{
		let mapped: Vec<LedgerTransaction> = transactions
			.iter()
			.filter_map(|t| self.map_transaction(account_id, t, &to_minor_units))
			.collect();

		let dropped = transactions.len() - mapped.len();
		if dropped > 0 {
			info!(
				account_id,
				dropped, "Dropped transactions without identifier"
			);
		}

		mapped
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::gateway::amount_to_integer;
	use crate::scraper::TransactionIdentifier;
	use chrono::{DateTime, NaiveDate, Utc};
	use rust_decimal::prelude::ToPrimitive;
	use rust_decimal_macros::dec;

	fn source(id: Option<TransactionIdentifier>, date: &str, amount: Decimal) -> SourceTransaction {
		SourceTransaction {
			identifier: id,
			description: "Supermarket".to_string(),
			date: date.parse::<DateTime<Utc>>().unwrap(),
			charged_amount: amount,
			category: Some("Food".to_string()),
			memo: Some("card 1234".to_string()),
			status: TransactionStatus::Completed,
		}
	}

	fn text(id: &str) -> Option<TransactionIdentifier> {
		Some(TransactionIdentifier::Text(id.to_string()))
	}

	#[test]
	fn maps_every_field() {
		let mapper = TransactionMapper::default();
		let mut pending = source(
			Some(TransactionIdentifier::Number(77_u64.into())),
			"2024-03-05T10:00:00Z",
			dec!(150.10),
		);
		pending.status = TransactionStatus::Pending;
		pending.memo = None;

		let mapped = mapper.map(
			"acc-1",
			&[source(text("a1"), "2024-03-04T10:00:00Z", dec!(-42.5)), pending],
			amount_to_integer,
		);

		assert_eq!(mapped.len(), 2);
		let expense = &mapped[0];
		assert_eq!(expense.imported_id, "a1");
		assert_eq!(expense.account, "acc-1");
		assert_eq!(expense.date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
		assert_eq!(expense.amount, -4250);
		assert_eq!(expense.payee_name, "Supermarket");
		assert_eq!(expense.imported_payee, "Supermarket");
		assert_eq!(expense.notes.as_deref(), Some("card 1234"));
		assert!(expense.cleared);

		let income = &mapped[1];
		assert_eq!(income.imported_id, "77");
		assert_eq!(income.amount, 15010);
		assert_eq!(income.notes, None);
		assert!(!income.cleared);
	}

	#[test]
	fn drops_unidentified_and_keeps_order() {
		let mapper = TransactionMapper::default();
		let input = vec![
			source(text("first"), "2024-01-01T00:00:00Z", dec!(-1)),
			source(None, "2024-01-02T00:00:00Z", dec!(-2)),
			source(text("third"), "2024-01-03T00:00:00Z", dec!(-3)),
			source(text(""), "2024-01-04T00:00:00Z", dec!(-4)),
			source(text("fifth"), "2024-01-05T00:00:00Z", dec!(-5)),
		];

		let ids: Vec<String> = mapper
			.map("acc-1", &input, amount_to_integer)
			.into_iter()
			.map(|t| t.imported_id)
			.collect();

		assert_eq!(ids, vec!["first", "third", "fifth"]);
	}

	#[test]
	fn mapping_twice_gives_identical_output() {
		let mapper = TransactionMapper::default();
		let input = vec![
			source(text("x"), "2024-01-01T00:00:00Z", dec!(-10.01)),
			source(None, "2024-01-02T00:00:00Z", dec!(3)),
			source(text("y"), "2024-01-03T00:00:00Z", dec!(7.77)),
		];

		let first = mapper.map("acc-9", &input, amount_to_integer);
		let second = mapper.map("acc-9", &input, amount_to_integer);
		assert_eq!(first, second);
	}

	#[test]
	fn dates_follow_the_configured_zone() {
		// Local midnight in Jerusalem is reported as 22:00 UTC the day before.
		let jerusalem = TransactionMapper::new(chrono_tz::Asia::Jerusalem);
		let txn = source(text("z"), "2024-02-29T22:00:00Z", dec!(-1));

		let local = jerusalem.map("acc-1", std::slice::from_ref(&txn), amount_to_integer);
		assert_eq!(local[0].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

		let utc = TransactionMapper::default().map("acc-1", &[txn], amount_to_integer);
		assert_eq!(utc[0].date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
	}

	#[test]
	fn uses_the_supplied_conversion_rule() {
		let mapper = TransactionMapper::default();
		let input = [source(text("m"), "2024-01-01T00:00:00Z", dec!(-2.5))];

		let mapped = mapper.map("acc-1", &input, |amount| {
			(amount * Decimal::ONE_THOUSAND).trunc().to_i64().unwrap_or(0)
		});
		assert_eq!(mapped[0].amount, -2500);
	}
}
