//! Types for scrape requests and results

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Login credentials for one source.
///
/// The importer never looks inside; the values are only forwarded to the scraper.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Credentials(pub BTreeMap<String, String>);

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// Options of one scrape request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScraperOptions {
    /// Identifier of the institution, also used as the prefix of ledger account names.
    pub company_id: String,
    /// Earliest date to fetch transactions from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Browser binary to drive, when one was provisioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<PathBuf>,
    /// Scraper-specific options, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ScraperOptions {
    pub fn new(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            start_date: None,
            executable_path: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.start_date = Some(start_date);
        self
    }
}

/// Identifier a source assigns to a transaction; numeric or textual depending on the source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TransactionIdentifier {
    Number(serde_json::Number),
    Text(String),
}

impl TransactionIdentifier {
    /// Stable string token used as the ledger's imported id.
    ///
    /// Returns `None` for an empty textual identifier.
    pub fn token(&self) -> Option<String> {
        match self {
            TransactionIdentifier::Number(n) => Some(n.to_string()),
            TransactionIdentifier::Text(s) if s.trim().is_empty() => None,
            TransactionIdentifier::Text(s) => Some(s.clone()),
        }
    }
}

/// Settlement status of a scraped transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Pending,
}

/// A transaction as reported by a source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceTransaction {
    #[serde(default)]
    pub identifier: Option<TransactionIdentifier>,
    pub description: String,
    pub date: DateTime<Utc>,
    /// Signed amount in major units; negative is a debit.
    pub charged_amount: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    pub status: TransactionStatus,
}

/// One account found at a source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAccount {
    pub account_number: String,
    /// Current balance in major units, when the source reports one.
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub txns: Vec<SourceTransaction>,
}

impl ExternalAccount {
    /// Sum of every scraped charged amount, identified or not.
    ///
    /// `None` when the sum does not fit in a `Decimal`.
    pub fn transactions_total(&self) -> Option<Decimal> {
        self.txns
            .iter()
            .try_fold(Decimal::ZERO, |total, t| total.checked_add(t.charged_amount))
    }
}

/// Failure classes reported by scrapers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapeErrorType {
    TwoFactorRetrieverMissing,
    InvalidPassword,
    ChangePassword,
    AccountBlocked,
    Timeout,
    Generic,
    #[serde(rename = "GENERAL_ERROR")]
    General,
    #[serde(other)]
    Unknown,
}

impl ScrapeErrorType {
    /// Failures that another attempt with the same credentials cannot fix.
    ///
    /// Retrying a rejected password can lock the account at the institution.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ScrapeErrorType::TwoFactorRetrieverMissing
                | ScrapeErrorType::InvalidPassword
                | ScrapeErrorType::ChangePassword
                | ScrapeErrorType::AccountBlocked
        )
    }
}

/// Raw scrape result, either a list of accounts or a classified failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub success: bool,
    #[serde(default)]
    pub accounts: Vec<ExternalAccount>,
    #[serde(default)]
    pub error_type: Option<ScrapeErrorType>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ScrapeResult {
    pub fn succeeded(accounts: Vec<ExternalAccount>) -> Self {
        Self {
            success: true,
            accounts,
            error_type: None,
            error_message: None,
        }
    }

    pub fn failed(error_type: ScrapeErrorType, message: impl Into<String>) -> Self {
        Self {
            success: false,
            accounts: Vec::new(),
            error_type: Some(error_type),
            error_message: Some(message.into()),
        }
    }

    /// Turn an unsuccessful result into an error.
    pub fn into_accounts(self) -> Result<Vec<ExternalAccount>, ScraperError> {
        if self.success {
            return Ok(self.accounts);
        }

        Err(ScraperError::Failed {
            error_type: self.error_type.unwrap_or(ScrapeErrorType::Unknown),
            message: self.error_message.unwrap_or_default(),
        })
    }
}

/// Error types for scraper operations
#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{error_type:?}: {message}")]
    Failed {
        error_type: ScrapeErrorType,
        message: String,
    },
}

impl ScraperError {
    pub fn is_permanent(&self) -> bool {
        match self {
            ScraperError::Failed { error_type, .. } => error_type.is_permanent(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const RESULT_JSON: &str = r#"{
        "success": true,
        "accounts": [{
            "accountNumber": "1234",
            "balance": 1520.5,
            "txns": [
                {
                    "type": "normal",
                    "identifier": 991,
                    "date": "2024-02-29T22:00:00.000Z",
                    "processedDate": "2024-03-01T22:00:00.000Z",
                    "originalAmount": -30,
                    "originalCurrency": "ILS",
                    "chargedAmount": -30,
                    "description": "Grocery",
                    "memo": "weekly",
                    "status": "completed"
                },
                {
                    "identifier": "ab-7",
                    "date": "2024-03-02T22:00:00.000Z",
                    "chargedAmount": 12.25,
                    "description": "Refund",
                    "status": "pending"
                },
                {
                    "date": "2024-03-03T22:00:00.000Z",
                    "chargedAmount": -1,
                    "description": "Fee",
                    "status": "completed"
                }
            ]
        }]
    }"#;

    #[test]
    fn parses_scrape_result_json() {
        let result: ScrapeResult = serde_json::from_str(RESULT_JSON).unwrap();
        let accounts = result.into_accounts().unwrap();
        assert_eq!(accounts.len(), 1);

        let account = &accounts[0];
        assert_eq!(account.account_number, "1234");
        assert_eq!(account.balance, Some(dec!(1520.5)));
        assert_eq!(account.txns.len(), 3);
        assert_eq!(
            account.txns[0].identifier,
            Some(TransactionIdentifier::Number(991_u64.into()))
        );
        assert_eq!(
            account.txns[1].identifier,
            Some(TransactionIdentifier::Text("ab-7".to_string()))
        );
        assert_eq!(account.txns[1].status, TransactionStatus::Pending);
        assert_eq!(account.txns[2].identifier, None);
        assert_eq!(account.transactions_total(), Some(dec!(-18.75)));
    }

    #[test]
    fn failed_result_becomes_classified_error() {
        let result: ScrapeResult = serde_json::from_str(
            r#"{"success":false,"errorType":"INVALID_PASSWORD","errorMessage":"bad login"}"#,
        )
        .unwrap();
        let err = result.into_accounts().unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(err.to_string(), "InvalidPassword: bad login");
    }

    #[test]
    fn unknown_error_types_are_transient() {
        let result: ScrapeResult =
            serde_json::from_str(r#"{"success":false,"errorType":"SOMETHING_NEW"}"#).unwrap();
        assert_eq!(result.error_type, Some(ScrapeErrorType::Unknown));
        assert!(!result.into_accounts().unwrap_err().is_permanent());
    }

    #[test]
    fn identifier_tokens() {
        assert_eq!(
            TransactionIdentifier::Number(42_u64.into()).token(),
            Some("42".to_string())
        );
        assert_eq!(
            TransactionIdentifier::Text("x-1".to_string()).token(),
            Some("x-1".to_string())
        );
        assert_eq!(TransactionIdentifier::Text("  ".to_string()).token(), None);
    }

    #[test]
    fn wide_and_fractional_identifiers_decode() {
        let txn: SourceTransaction = serde_json::from_str(
            r#"{"identifier":12345678901234567890,"date":"2024-03-01T00:00:00Z","chargedAmount":-5,"description":"Wide","status":"completed"}"#,
        )
        .unwrap();
        assert_eq!(
            txn.identifier.and_then(|id| id.token()),
            Some("12345678901234567890".to_string())
        );

        let txn: SourceTransaction = serde_json::from_str(
            r#"{"identifier":17.5,"date":"2024-03-01T00:00:00Z","chargedAmount":-5,"description":"Fraction","status":"completed"}"#,
        )
        .unwrap();
        assert_eq!(
            txn.identifier.and_then(|id| id.token()),
            Some("17.5".to_string())
        );
    }

    #[test]
    fn overflowing_total_is_none() {
        let account = ExternalAccount {
            account_number: "1".to_string(),
            balance: None,
            txns: [Decimal::MAX, dec!(1)]
                .into_iter()
                .map(|amount| SourceTransaction {
                    identifier: None,
                    description: "big".to_string(),
                    date: "2024-01-01T00:00:00Z".parse().unwrap(),
                    charged_amount: amount,
                    category: None,
                    memo: None,
                    status: TransactionStatus::Completed,
                })
                .collect(),
        };
        assert_eq!(account.transactions_total(), None);
    }

    #[test]
    fn credentials_debug_hides_values() {
        let mut map = BTreeMap::new();
        map.insert("username".to_string(), "me".to_string());
        map.insert("password".to_string(), "secret".to_string());
        let rendered = format!("{:?}", Credentials(map));
        assert!(rendered.contains("username"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn options_keep_unknown_fields() {
        let options: ScraperOptions = serde_json::from_str(
            r#"{"companyId":"hapoalim","startDate":"2024-01-01T00:00:00Z","showBrowser":false}"#,
        )
        .unwrap();
        assert_eq!(options.company_id, "hapoalim");
        assert!(options.start_date.is_some());
        assert_eq!(options.extra["showBrowser"], serde_json::json!(false));

        let round = serde_json::to_value(&options).unwrap();
        assert_eq!(round["showBrowser"], serde_json::json!(false));
    }
}
