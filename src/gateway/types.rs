//! Types exchanged with the budgeting ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Prefix the ledger puts in front of an account id when the account is the target of a note.
pub const ACCOUNT_NOTE_PREFIX: &str = "account-";

/// Connection settings for the budgeting ledger.
#[derive(Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// URL of the ledger sync server.
    pub server_url: String,
    /// Server password.
    pub password: String,
    /// Sync id of the budget file to download and write into.
    pub sync_id: String,
    /// Local directory the ledger client keeps its data in.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl std::fmt::Debug for LedgerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSettings")
            .field("server_url", &self.server_url)
            .field("password", &"<redacted>")
            .field("sync_id", &self.sync_id)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

/// Kind of ledger account created for a newly seen external account.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Checking,
    Savings,
    Credit,
    Investment,
    Mortgage,
    Debt,
    Other,
}

/// An account as listed by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerAccount {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub closed: bool,
}

/// Description of an account to create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountSpec {
    /// Stable synthetic name, `{source}_{external number}`.
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default)]
    pub offbudget: bool,
}

/// A free-text note stored by the ledger.
///
/// `id` names the note's target, e.g. `account-<account id>` for an account note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub id: String,
    pub note: String,
}

impl Note {
    /// Id of the account this note is attached to, if it targets an account.
    pub fn account_id(&self) -> Option<&str> {
        self.id.strip_prefix(ACCOUNT_NOTE_PREFIX)
    }
}

/// A transaction in the shape the ledger imports.
///
/// `imported_id` is the only de-duplication key: the ledger treats a second import of the
/// same id as an update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub imported_id: String,
    pub account: String,
    pub date: NaiveDate,
    /// Amount in minor units, negative for expenses.
    pub amount: i64,
    pub payee_name: String,
    pub imported_payee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub cleared: bool,
}

/// Result of an idempotent transaction import.
///
/// Per-transaction problems are reported in-band through `errors` rather than as a failed call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResult {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub updated: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ImportResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Error types for ledger gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Ledger RPC error in {method}: {message}")]
    RpcError { method: String, message: String },

    #[error("Authentication with the ledger failed: {0}")]
    AuthenticationError(String),

    #[error("Ledger account not found: {0}")]
    AccountNotFound(String),

    #[error("No data returned for {0}")]
    NoData(String),

    #[error("Ledger gateway is not initialized")]
    NotInitialized,
}

impl GatewayError {
    /// Whether retrying the same call cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            GatewayError::AuthenticationError(_) | GatewayError::NotInitialized
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_account_id_strips_prefix() {
        let note = Note {
            id: "account-abc".to_string(),
            note: "#externalAccountNumber:12345 DO NOT DELETE".to_string(),
        };
        assert_eq!(note.account_id(), Some("abc"));

        let budget_note = Note {
            id: "budget-2024".to_string(),
            note: "misc".to_string(),
        };
        assert_eq!(budget_note.account_id(), None);
    }

    #[test]
    fn account_type_uses_lowercase_names() {
        let spec = AccountSpec {
            name: "hapoalim_123".to_string(),
            account_type: AccountType::Credit,
            offbudget: false,
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["type"], "credit");
        assert_eq!(value["name"], "hapoalim_123");
    }

    #[test]
    fn import_result_tolerates_missing_lists() {
        let result: ImportResult = serde_json::from_str(r#"{"added":["a"]}"#).unwrap();
        assert_eq!(result.added, vec!["a".to_string()]);
        assert!(result.updated.is_empty());
        assert!(!result.has_errors());
    }

    #[test]
    fn settings_debug_hides_password() {
        let settings = LedgerSettings {
            server_url: "http://localhost:5006".to_string(),
            password: "hunter2".to_string(),
            sync_id: "sync".to_string(),
            data_dir: "./data".to_string(),
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
