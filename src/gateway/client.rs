//!
//! JSON-RPC client for the budgeting ledger bridge.
//!
//! The ledger's own client library runs inside a bridge process; this client drives it over
//! HTTP. Each call is a `POST` of `{"method": ..., "params": ...}` answered with either
//! `{"result": ...}` or `{"error": {"code": ..., "message": ...}}`.

use super::types::*;
use super::LedgerGateway;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

/// Error code the bridge uses for rejected credentials.
const UNAUTHORIZED_CODE: &str = "unauthorized";

/// Ledger bridge JSON-RPC client
#[derive(Clone)]
pub struct RpcLedgerGateway {
	/// The underlying HTTP client.
	http_client: Client,
	/// Endpoint of the bridge's RPC route.
	rpc_url: String,
}

impl RpcLedgerGateway {
	/// Create a new bridge client.
	///
	/// # Arguments
	/// * `rpc_url` - The HTTP endpoint accepting RPC calls.
	pub fn new(rpc_url: String) -> Result<Self, GatewayError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			rpc_url,
		})
	}

	/// Execute one RPC call and decode its `result`.
	pub async fn call<T: DeserializeOwned>(
		&self,
		method: &str,
		params: Value,
	) -> Result<T, GatewayError> {
		debug!("Calling ledger bridge method {}", method);

		let response = self
			.http_client
			.post(&self.rpc_url)
			.header("Content-Type", "application/json")
			.json(&json!({
				"method": method,
				"params": params
			}))
			.send()
			.await?;

		if response.status() == reqwest::StatusCode::UNAUTHORIZED {
			return Err(GatewayError::AuthenticationError(format!(
				"HTTP error: {}",
				response.status()
			)));
		}

		if !response.status().is_success() {
			return Err(GatewayError::RpcError {
				method: method.to_string(),
				message: format!("HTTP error: {}", response.status()),
			});
		}

		let body: Value = response.json().await?;
		let result = decode_response(method, body)?;
		Ok(serde_json::from_value(result)?)
	}
}

/// Split an RPC response body into its result or a typed error.
pub(crate) fn decode_response(method: &str, mut body: Value) -> Result<Value, GatewayError> {
	if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
		let code = error.get("code").and_then(|c| c.as_str()).unwrap_or("");
		let message = error
			.get("message")
			.and_then(|m| m.as_str())
			.map(|m| m.to_string())
			.unwrap_or_else(|| error.to_string());

		if code == UNAUTHORIZED_CODE {
			return Err(GatewayError::AuthenticationError(message));
		}

		return Err(GatewayError::RpcError {
			method: method.to_string(),
			message,
		});
	}

	match body.get_mut("result") {
		Some(result) => Ok(result.take()),
		None => Err(GatewayError::NoData(method.to_string())),
	}
}

#[async_trait::async_trait]
impl LedgerGateway for RpcLedgerGateway {
	async fn init(&self, settings: &LedgerSettings) -> Result<(), GatewayError> {
		info!("Connecting to ledger server at {}", settings.server_url);
		self.call::<Value>(
			"init",
			json!({
				"serverURL": settings.server_url,
				"password": settings.password,
				"dataDir": settings.data_dir,
			}),
		)
		.await?;
		Ok(())
	}

	async fn download_ledger(&self, sync_id: &str) -> Result<(), GatewayError> {
		info!("Downloading ledger {}", sync_id);
		self.call::<Value>("downloadBudget", json!({ "syncId": sync_id }))
			.await?;
		Ok(())
	}

	async fn list_accounts(&self) -> Result<Vec<LedgerAccount>, GatewayError> {
		self.call("getAccounts", json!({})).await
	}

	async fn create_account(
		&self,
		spec: &AccountSpec,
		opening_balance: i64,
	) -> Result<String, GatewayError> {
		self.call(
			"createAccount",
			json!({
				"account": spec,
				"initialBalance": opening_balance,
			}),
		)
		.await
	}

	async fn delete_account(&self, account_id: &str) -> Result<(), GatewayError> {
		self.call::<Value>("deleteAccount", json!({ "id": account_id }))
			.await?;
		Ok(())
	}

	async fn query_notes(&self, filter: &str) -> Result<Vec<Note>, GatewayError> {
		self.call("queryNotes", json!({ "contains": filter })).await
	}

	async fn attach_note(&self, target_id: &str, text: &str) -> Result<(), GatewayError> {
		self.call::<Value>("saveNote", json!({ "id": target_id, "note": text }))
			.await?;
		Ok(())
	}

	async fn import_transactions(
		&self,
		account_id: &str,
		transactions: &[LedgerTransaction],
	) -> Result<ImportResult, GatewayError> {
		self.call(
			"importTransactions",
			json!({
				"accountId": account_id,
				"transactions": transactions,
			}),
		)
		.await
	}

	async fn shutdown(&self) -> Result<(), GatewayError> {
		info!("Shutting down ledger connection");
		self.call::<Value>("shutdown", json!({})).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_result_payload() {
		let body = json!({ "result": [{ "id": "account-1", "note": "x" }] });
		let result = decode_response("queryNotes", body).unwrap();
		let notes: Vec<Note> = serde_json::from_value(result).unwrap();
		assert_eq!(notes.len(), 1);
		assert_eq!(notes[0].account_id(), Some("1"));
	}

	#[test]
	fn maps_error_payload_to_rpc_error() {
		let body = json!({ "error": { "code": "internal", "message": "boom" } });
		match decode_response("getAccounts", body) {
			Err(GatewayError::RpcError { method, message }) => {
				assert_eq!(method, "getAccounts");
				assert_eq!(message, "boom");
			}
			other => panic!("unexpected: {:?}", other),
		}
	}

	#[test]
	fn unauthorized_code_is_permanent() {
		let body = json!({ "error": { "code": "unauthorized", "message": "bad password" } });
		let err = decode_response("init", body).unwrap_err();
		assert!(matches!(err, GatewayError::AuthenticationError(_)));
		assert!(err.is_permanent());
	}

	#[test]
	fn missing_result_is_no_data() {
		let err = decode_response("getAccounts", json!({})).unwrap_err();
		assert!(matches!(err, GatewayError::NoData(m) if m == "getAccounts"));
	}

	#[test]
	fn null_error_field_is_ignored() {
		let body = json!({ "error": null, "result": "acc-1" });
		assert_eq!(decode_response("createAccount", body).unwrap(), json!("acc-1"));
	}
}
