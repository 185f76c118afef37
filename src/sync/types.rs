use crate::gateway::GatewayError;
use crate::scraper::ScraperError;

use serde::Serialize;

/// Lifecycle of the ledger connection owned by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
	Uninitialized,
	Initializing,
	Ready,
	ShuttingDown,
	ShutDown,
}

impl LifecycleState {
	/// Whether moving from `self` to `next` is allowed.
	pub fn can_transition_to(&self, next: LifecycleState) -> bool {
		use LifecycleState::*;
		matches!(
			(self, next),
			(Uninitialized | ShutDown, Initializing)
				| (Initializing, Ready | Uninitialized)
				| (Ready, ShuttingDown)
				| (ShuttingDown, ShutDown)
		)
	}
}

/// Error types for the import pipeline
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
	#[error("Ledger error: {0}")]
	GatewayError(#[from] GatewayError),

	#[error("Scraper error: {0}")]
	ScraperError(#[from] ScraperError),

	#[error("{context} failed after {} attempt(s)", .failures.len())]
	RetryExhausted {
		context: String,
		failures: Vec<ImportError>,
	},

	#[error("Ledger gateway is not initialized")]
	NotInitialized,

	#[error("Invalid lifecycle transition from {from:?} to {to:?}")]
	InvalidTransition {
		from: LifecycleState,
		to: LifecycleState,
	},

	#[error("Cleanup declined by operator")]
	CleanupDeclined,

	#[error("Account reconciliation error: {0}")]
	ReconcileError(String),

	#[error("State persistence error: {0}")]
	PersistenceError(String),

	#[error("Configuration error: {0}")]
	ConfigError(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

impl ImportError {
	/// Whether another attempt of the same call cannot succeed.
	pub fn is_permanent(&self) -> bool {
		match self {
			ImportError::GatewayError(e) => e.is_permanent(),
			ImportError::ScraperError(e) => e.is_permanent(),
			ImportError::RetryExhausted { failures, .. } => {
				failures.last().is_some_and(|f| f.is_permanent())
			}
			ImportError::NotInitialized
			| ImportError::InvalidTransition { .. }
			| ImportError::CleanupDeclined
			| ImportError::ConfigError(_) => true,
			ImportError::ReconcileError(_)
			| ImportError::PersistenceError(_)
			| ImportError::IoError(_) => false,
		}
	}

	/// Rendered underlying causes, one per failed attempt for an exhausted retry.
	pub fn causes(&self) -> Vec<String> {
		match self {
			ImportError::RetryExhausted { failures, .. } => {
				failures.iter().map(|f| f.to_string()).collect()
			}
			other => vec![other.to_string()],
		}
	}
}
