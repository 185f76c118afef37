//! Operator confirmation for destructive cleanup.

use crate::sync::types::ImportError;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Asks the operator to approve a destructive step.
#[async_trait::async_trait]
pub trait Confirmation: Send + Sync {
	/// `Ok(true)` only on an explicit yes.
	async fn confirm(&self, prompt: &str) -> Result<bool, ImportError>;
}

/// Reads the answer from standard input.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirmation;

#[async_trait::async_trait]
impl Confirmation for StdinConfirmation {
	async fn confirm(&self, prompt: &str) -> Result<bool, ImportError> {
		let mut stdout = tokio::io::stdout();
		stdout
			.write_all(format!("{} (y/N) ", prompt).as_bytes())
			.await?;
		stdout.flush().await?;

		let mut answer = String::new();
		BufReader::new(tokio::io::stdin())
			.read_line(&mut answer)
			.await?;

		Ok(is_affirmative(&answer))
	}
}

/// Fixed answer, for unattended runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirmation(pub bool);

#[async_trait::async_trait]
impl Confirmation for StaticConfirmation {
	async fn confirm(&self, _prompt: &str) -> Result<bool, ImportError> {
		Ok(self.0)
	}
}

/// Only `y` or `yes` (any case) counts as approval.
pub fn is_affirmative(answer: &str) -> bool {
	matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
