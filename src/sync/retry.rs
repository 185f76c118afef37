//! Bounded retries with capped exponential backoff.
//!
//! Every fallible external call of the import pipeline goes through `RetryExecutor::execute`.
//! The delay schedule comes from `backoff::ExponentialBackoff` with a multiplier of two and no
//! jitter, so the wait before attempt `n + 1` is `min(initial_delay * 2^(n - 1), max_delay)`.
//! Attempt counting, failure recording and the permanent-error cutoff stay here.

use crate::sync::types::ImportError;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How often and how patiently a call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Total number of attempts, the first one included.
	pub max_attempts: u32,
	/// Wait after the first failure.
	#[serde(rename = "initial_delay_ms", with = "duration_ms")]
	pub initial_delay: Duration,
	/// Upper bound of any single wait.
	#[serde(rename = "max_delay_ms", with = "duration_ms")]
	pub max_delay: Duration,
}

impl RetryPolicy {
	/// Policy used when neither the call nor the process configures one.
	pub const FALLBACK: RetryPolicy = RetryPolicy {
		max_attempts: 1,
		initial_delay: Duration::from_millis(1000),
		max_delay: Duration::from_millis(10000),
	};

	pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
		Self {
			max_attempts,
			initial_delay,
			max_delay,
		}
	}

	pub fn validate(&self) -> Result<(), String> {
		if self.max_attempts == 0 {
			return Err("max_attempts must be at least 1".to_string());
		}
		if self.initial_delay > self.max_delay {
			return Err(format!(
				"initial delay {:?} exceeds max delay {:?}",
				self.initial_delay, self.max_delay
			));
		}
		Ok(())
	}

	/// Delay schedule between consecutive attempts.
	pub fn backoff_schedule(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.initial_delay.min(self.max_delay))
			.with_multiplier(2.0)
			.with_randomization_factor(0.0)
			.with_max_interval(self.max_delay)
			.with_max_elapsed_time(None)
			.build()
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::FALLBACK
	}
}

/// Per-call retry override: a policy of its own, or no retries at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawRetrySetting")]
pub enum RetrySetting {
	/// Run the operation once and hand back its error untouched.
	Disabled,
	Policy(RetryPolicy),
}

/// Accepts `retry = false` or a policy table.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRetrySetting {
	Flag(bool),
	Policy(RetryPolicy),
}

impl TryFrom<RawRetrySetting> for RetrySetting {
	type Error = String;

	fn try_from(raw: RawRetrySetting) -> Result<Self, Self::Error> {
		match raw {
			RawRetrySetting::Flag(false) => Ok(RetrySetting::Disabled),
			RawRetrySetting::Flag(true) => {
				Err("`retry = true` is ambiguous, give a policy table or omit the key".to_string())
			}
			RawRetrySetting::Policy(policy) => Ok(RetrySetting::Policy(policy)),
		}
	}
}

/// Runs operations under the resolved retry policy.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
	default_policy: Option<RetryPolicy>,
}

impl RetryExecutor {
	/// Create an executor with an optional process-wide default policy.
	pub fn new(default_policy: Option<RetryPolicy>) -> Self {
		Self { default_policy }
	}

	/// Effective policy for a call, `None` when retries are disabled.
	pub fn resolve(&self, setting: Option<&RetrySetting>) -> Option<RetryPolicy> {
		match setting {
			Some(RetrySetting::Disabled) => None,
			Some(RetrySetting::Policy(policy)) => Some(*policy),
			None => Some(self.default_policy.unwrap_or(RetryPolicy::FALLBACK)),
		}
	}

	/// Run `operation` until it succeeds, fails permanently or runs out of attempts.
	///
	/// With retries disabled the operation runs exactly once and its error is returned as is.
	/// Otherwise exhaustion yields `ImportError::RetryExhausted` carrying every failure in
	/// attempt order.
	pub async fn execute<T, F, Fut>(
		&self,
		context: &str,
		setting: Option<&RetrySetting>,
		mut operation: F,
	) -> Result<T, ImportError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, ImportError>>,
	{
		let Some(policy) = self.resolve(setting) else {
			debug!("Retries disabled for {}", context);
			return operation().await;
		};

		let max_attempts = policy.max_attempts.max(1);
		let mut schedule = policy.backoff_schedule();
		let mut failures = Vec::new();

		for attempt in 1..=max_attempts {
			match operation().await {
				Ok(value) => {
					if attempt > 1 {
						debug!("{} succeeded on attempt {}", context, attempt);
					}
					return Ok(value);
				}
				Err(e) => {
					warn!(
						context,
						attempt,
						max_attempts,
						error = %e,
						"Attempt failed"
					);

					let permanent = e.is_permanent();
					failures.push(e);

					if permanent {
						warn!("{} failed permanently, not retrying", context);
						break;
					}

					if attempt < max_attempts {
						let delay = schedule.next_backoff().unwrap_or(policy.max_delay);
						debug!("Retrying {} in {:?}", context, delay);
						tokio::time::sleep(delay).await;
					}
				}
			}
		}

		error!(
			"{} failed after {} attempt(s)",
			context,
			failures.len()
		);
		Err(ImportError::RetryExhausted {
			context: context.to_string(),
			failures,
		})
	}
}

mod duration_ms {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_millis(u64::deserialize(deserializer)?))
	}
}
