//! Tracing subscriber setup.

use crate::sync::ImportError;

use tracing_subscriber::EnvFilter;

/// Filter for the configured verbosity.
///
/// `show_logs = Some(false)` silences everything; otherwise `RUST_LOG` is honored with INFO as
/// the default level.
pub fn env_filter(show_logs: Option<bool>) -> EnvFilter {
	if show_logs == Some(false) {
		return EnvFilter::new("off");
	}

	EnvFilter::builder()
		.with_default_directive(tracing::Level::INFO.into())
		.from_env_lossy()
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init_tracing(show_logs: Option<bool>) -> Result<(), ImportError> {
	tracing_subscriber::fmt()
		.with_env_filter(env_filter(show_logs))
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.try_init()
		.map_err(|e| ImportError::ConfigError(format!("Failed to install logger: {}", e)))
}
