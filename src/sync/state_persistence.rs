//! Persistence of the last-run marker.
//!
//! The marker is the only durable state the importer owns: a single timestamp recording when
//! the last scheduled run completed. It is stored as one RFC 3339 line in a plain-text file and
//! overwritten on every advance.

use crate::sync::types::ImportError;

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Repository for the last-run marker
#[async_trait::async_trait]
pub trait LastRunRepository: Send + Sync {
	/// Stored marker, `None` before the first completed run.
	async fn load(&self) -> Result<Option<DateTime<Utc>>, ImportError>;

	/// Overwrite the marker.
	async fn save(&self, completed_at: DateTime<Utc>) -> Result<(), ImportError>;
}

/// File-based implementation of LastRunRepository
pub struct FileLastRunRepository {
	path: PathBuf,
}

impl FileLastRunRepository {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[async_trait::async_trait]
impl LastRunRepository for FileLastRunRepository {
	async fn load(&self) -> Result<Option<DateTime<Utc>>, ImportError> {
		let content = match tokio::fs::read_to_string(&self.path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!("No last-run marker at {:?}", self.path);
				return Ok(None);
			}
			Err(e) => {
				return Err(ImportError::PersistenceError(format!(
					"Failed to read last-run marker {:?}: {}",
					self.path, e
				)));
			}
		};

		match DateTime::parse_from_rfc3339(content.trim()) {
			Ok(timestamp) => Ok(Some(timestamp.with_timezone(&Utc))),
			Err(e) => {
				// A corrupt marker only widens the next window.
				warn!(
					"Ignoring unreadable last-run marker {:?} ({:?}): {}",
					self.path,
					content.trim(),
					e
				);
				Ok(None)
			}
		}
	}

	async fn save(&self, completed_at: DateTime<Utc>) -> Result<(), ImportError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await.map_err(|e| {
				ImportError::PersistenceError(format!(
					"Failed to create marker directory {:?}: {}",
					parent, e
				))
			})?;
		}

		tokio::fs::write(&self.path, completed_at.to_rfc3339())
			.await
			.map_err(|e| {
				ImportError::PersistenceError(format!(
					"Failed to write last-run marker {:?}: {}",
					self.path, e
				))
			})?;

		info!("Saved last-run marker {} to {:?}", completed_at, self.path);
		Ok(())
	}
}

/// In-memory implementation of LastRunRepository
#[derive(Debug, Default)]
pub struct MemoryLastRunRepository {
	marker: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryLastRunRepository {
	pub fn new(marker: Option<DateTime<Utc>>) -> Self {
		Self {
			marker: Mutex::new(marker),
		}
	}

	pub fn current(&self) -> Option<DateTime<Utc>> {
		*self
			.marker
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

#[async_trait::async_trait]
impl LastRunRepository for MemoryLastRunRepository {
	async fn load(&self) -> Result<Option<DateTime<Utc>>, ImportError> {
		Ok(self.current())
	}

	async fn save(&self, completed_at: DateTime<Utc>) -> Result<(), ImportError> {
		*self
			.marker
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(completed_at);
		Ok(())
	}
}
