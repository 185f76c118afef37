//! Import pipeline services.
//!
//! The orchestrator wires the retry executor, account reconciler, transaction mapper and window
//! planner into runs, reporting through the event system and persisting the last-run marker.

pub mod cleanup;
pub mod events;
pub mod orchestrator;
pub mod progress_tracker;
pub mod reconciler;
pub mod retry;
pub mod state_persistence;
pub mod transaction_mapper;
pub mod types;
pub mod window;

pub use cleanup::{Confirmation, StaticConfirmation, StdinConfirmation};
pub use events::{
	CallbackEventHandler, ChannelEventHandler, EventDispatcher, ImportEvent, ImportEventHandler,
	ImportFailure, ImportSuccess, PlannedWindow,
};
pub use orchestrator::{BrowserProvisioner, CleanupReport, ImportOrchestrator};
pub use progress_tracker::{ImportProgressTracker, RunSummary, SourceOutcome};
pub use reconciler::{
	AccountDirectory, AccountReconciler, NoteAccountDirectory, ResolvedAccount, account_marker,
};
pub use retry::{RetryExecutor, RetryPolicy, RetrySetting};
pub use state_persistence::{FileLastRunRepository, LastRunRepository, MemoryLastRunRepository};
pub use transaction_mapper::TransactionMapper;
pub use types::{ImportError, LifecycleState};
pub use window::{CronPreset, DEFAULT_SAFETY_MARGIN_DAYS, SyncWindowPlanner, plan_window};
