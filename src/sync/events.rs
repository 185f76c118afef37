//! Event system for import runs.
//!
//! This module defines the events emitted at each lifecycle point of an import run, the handler
//! trait consumers implement to receive them, and the dispatcher the orchestrator delivers them
//! through. Handlers replace ad-hoc callbacks: a host can log, forward results to its own
//! application, or queue them through a channel and consume them on its own schedule.
//!
//! Events are delivered in emission order and awaited inline, so a handler sees an account's
//! success event before the run's finish event.

use crate::sync::progress_tracker::RunSummary;
use crate::sync::types::ImportError;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Payload of a successful account import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSuccess {
    pub ledger_account_id: String,
    pub account_name: String,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub errors: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
}

/// Payload of a failed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub company_id: String,
    pub start_date: Option<DateTime<Utc>>,
    /// Top-level error message.
    pub error: String,
    /// Every underlying cause, one per failed attempt when retries ran out.
    pub causes: Vec<String>,
}

impl ImportFailure {
    pub fn from_error(
        company_id: &str,
        start_date: Option<DateTime<Utc>>,
        error: &ImportError,
    ) -> Self {
        Self {
            company_id: company_id.to_string(),
            start_date,
            error: error.to_string(),
            causes: error.causes(),
        }
    }
}

/// Start date planned for one source of a scheduled run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedWindow {
    pub company_id: String,
    pub start_date: DateTime<Utc>,
}

/// Events that occur during an import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportEvent {
    /// An account's transactions were imported without in-band errors
    ImportSucceeded(ImportSuccess),
    /// A source failed; the run moves on to the next one
    ImportFailed(ImportFailure),
    /// Every source was processed, whatever the outcome
    ImportFinished { summary: RunSummary },
    /// A scheduled run is starting with these windows
    CronStarted { windows: Vec<PlannedWindow> },
    /// A scheduled run is done
    CronFinished {
        summary: RunSummary,
        marker_advanced: bool,
    },
}

impl ImportEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ImportEvent::ImportSucceeded(_) => "import_succeeded",
            ImportEvent::ImportFailed(_) => "import_failed",
            ImportEvent::ImportFinished { .. } => "import_finished",
            ImportEvent::CronStarted { .. } => "cron_started",
            ImportEvent::CronFinished { .. } => "cron_finished",
        }
    }
}

/// Trait for handling import events.
///
/// Implementors receive every event of every run and can perform side effects.
#[async_trait::async_trait]
pub trait ImportEventHandler: Send + Sync {
    /// Handle an import event.
    async fn handle(&mut self, event: &ImportEvent) -> Result<(), ImportError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order for each event.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn ImportEventHandler>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new event handler.
    pub fn register_handler(&mut self, handler: Box<dyn ImportEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from running or the run
    /// from continuing.
    pub async fn dispatch(&mut self, event: &ImportEvent) {
        debug!("Dispatching {} event", event.kind());
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event).await {
                error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }
}

/// Forwards every event into an unbounded channel.
pub struct ChannelEventHandler {
    sender: mpsc::UnboundedSender<ImportEvent>,
}

impl ChannelEventHandler {
    /// Create the handler together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ImportEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl ImportEventHandler for ChannelEventHandler {
    async fn handle(&mut self, event: &ImportEvent) -> Result<(), ImportError> {
        // A dropped receiver only means nobody is listening any more.
        if self.sender.send(event.clone()).is_err() {
            debug!("Event channel closed, dropping {} event", event.kind());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ChannelEventHandler"
    }
}

/// Adapts a closure into an event handler.
pub struct CallbackEventHandler<F> {
    name: &'static str,
    callback: F,
}

impl<F> CallbackEventHandler<F>
where
    F: FnMut(&ImportEvent) + Send + Sync,
{
    pub fn new(name: &'static str, callback: F) -> Self {
        Self { name, callback }
    }
}

#[async_trait::async_trait]
impl<F> ImportEventHandler for CallbackEventHandler<F>
where
    F: FnMut(&ImportEvent) + Send + Sync,
{
    async fn handle(&mut self, event: &ImportEvent) -> Result<(), ImportError> {
        (self.callback)(event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
