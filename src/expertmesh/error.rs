//! Error types shared across the coordination layer.
//!
//! Every subsystem owns an enum; [`OrchestrationError`] is the single terminal error a caller
//! of [`Orchestrator::process_request`](crate::orchestrator::Orchestrator::process_request)
//! can receive. [`RoutingWarning`] is not an error: the bus logs it and keeps going.

use std::time::Duration;
use thiserror::Error;

// ─── Completion service ──────────────────────────────────────────────────────

/// Failure of the external completion service.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("provider {provider} returned an empty response")]
    EmptyResponse { provider: String },

    #[error("completion service unavailable: {0}")]
    Unavailable(String),
}

// ─── Knowledge retrieval ─────────────────────────────────────────────────────

/// Transport failure of the retrieval service. "No results" is never an error.
#[derive(Debug, Clone, Error)]
#[error("context retrieval failed: {0}")]
pub struct RetrievalError(pub String);

// ─── Task assignment ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("request text is empty")]
    EmptyRequest,

    #[error("task breakdown has no subtasks")]
    NoSubtasks,

    #[error("subtask #{index} is invalid: {reason}")]
    InvalidSubtask { index: usize, reason: String },
}

/// Why an analyzer reply could not be turned into a structured analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisParseError {
    #[error("no JSON object found in analyzer output")]
    NoJsonObject,

    #[error("analyzer output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("analyzer output is missing field `{0}`")]
    MissingField(&'static str),
}

/// Failure of [`Coordinator::analyze`](crate::coordinator::Coordinator::analyze). Either way
/// the caller falls back to local assignment.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Parse(#[from] AnalysisParseError),
}

// ─── Workers and registry ────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("worker {0} has no news to respond to")]
    NoNews(String),

    #[error("worker {worker_id} completion failed: {source}")]
    Completion {
        worker_id: String,
        #[source]
        source: CompletionError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("worker with id '{0}' is already registered")]
    DuplicateWorker(String),
}

// ─── Orchestration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum OrchestrationError {
    #[error("assignment: {0}")]
    Assignment(#[from] AssignmentError),

    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    #[error("worker: {0}")]
    Worker(#[from] WorkerError),

    #[error("no workers registered")]
    NoWorkers,
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
}

// ─── Routing ─────────────────────────────────────────────────────────────────

/// Non-fatal routing outcome. Logged at `warn` by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingWarning {
    #[error("no registered worker '{recipient}' for message {message_id}")]
    UnknownRecipient {
        message_id: String,
        recipient: String,
    },

    #[error("message {message_id} reached no recipient")]
    Undelivered { message_id: String },
}
