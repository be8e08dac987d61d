//! Worker and orchestration event system.
//!
//! Provides a callback-based observability layer for workers and orchestrator runs.
//! Implement [`EventHandler`] to receive real-time notifications about:
//!
//! - **Completion round-trips**: when each worker sends a task to its model and gets text back
//! - **Retrieval**: context lookups that failed and were skipped
//! - **Run lifecycle**: start/end, the breakdown that was planned, round boundaries
//! - **Bus traffic**: messages published during reactive collaboration
//!
//! # Architecture
//!
//! Events flow through a single [`EventHandler`] trait with two methods:
//! - [`on_worker_event`](EventHandler::on_worker_event) receives [`WorkerEvent`]s from individual workers
//! - [`on_orchestration_event`](EventHandler::on_orchestration_event) receives [`OrchestrationEvent`]s from the orchestrator
//!
//! Both methods have default no-op implementations. The handler is wrapped in
//! `Arc<dyn EventHandler>`; registering it on an
//! [`Orchestrator`](crate::orchestrator::Orchestrator) via
//! [`with_event_handler`](crate::orchestrator::Orchestrator::with_event_handler) propagates it
//! to every worker the orchestrator registers.
//!
//! # Example
//!
//! ```rust,no_run
//! use expertmesh::event::{EventHandler, OrchestrationEvent, WorkerEvent};
//! use async_trait::async_trait;
//!
//! struct Progress;
//!
//! #[async_trait]
//! impl EventHandler for Progress {
//!     async fn on_worker_event(&self, event: &WorkerEvent) {
//!         if let WorkerEvent::TaskCompleted { worker_name, response_length, .. } = event {
//!             println!("{} answered ({} chars)", worker_name, response_length);
//!         }
//!     }
//!     async fn on_orchestration_event(&self, event: &OrchestrationEvent) {
//!         println!("run: {:?}", event);
//!     }
//! }
//! ```

use crate::expertmesh::client_wrapper::TokenUsage;
use async_trait::async_trait;

/// Events emitted by a [`Worker`](crate::worker::Worker) while it processes a task.
///
/// ```text
/// TaskStarted
///   └─ (retriever attached and failing) RetrievalFailed
///   └─ TaskCompleted | TaskFailed
/// ```
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A task was handed to the worker's completion client.
    TaskStarted {
        worker_id: String,
        worker_name: String,
        /// First ~120 characters of the task text.
        task_preview: String,
    },

    /// The completion client answered.
    TaskCompleted {
        worker_id: String,
        worker_name: String,
        /// Usage reported by the provider, or `None` if it reported nothing.
        tokens_used: Option<TokenUsage>,
        response_length: usize,
        elapsed_ms: u64,
    },

    /// The completion client failed. The error propagates to the caller unchanged.
    TaskFailed {
        worker_id: String,
        worker_name: String,
        error: String,
    },

    /// Context retrieval failed; the task continues without extra context.
    RetrievalFailed {
        worker_id: String,
        error: String,
    },
}

/// Events emitted by the [`Orchestrator`](crate::orchestrator::Orchestrator).
///
/// # Event Flow (reactive mode)
///
/// ```text
/// RunStarted
/// BreakdownPlanned
/// MessagePublished (initial task broadcast)
///   └─ RoundStarted { round: 1 }
///       ├─ WorkerResponded / WorkerFailed (per worker with news)
///       └─ MessagePublished (per reply)
///   └─ RoundCompleted { round: 1, responses }
///   ...
///   └─ Converged (first round with zero responses)
/// SummaryFallback (only if the coordinator summary failed)
/// RunCompleted
/// ```
///
/// Sequential and concurrent runs emit the same events minus rounds and bus traffic.
#[derive(Debug, Clone)]
pub enum OrchestrationEvent {
    RunStarted {
        /// Task id of the breakdown being executed.
        run_id: String,
        /// `"Sequential"`, `"Concurrent"` or `"Reactive"`.
        mode: String,
        worker_count: usize,
    },

    /// Task assignment produced a validated breakdown.
    BreakdownPlanned {
        run_id: String,
        /// Which assignment path produced it (`"AiProvided"`, `"KeywordScored"`, `"LocalFallback"`).
        strategy: String,
        subtask_count: usize,
    },

    RoundStarted {
        run_id: String,
        /// 1-based round number.
        round: usize,
    },

    RoundCompleted {
        run_id: String,
        round: usize,
        /// Successful responses produced in this round.
        responses: usize,
    },

    WorkerResponded {
        run_id: String,
        worker_id: String,
        worker_name: String,
        tokens_used: usize,
        response_length: usize,
    },

    /// A worker failed. Fatal for sequential and concurrent runs; recorded and skipped in
    /// reactive rounds.
    WorkerFailed {
        run_id: String,
        worker_id: String,
        error: String,
    },

    MessagePublished {
        run_id: String,
        message_id: String,
        sender: String,
        /// Whether any mailbox accepted the message.
        delivered: bool,
    },

    /// A reactive round produced no output, ending the loop before the round cap.
    Converged {
        run_id: String,
        round: usize,
    },

    /// The coordinator summary could not be produced; the heuristic merge was used instead.
    SummaryFallback {
        run_id: String,
        error: String,
    },

    RunCompleted {
        run_id: String,
        /// Rounds executed (always 1 for sequential and concurrent runs).
        rounds: usize,
        total_tokens: usize,
        is_complete: bool,
    },
}

/// Trait for receiving worker and orchestration events.
///
/// Both methods have **default no-op implementations**, so only override the events you care
/// about. The `Send + Sync` bound allows the handler to be shared as `Arc<dyn EventHandler>`.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called when a worker emits an event.
    async fn on_worker_event(&self, _event: &WorkerEvent) {}

    /// Called when the orchestrator emits an event.
    async fn on_orchestration_event(&self, _event: &OrchestrationEvent) {}
}
