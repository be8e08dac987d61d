//! # expertmesh
//!
//! expertmesh coordinates a small team of "expert" workers that jointly answer one request. A
//! coordinator splits the request into subtasks, each subtask goes to the worker best suited
//! for it, and the workers' outputs are merged into a single response.
//!
//! The crate provides layered building blocks:
//!
//! * **Message bus**: [`Environment`] owns the workers, routes [`message::AgentMessage`]s into
//!   their bounded [`mailbox::Mailbox`]es and keeps a bounded history.
//! * **Worker actors**: [`Worker`] follows an observe / filter / react protocol on the bus, or
//!   answers a task directly with [`Worker::process_task`].
//! * **Task assignment**: [`assignment::TaskAssigner`] turns a request (and an optional
//!   [`coordinator::Coordinator`] analysis) into a validated [`assignment::TaskBreakdown`].
//! * **Orchestration**: [`orchestrator::Orchestrator`] runs a breakdown sequentially,
//!   concurrently, or reactively over the bus.
//! * **Aggregation**: [`aggregator::Aggregator`] merges the results into the final text.
//! * **Provider flexibility**: [`ClientWrapper`] is implemented for OpenAI, Gemini (through its
//!   OpenAI-compatible endpoint) and an offline [`clients::mock::MockClient`].
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use expertmesh::clients::build_client;
//! use expertmesh::config::ClientConfig;
//! use expertmesh::orchestrator::{CollaborationMode, Orchestrator};
//! use expertmesh::coordinator::Coordinator;
//! use expertmesh::MeshConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     expertmesh::init_logger();
//!
//!     let client = build_client(&ClientConfig::from_env()?)?;
//!     let mut orchestrator = Orchestrator::new(MeshConfig::default())
//!         .with_coordinator(Coordinator::new(client.clone()))
//!         .with_default_roster(client)?;
//!
//!     let result = orchestrator
//!         .process_request("Why does sourdough rise, and how do I keep a starter alive?", &[], CollaborationMode::Reactive)
//!         .await?;
//!
//!     println!("{}", result.response);
//!     println!("{} ({} tokens)", result.collaboration_summary, result.total_tokens);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Hosts opt in to `RUST_LOG` driven diagnostics; the library itself never installs a logger.
///
/// ```rust
/// expertmesh::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `expertmesh` module.
pub mod expertmesh;

// Re-exporting key items for easier external access.
pub use expertmesh::aggregator;
pub use expertmesh::assignment;
pub use expertmesh::client_wrapper;
pub use expertmesh::client_wrapper::{ClientWrapper, Completion, Message, Role, TokenUsage};
pub use expertmesh::clients;
pub use expertmesh::config;
pub use expertmesh::config::MeshConfig;
pub use expertmesh::coordinator;
pub use expertmesh::environment;
pub use expertmesh::error;
pub use expertmesh::event;
pub use expertmesh::event::{EventHandler, OrchestrationEvent, WorkerEvent};
pub use expertmesh::mailbox;
pub use expertmesh::message;
pub use expertmesh::orchestrator;
pub use expertmesh::orchestrator::{CollaborationMode, CollaborationResult, Orchestrator};
pub use expertmesh::retrieval;
pub use expertmesh::worker;
pub use expertmesh::{Environment, Worker};
