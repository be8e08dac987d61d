//! Configuration for expertmesh.
//!
//! Provides [`MeshConfig`], the explicit configuration struct handed to the
//! [`Orchestrator`](crate::orchestrator::Orchestrator), [`Environment`](crate::environment::Environment)
//! and [`Worker`](crate::worker::Worker) constructors, and [`ClientConfig`], which describes
//! which completion provider a worker talks to. Nothing here reads global state; hosts
//! build the structs by hand, from JSON, or from the environment.
//!
//! # Example
//!
//! ```rust
//! use expertmesh::MeshConfig;
//!
//! // Defaults mirror the reference behaviour (3 reactive rounds, mailbox of 1000, ...)
//! let config = MeshConfig::default();
//! assert_eq!(config.reactive.max_rounds, 3);
//!
//! // Or override a subset from JSON
//! let config = MeshConfig::from_json_str(r#"{ "reactive": { "max_rounds": 5 } }"#).unwrap();
//! assert_eq!(config.reactive.max_rounds, 5);
//! assert_eq!(config.bus.mailbox_capacity, 1000);
//! ```

use crate::expertmesh::error::ConfigError;
use crate::expertmesh::message::CauseBy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for one orchestrator and its workers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub bus: BusConfig,
    pub worker: WorkerConfig,
    pub assignment: AssignmentConfig,
    pub reactive: ReactiveConfig,
}

impl MeshConfig {
    /// Parse a (possibly partial) JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: MeshConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the bus or the reactive loop degenerate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.mailbox_capacity == 0 {
            return Err(ConfigError::Validation(
                "bus.mailbox_capacity must be positive".into(),
            ));
        }
        if self.bus.history_limit == 0 {
            return Err(ConfigError::Validation(
                "bus.history_limit must be positive".into(),
            ));
        }
        if self.worker.memory_limit == 0 {
            return Err(ConfigError::Validation(
                "worker.memory_limit must be positive".into(),
            ));
        }
        if self.reactive.max_rounds == 0 {
            return Err(ConfigError::Validation(
                "reactive.max_rounds must be positive".into(),
            ));
        }
        let roster = [
            &self.assignment.technical_worker,
            &self.assignment.practical_worker,
            &self.assignment.default_worker,
            &self.reactive.coordinator_id,
        ];
        if roster.iter().any(|id| id.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "worker and coordinator ids must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

/// Message bus limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Messages retained in bus history; the oldest is evicted first.
    pub history_limit: usize,
    /// Capacity of each worker mailbox; the oldest message is evicted when full.
    pub mailbox_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_limit: 10_000,
            mailbox_capacity: 1_000,
        }
    }
}

/// Per-worker actor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Processed messages remembered per worker.
    pub memory_limit: usize,
    /// Memory entries replayed as context when responding.
    pub context_window: usize,
    /// `cause_by` tags a worker accepts even when not addressed directly.
    pub watch: Vec<CauseBy>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            memory_limit: 100,
            context_window: 5,
            watch: vec![
                CauseBy::UserRequirement,
                CauseBy::AgentResponse,
                CauseBy::TaskAssignment,
            ],
        }
    }
}

/// Roster and heuristic thresholds for task assignment.
///
/// The keyword weight, margin and length threshold are tunable heuristics carried over for
/// behavioural compatibility, not invariants anything else relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Worker that takes technical-analysis subtasks.
    pub technical_worker: String,
    /// Worker that takes practical-advice subtasks.
    pub practical_worker: String,
    /// Worker used when no heuristic decides.
    pub default_worker: String,
    /// Score added per strong keyword hit in keyword-scored assignment.
    pub keyword_weight: u32,
    /// A bucket must beat the other by more than this to win outright.
    pub keyword_margin: u32,
    /// Requests longer than this many characters are treated as complex.
    pub complexity_length_threshold: usize,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            technical_worker: "analyst".to_string(),
            practical_worker: "advisor".to_string(),
            default_worker: "analyst".to_string(),
            keyword_weight: 2,
            keyword_margin: 1,
            complexity_length_threshold: 20,
        }
    }
}

/// Reactive-strategy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    /// Hard cap on observe/respond rounds.
    pub max_rounds: usize,
    /// Pause between rounds, in milliseconds.
    pub round_pause_ms: u64,
    /// Sender id stamped on the initial task broadcast.
    pub coordinator_id: String,
}

impl ReactiveConfig {
    pub fn round_pause(&self) -> Duration {
        Duration::from_millis(self.round_pause_ms)
    }
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            round_pause_ms: 200,
            coordinator_id: "coordinator".to_string(),
        }
    }
}

/// Completion providers a [`ClientConfig`] can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Gemini,
    Mock,
}

impl std::str::FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "gemini" => Ok(Provider::Gemini),
            "mock" => Ok(Provider::Mock),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Connection settings for one completion client.
///
/// ```rust
/// use expertmesh::config::{ClientConfig, Provider};
///
/// let config = ClientConfig::mock();
/// assert_eq!(config.provider, Provider::Mock);
/// assert!(config.api_key.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model: String,
    /// Overrides the provider's default endpoint (OpenAI-compatible servers).
    pub base_url: Option<String>,
    /// Per-call timeout in seconds, surfaced as [`CompletionError::Timeout`](crate::error::CompletionError::Timeout).
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::mock()
    }
}

impl ClientConfig {
    pub fn mock() -> Self {
        Self {
            provider: Provider::Mock,
            api_key: None,
            model: "mock-model".to_string(),
            base_url: None,
            timeout_secs: 60,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build a config from process environment variables.
    ///
    /// `EXPERTMESH_PROVIDER` selects the provider explicitly. Without it, `GOOGLE_API_KEY`
    /// selects Gemini, then `OPENAI_API_KEY` selects OpenAI, and otherwise the mock provider is
    /// used. `EXPERTMESH_MODEL`, `EXPERTMESH_BASE_URL` and `EXPERTMESH_TIMEOUT_SECS` override
    /// the remaining fields.
    pub fn from_env() -> Result<Self, ConfigError> {
        let google_key = std::env::var("GOOGLE_API_KEY").ok();
        let openai_key = std::env::var("OPENAI_API_KEY").ok();

        let provider = match std::env::var("EXPERTMESH_PROVIDER") {
            Ok(name) => name.parse::<Provider>()?,
            Err(_) if google_key.is_some() => Provider::Gemini,
            Err(_) if openai_key.is_some() => Provider::OpenAI,
            Err(_) => Provider::Mock,
        };

        let (api_key, default_model) = match provider {
            Provider::Gemini => (google_key, "gemini-1.5-flash-latest"),
            Provider::OpenAI => (openai_key, "gpt-4.1-mini"),
            Provider::Mock => (None, "mock-model"),
        };

        if provider != Provider::Mock && api_key.is_none() {
            return Err(ConfigError::Validation(format!(
                "no API key set for provider {:?}",
                provider
            )));
        }

        let timeout_secs = match std::env::var("EXPERTMESH_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::Validation(format!("EXPERTMESH_TIMEOUT_SECS: {}", e))
            })?,
            Err(_) => 60,
        };

        Ok(Self {
            provider,
            api_key,
            model: std::env::var("EXPERTMESH_MODEL").unwrap_or_else(|_| default_model.to_string()),
            base_url: std::env::var("EXPERTMESH_BASE_URL").ok(),
            timeout_secs,
        })
    }
}
