//! Collaboration orchestrator.
//!
//! The [`Orchestrator`] owns the [`Environment`] (and through it every worker), plans a
//! request with the [`TaskAssigner`], executes the plan under one [`CollaborationMode`] and
//! hands the results to the [`Aggregator`].
//!
//! # Collaboration Modes
//!
//! | Mode | Execution | Failure handling |
//! |------|-----------|------------------|
//! | **Sequential** | Subtasks in priority order, one completion at a time | First failure aborts the run |
//! | **Concurrent** | Every subtask in flight at once, polled together | Any failure aborts; no partial results |
//! | **Reactive** | One broadcast on the bus, then observe/react rounds | Failures recorded per worker per round |
//!
//! # Example
//!
//! ```rust,no_run
//! use expertmesh::clients::mock::MockClient;
//! use expertmesh::orchestrator::{CollaborationMode, Orchestrator};
//! use expertmesh::MeshConfig;
//! use std::sync::Arc;
//!
//! # async {
//! let mut orchestrator = Orchestrator::new(MeshConfig::default())
//!     .with_default_roster(Arc::new(MockClient::new()))
//!     .unwrap();
//!
//! let result = orchestrator
//!     .process_request("How do I keep a sourdough starter alive?", &[], CollaborationMode::Concurrent)
//!     .await
//!     .unwrap();
//! println!("{}\n({})", result.response, result.collaboration_summary);
//! # };
//! ```

use crate::expertmesh::aggregator::Aggregator;
use crate::expertmesh::assignment::{CoordinationAnalysis, Subtask, TaskAssigner, TaskBreakdown};
use crate::expertmesh::client_wrapper::{ClientWrapper, Message, Role};
use crate::expertmesh::config::MeshConfig;
use crate::expertmesh::coordinator::{Coordinator, FinalSummary, RosterEntry};
use crate::expertmesh::environment::Environment;
use crate::expertmesh::error::{AssignmentError, OrchestrationError, RegistryError, WorkerError};
use crate::expertmesh::event::{EventHandler, OrchestrationEvent};
use crate::expertmesh::message::{AgentMessage, CauseBy, Recipients};
use crate::expertmesh::worker::{TaskOutput, Worker};
use chrono::Utc;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metadata key on the reactive kickoff message listing the planned subtasks.
pub const META_PLAN: &str = "plan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollaborationMode {
    Sequential,
    Concurrent,
    Reactive,
}

impl fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollaborationMode::Sequential => "Sequential",
            CollaborationMode::Concurrent => "Concurrent",
            CollaborationMode::Reactive => "Reactive",
        };
        f.write_str(name)
    }
}

/// Output of one subtask (or, in reactive mode, one worker reply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskResult {
    pub subtask_id: String,
    pub worker_id: String,
    pub result: String,
    pub tokens: usize,
    pub processing_time: Duration,
}

/// One respond cycle on the bus during a reactive run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInteraction {
    pub from: String,
    pub to: String,
    /// Id of the published reply; `None` when the cycle failed.
    pub message_id: Option<String>,
    pub round: usize,
    pub latency: Duration,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollaborationResult {
    pub task_id: String,
    /// Final merged text.
    pub response: String,
    /// Unique worker ids in first-contribution order.
    pub participating_workers: Vec<String>,
    pub total_tokens: usize,
    /// Sum of subtask times for sequential and concurrent runs; wall-clock for reactive.
    pub processing_time: Duration,
    pub summary: Option<FinalSummary>,
    pub subtask_results: Vec<SubtaskResult>,
    pub breakdown: TaskBreakdown,
    pub mode: CollaborationMode,
    /// Rounds executed. Always 1 outside reactive mode.
    pub rounds_completed: usize,
    /// Messages published during a reactive run, oldest first. Empty otherwise.
    pub message_history: Vec<AgentMessage>,
    pub interactions: Vec<AgentInteraction>,
    pub collaboration_summary: String,
}

/// Raw outcome of one strategy before aggregation.
struct Execution {
    results: Vec<SubtaskResult>,
    rounds: usize,
    interactions: Vec<AgentInteraction>,
    message_history: Vec<AgentMessage>,
    wall_clock: Duration,
}

pub struct Orchestrator {
    env: Environment,
    assigner: TaskAssigner,
    coordinator: Option<Coordinator>,
    aggregator: Aggregator,
    config: MeshConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Orchestrator {
    pub fn new(config: MeshConfig) -> Self {
        Self {
            env: Environment::new(config.bus.clone()),
            assigner: TaskAssigner::new(config.assignment.clone()),
            coordinator: None,
            aggregator: Aggregator::new(&config.assignment),
            config,
            event_handler: None,
        }
    }

    /// Plan requests with an AI analyzer and merge multi-worker results with its summary.
    pub fn with_coordinator(mut self, coordinator: Coordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Register the analyst and advisor presets under the configured technical and practical
    /// worker ids.
    pub fn with_default_roster(
        mut self,
        client: Arc<dyn ClientWrapper>,
    ) -> Result<Self, RegistryError> {
        let analyst = Worker::analyst(self.config.assignment.technical_worker.clone(), client.clone())
            .with_config(&self.config.worker);
        let advisor = Worker::advisor(self.config.assignment.practical_worker.clone(), client)
            .with_config(&self.config.worker);
        self.register_worker(analyst)?;
        self.register_worker(advisor)?;
        Ok(self)
    }

    /// Attach an event handler. It is propagated to every registered worker and to workers
    /// registered later.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        for worker in self.env.workers_mut() {
            worker.set_event_handler(Arc::clone(&handler));
        }
        self.event_handler = Some(handler);
        self
    }

    async fn emit(&self, event: OrchestrationEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_orchestration_event(&event).await;
        }
    }

    pub fn register_worker(&mut self, mut worker: Worker) -> Result<(), RegistryError> {
        if let Some(handler) = &self.event_handler {
            worker.set_event_handler(Arc::clone(handler));
        }
        let (id, name) = (worker.id.clone(), worker.name.clone());
        self.env.register(worker)?;
        self.aggregator.set_display_name(id, name);
        Ok(())
    }

    pub fn unregister_worker(&mut self, id: &str) -> Option<Worker> {
        self.env.unregister(id)
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    fn roster(&self) -> Vec<RosterEntry> {
        self.env
            .workers()
            .map(|w| RosterEntry {
                id: w.id.clone(),
                description: w.describe(),
            })
            .collect()
    }

    /// Plan and run `request`.
    ///
    /// With a coordinator attached, its analysis drives assignment; if the analyzer call or
    /// its output fails, planning falls back to the local classifier.
    pub async fn process_request(
        &mut self,
        request: &str,
        history: &[Message],
        mode: CollaborationMode,
    ) -> Result<CollaborationResult, OrchestrationError> {
        if request.trim().is_empty() {
            return Err(AssignmentError::EmptyRequest.into());
        }
        if self.env.is_empty() {
            return Err(OrchestrationError::NoWorkers);
        }

        let analysis = match &self.coordinator {
            Some(coordinator) => match coordinator.analyze(request, history, &self.roster()).await {
                Ok(analysis) => Some(analysis),
                Err(err) => {
                    log::warn!("analysis failed, using local assignment: {}", err);
                    None
                }
            },
            None => None,
        };

        self.process_request_with_analysis(request, history, analysis.as_ref(), mode)
            .await
    }

    /// Run `request` with a caller-supplied analysis (or none, for the local classifier).
    pub async fn process_request_with_analysis(
        &mut self,
        request: &str,
        history: &[Message],
        analysis: Option<&CoordinationAnalysis>,
        mode: CollaborationMode,
    ) -> Result<CollaborationResult, OrchestrationError> {
        if self.env.is_empty() {
            return Err(OrchestrationError::NoWorkers);
        }
        let mut breakdown = self.assigner.assign(request, analysis)?;
        let run_id = breakdown.task_id.clone();

        self.emit(OrchestrationEvent::RunStarted {
            run_id: run_id.clone(),
            mode: mode.to_string(),
            worker_count: self.env.len(),
        })
        .await;
        self.emit(OrchestrationEvent::BreakdownPlanned {
            run_id: run_id.clone(),
            strategy: breakdown.strategy.to_string(),
            subtask_count: breakdown.subtasks.len(),
        })
        .await;
        log::info!(
            "run {} starting in {} mode with {} worker(s)",
            run_id,
            mode,
            self.env.len()
        );

        let execution = match mode {
            CollaborationMode::Sequential => self.run_sequential(&breakdown, history).await?,
            CollaborationMode::Concurrent => self.run_concurrent(&breakdown, history).await?,
            CollaborationMode::Reactive => self.run_reactive(&breakdown).await,
        };
        record_results(&mut breakdown.subtasks, &execution.results);

        let summary = self
            .summarize(&run_id, request, &execution.results, history)
            .await;
        let response =
            self.aggregator
                .aggregate(request, &execution.results, &breakdown, summary.as_ref());

        let mut participating_workers: Vec<String> = Vec::new();
        for result in &execution.results {
            if !participating_workers.contains(&result.worker_id) {
                participating_workers.push(result.worker_id.clone());
            }
        }
        let total_tokens = execution.results.iter().map(|r| r.tokens).sum();
        let processing_time = match mode {
            CollaborationMode::Reactive => execution.wall_clock,
            _ => execution.results.iter().map(|r| r.processing_time).sum(),
        };

        self.emit(OrchestrationEvent::RunCompleted {
            run_id: run_id.clone(),
            rounds: execution.rounds,
            total_tokens,
            is_complete: !execution.results.is_empty(),
        })
        .await;
        log::info!(
            "run {} finished: {} result(s), {} tokens, {:?}",
            run_id,
            execution.results.len(),
            total_tokens,
            processing_time
        );

        Ok(CollaborationResult {
            task_id: run_id,
            response,
            participating_workers,
            total_tokens,
            processing_time,
            summary,
            collaboration_summary: self.aggregator.collaboration_summary(&execution.results),
            subtask_results: execution.results,
            breakdown,
            mode,
            rounds_completed: execution.rounds,
            message_history: execution.message_history,
            interactions: execution.interactions,
        })
    }

    /// Coordinator summary for multi-result runs. `None` means the heuristic merge applies.
    async fn summarize(
        &self,
        run_id: &str,
        request: &str,
        results: &[SubtaskResult],
        history: &[Message],
    ) -> Option<FinalSummary> {
        let coordinator = self.coordinator.as_ref()?;
        if results.len() < 2 {
            return None;
        }
        match coordinator.summarize(request, results, history).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                log::warn!("summary failed, falling back to heuristic merge: {}", err);
                self.emit(OrchestrationEvent::SummaryFallback {
                    run_id: run_id.to_string(),
                    error: err.to_string(),
                })
                .await;
                None
            }
        }
    }

    fn resolve<'a>(&'a self, subtask: &Subtask) -> Result<&'a Worker, OrchestrationError> {
        self.env
            .worker(&subtask.assigned_worker)
            .ok_or_else(|| OrchestrationError::WorkerNotFound(subtask.assigned_worker.clone()))
    }

    async fn report_failure(&self, run_id: &str, worker_id: &str, err: &WorkerError) {
        log::error!("run {}: worker {} failed: {}", run_id, worker_id, err);
        self.emit(OrchestrationEvent::WorkerFailed {
            run_id: run_id.to_string(),
            worker_id: worker_id.to_string(),
            error: err.to_string(),
        })
        .await;
    }

    async fn report_success(&self, run_id: &str, worker: &Worker, output: &TaskOutput) {
        self.emit(OrchestrationEvent::WorkerResponded {
            run_id: run_id.to_string(),
            worker_id: worker.id.clone(),
            worker_name: worker.name.clone(),
            tokens_used: output.tokens(),
            response_length: output.content.len(),
        })
        .await;
    }

    async fn run_sequential(
        &self,
        breakdown: &TaskBreakdown,
        history: &[Message],
    ) -> Result<Execution, OrchestrationError> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(breakdown.subtasks.len());

        for subtask in breakdown.by_priority() {
            let worker = self.resolve(subtask)?;
            log::debug!("{} processing: {}", worker.name, subtask.description);
            let output = match worker.process_task(&subtask.description, history).await {
                Ok(output) => output,
                Err(err) => {
                    self.report_failure(&breakdown.task_id, &worker.id, &err)
                        .await;
                    return Err(err.into());
                }
            };
            self.report_success(&breakdown.task_id, worker, &output)
                .await;
            results.push(to_result(subtask, output));
        }

        Ok(Execution {
            results,
            rounds: 1,
            interactions: Vec::new(),
            message_history: Vec::new(),
            wall_clock: started.elapsed(),
        })
    }

    async fn run_concurrent(
        &self,
        breakdown: &TaskBreakdown,
        history: &[Message],
    ) -> Result<Execution, OrchestrationError> {
        let started = Instant::now();
        let planned = breakdown
            .by_priority()
            .into_iter()
            .map(|subtask| self.resolve(subtask).map(|worker| (subtask, worker)))
            .collect::<Result<Vec<_>, _>>()?;

        let outputs = try_join_all(planned.iter().map(|(subtask, worker)| async move {
            worker.process_task(&subtask.description, history).await
        }))
        .await;

        let outputs = match outputs {
            Ok(outputs) => outputs,
            Err(err) => {
                let worker_id = match &err {
                    WorkerError::Completion { worker_id, .. } | WorkerError::NoNews(worker_id) => {
                        worker_id.clone()
                    }
                };
                self.report_failure(&breakdown.task_id, &worker_id, &err)
                    .await;
                return Err(err.into());
            }
        };

        let mut results = Vec::with_capacity(outputs.len());
        for ((subtask, worker), output) in planned.into_iter().zip(outputs) {
            self.report_success(&breakdown.task_id, worker, &output)
                .await;
            results.push(to_result(subtask, output));
        }

        Ok(Execution {
            results,
            rounds: 1,
            interactions: Vec::new(),
            message_history: Vec::new(),
            wall_clock: started.elapsed(),
        })
    }

    async fn run_reactive(&mut self, breakdown: &TaskBreakdown) -> Execution {
        let run_id = breakdown.task_id.clone();
        let coordinator_id = self.config.reactive.coordinator_id.clone();
        let max_rounds = self.config.reactive.max_rounds;
        let pause = self.config.reactive.round_pause();
        let started = Instant::now();
        let started_at = Utc::now();

        let mut results = Vec::new();
        let mut interactions = Vec::new();

        for subtask in &breakdown.subtasks {
            if !self.env.contains(&subtask.assigned_worker) {
                log::warn!(
                    "run {}: subtask {} assigned to unregistered worker {}",
                    run_id,
                    subtask.id,
                    subtask.assigned_worker
                );
                interactions.push(AgentInteraction {
                    from: coordinator_id.clone(),
                    to: subtask.assigned_worker.clone(),
                    message_id: None,
                    round: 0,
                    latency: Duration::ZERO,
                    success: false,
                    error: Some(
                        OrchestrationError::WorkerNotFound(subtask.assigned_worker.clone())
                            .to_string(),
                    ),
                });
            }
        }

        let plan: Vec<String> = breakdown
            .by_priority()
            .iter()
            .map(|s| format!("{}: {}", s.assigned_worker, s.description))
            .collect();
        let kickoff = AgentMessage::new(
            breakdown.request.clone(),
            Role::User,
            CauseBy::TaskAssignment,
            Recipients::broadcast(),
        )
        .with_metadata(META_PLAN, plan);
        self.publish(&run_id, &coordinator_id, kickoff).await;

        let mut rounds = 0;
        for round in 1..=max_rounds {
            if round > 1 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            rounds = round;
            self.emit(OrchestrationEvent::RoundStarted {
                run_id: run_id.clone(),
                round,
            })
            .await;

            let mut responses = 0;
            let ids = self.env.worker_ids().to_vec();
            for id in ids {
                let Some(worker) = self.env.worker_mut(&id) else {
                    continue;
                };
                if worker.observe() == 0 {
                    continue;
                }
                let to = worker
                    .select_primary_message()
                    .map(|m| m.sent_from.clone())
                    .unwrap_or_default();
                let name = worker.name.clone();
                let cycle = Instant::now();

                let outcome = worker.react().await;
                match outcome {
                    Ok(reply) => {
                        let latency = cycle.elapsed();
                        let (reply_id, content, tokens) =
                            (reply.id.clone(), reply.content.clone(), reply.tokens());
                        self.publish(&run_id, &id, reply).await;
                        self.emit(OrchestrationEvent::WorkerResponded {
                            run_id: run_id.clone(),
                            worker_id: id.clone(),
                            worker_name: name,
                            tokens_used: tokens,
                            response_length: content.len(),
                        })
                        .await;

                        results.push(SubtaskResult {
                            subtask_id: format!("{}-round{}", id, round),
                            worker_id: id.clone(),
                            result: content,
                            tokens,
                            processing_time: latency,
                        });
                        interactions.push(AgentInteraction {
                            from: id,
                            to,
                            message_id: Some(reply_id),
                            round,
                            latency,
                            success: true,
                            error: None,
                        });
                        responses += 1;
                    }
                    Err(err) => {
                        let latency = cycle.elapsed();
                        self.report_failure(&run_id, &id, &err).await;
                        interactions.push(AgentInteraction {
                            from: id,
                            to,
                            message_id: None,
                            round,
                            latency,
                            success: false,
                            error: Some(err.to_string()),
                        });
                    }
                }
            }

            self.emit(OrchestrationEvent::RoundCompleted {
                run_id: run_id.clone(),
                round,
                responses,
            })
            .await;
            if responses == 0 {
                log::info!("run {} converged after round {}", run_id, round);
                self.emit(OrchestrationEvent::Converged {
                    run_id: run_id.clone(),
                    round,
                })
                .await;
                break;
            }
        }

        let message_history = self
            .env
            .history(None)
            .into_iter()
            .filter(|m| m.timestamp >= started_at)
            .cloned()
            .collect();

        Execution {
            results,
            rounds,
            interactions,
            message_history,
            wall_clock: started.elapsed(),
        }
    }

    async fn publish(&mut self, run_id: &str, sender: &str, message: AgentMessage) {
        let report = self.env.publish_with_report(sender, message);
        self.emit(OrchestrationEvent::MessagePublished {
            run_id: run_id.to_string(),
            message_id: report.message_id.clone(),
            sender: sender.to_string(),
            delivered: report.delivered(),
        })
        .await;
    }
}

fn to_result(subtask: &Subtask, output: TaskOutput) -> SubtaskResult {
    SubtaskResult {
        subtask_id: subtask.id.clone(),
        worker_id: subtask.assigned_worker.clone(),
        tokens: output.tokens(),
        processing_time: output.elapsed,
        result: output.content,
    }
}

/// Mark planned subtasks done. Reactive replies carry per-round ids, so a subtask without an
/// exact id match takes the first reply from its assigned worker.
fn record_results(subtasks: &mut [Subtask], results: &[SubtaskResult]) {
    for subtask in subtasks {
        let matched = results
            .iter()
            .find(|r| r.subtask_id == subtask.id)
            .or_else(|| results.iter().find(|r| r.worker_id == subtask.assigned_worker));
        if let Some(result) = matched {
            subtask.completed = true;
            subtask.result = Some(result.result.clone());
        }
    }
}
