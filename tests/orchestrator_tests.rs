use async_trait::async_trait;
use expertmesh::client_wrapper::{ClientWrapper, Completion, Message, Role, TokenUsage};
use expertmesh::clients::mock::MockClient;
use expertmesh::coordinator::Coordinator;
use expertmesh::error::{CompletionError, OrchestrationError};
use expertmesh::event::{EventHandler, OrchestrationEvent, WorkerEvent};
use expertmesh::message::CauseBy;
use expertmesh::orchestrator::{CollaborationMode, Orchestrator};
use expertmesh::{MeshConfig, Worker};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies with a fixed text and reports fixed usage.
struct FixedClient {
    reply: String,
    fail: bool,
}

#[async_trait]
impl ClientWrapper for FixedClient {
    async fn send_message(&self, _messages: &[Message]) -> Result<Completion, CompletionError> {
        if self.fail {
            return Err(CompletionError::Unavailable("provider offline".into()));
        }
        Ok(Completion {
            content: self.reply.clone(),
            usage: Some(TokenUsage {
                input_tokens: 7,
                output_tokens: 3,
                total_tokens: 10,
            }),
        })
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

fn fixed(reply: &str) -> Arc<FixedClient> {
    Arc::new(FixedClient {
        reply: reply.to_string(),
        fail: false,
    })
}

fn broken() -> Arc<FixedClient> {
    Arc::new(FixedClient {
        reply: String::new(),
        fail: true,
    })
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_worker_event(&self, event: &WorkerEvent) {
        if let WorkerEvent::TaskCompleted { worker_id, .. } = event {
            self.events.lock().unwrap().push(format!("completed:{}", worker_id));
        }
    }

    async fn on_orchestration_event(&self, event: &OrchestrationEvent) {
        let label = match event {
            OrchestrationEvent::RunStarted { mode, .. } => format!("run:{}", mode),
            OrchestrationEvent::BreakdownPlanned { strategy, .. } => format!("plan:{}", strategy),
            OrchestrationEvent::RoundStarted { round, .. } => format!("round:{}", round),
            OrchestrationEvent::Converged { round, .. } => format!("converged:{}", round),
            OrchestrationEvent::SummaryFallback { .. } => "summary-fallback".to_string(),
            OrchestrationEvent::RunCompleted { rounds, .. } => format!("done:{}", rounds),
            _ => return,
        };
        self.events.lock().unwrap().push(label);
    }
}

fn quick_config() -> MeshConfig {
    let mut config = MeshConfig::default();
    config.reactive.round_pause_ms = 0;
    config
}

fn two_workers(a: Arc<FixedClient>, b: Arc<FixedClient>) -> Orchestrator {
    two_workers_with(quick_config(), a, b)
}

fn two_workers_with(
    config: MeshConfig,
    a: Arc<FixedClient>,
    b: Arc<FixedClient>,
) -> Orchestrator {
    let mut orch = Orchestrator::new(config);
    orch.register_worker(Worker::new("analyst", "Analyst", a)).unwrap();
    orch.register_worker(Worker::new("advisor", "Advisor", b)).unwrap();
    orch
}

#[tokio::test]
async fn test_reactive_run_stops_once_the_bus_is_quiet() {
    let mut config = quick_config();
    config.reactive.round_pause_ms = 100;
    let recorder = Arc::new(Recorder::default());
    let mut orch = two_workers_with(config, fixed("theory"), fixed("practice"))
        .with_event_handler(recorder.clone());

    let result = orch
        .process_request("Explain sourdough", &[], CollaborationMode::Reactive)
        .await
        .unwrap();

    assert_eq!(result.rounds_completed, 2);
    // one pause between round 1 and round 2
    assert!(result.processing_time >= Duration::from_millis(100));
    assert!(result.processing_time < Duration::from_millis(200));
    assert!(!result.breakdown.subtasks.is_empty());
    for subtask in &result.breakdown.subtasks {
        assert!(subtask.completed, "{} not completed", subtask.assigned_worker);
        let expected = if subtask.assigned_worker == "analyst" { "theory" } else { "practice" };
        assert_eq!(subtask.result.as_deref(), Some(expected));
    }
    assert_eq!(result.subtask_results.len(), 2);
    assert_eq!(result.subtask_results[0].subtask_id, "analyst-round1");
    assert_eq!(result.subtask_results[1].subtask_id, "advisor-round1");
    assert_eq!(result.total_tokens, 20);
    assert_eq!(result.participating_workers, vec!["analyst", "advisor"]);
    assert!(result.interactions.iter().all(|i| i.success && i.to == "coordinator"));

    // kickoff broadcast plus one reply per worker
    assert_eq!(result.message_history.len(), 3);
    assert_eq!(result.message_history[0].cause_by, CauseBy::TaskAssignment);
    assert_eq!(result.message_history[0].sent_from, "coordinator");

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("run:Reactive"));
    assert!(events.contains(&"round:2".to_string()));
    assert!(events.contains(&"converged:2".to_string()));
    assert!(!events.contains(&"round:3".to_string()));
    assert!(events.contains(&"completed:analyst".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("done:2"));
}

#[tokio::test]
async fn test_reactive_run_stops_at_the_round_cap() {
    // kickoff sent as a registered worker, so every reply lands in a mailbox
    let mut config = quick_config();
    config.reactive.coordinator_id = "advisor".to_string();
    let recorder = Arc::new(Recorder::default());
    let mut orch = two_workers_with(config, fixed("theory"), fixed("practice"))
        .with_event_handler(recorder.clone());

    let result = orch
        .process_request("Explain sourdough", &[], CollaborationMode::Reactive)
        .await
        .unwrap();

    assert_eq!(result.rounds_completed, 3);
    assert_eq!(result.subtask_results.len(), 6);
    assert_eq!(result.subtask_results[5].subtask_id, "advisor-round3");
    assert!(result.interactions.iter().all(|i| i.success));
    assert_eq!(result.interactions[0].to, "advisor");

    let events = recorder.events.lock().unwrap().clone();
    assert!(events.contains(&"round:3".to_string()));
    assert!(!events.contains(&"round:4".to_string()));
    assert!(!events.iter().any(|e| e.starts_with("converged")));
    assert_eq!(events.last().map(String::as_str), Some("done:3"));
}

#[tokio::test]
async fn test_reactive_failure_is_isolated_to_one_worker() {
    let mut orch = two_workers(broken(), fixed("practice"));

    let result = orch
        .process_request("Explain sourdough", &[], CollaborationMode::Reactive)
        .await
        .unwrap();

    assert_eq!(result.subtask_results.len(), 1);
    assert_eq!(result.subtask_results[0].worker_id, "advisor");
    assert_eq!(result.response, "practice");

    let failed: Vec<_> = result.interactions.iter().filter(|i| !i.success).collect();
    assert!(!failed.is_empty());
    assert!(failed.iter().all(|i| i.from == "analyst" && i.error.is_some()));
    assert_eq!(result.rounds_completed, 2);
}

#[tokio::test]
async fn test_sequential_aborts_on_first_failure() {
    let mut orch = two_workers(fixed("theory"), broken());

    let err = orch
        .process_request(
            "How do I keep a sourdough starter alive?",
            &[],
            CollaborationMode::Sequential,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Worker(_)));
}

#[tokio::test]
async fn test_concurrent_merges_both_answers() {
    let mut orch = two_workers(
        fixed("The mechanism is wild yeast."),
        fixed("You should feed it daily."),
    );

    let result = orch
        .process_request(
            "How do I keep a sourdough starter alive?",
            &[],
            CollaborationMode::Concurrent,
        )
        .await
        .unwrap();

    assert_eq!(result.subtask_results.len(), 2);
    assert_eq!(result.total_tokens, 20);
    assert!(result.summary.is_none());
    assert!(result.response.contains("## Analysis - Analyst"));
    assert!(result.response.contains("## Practical advice - Advisor"));
    assert!(result.response.contains("Tokens used: 20"));
    assert_eq!(result.rounds_completed, 1);
}

#[tokio::test]
async fn test_coordinator_plans_and_summarizes() {
    let coordinator_client = Arc::new(MockClient::new().with_responses(vec![
        r#"{"complexity":"complex","taskAssignments":[
            {"description":"why it rises","assignedAgent":"advisor","reasoning":"r"},
            {"description":"what to do","assignedAgent":"analyst","reasoning":"r"}]}"#,
        "Key insights:\n- Yeast\nConclusion:\nFeed it.",
    ]));
    let mut orch = two_workers(fixed("theory"), fixed("practice"))
        .with_coordinator(Coordinator::new(coordinator_client.clone()));

    let result = orch
        .process_request("sourdough", &[], CollaborationMode::Sequential)
        .await
        .unwrap();

    assert_eq!(result.subtask_results[0].worker_id, "advisor");
    assert_eq!(result.subtask_results[1].worker_id, "analyst");
    let summary = result.summary.expect("summary");
    assert_eq!(summary.key_insights, vec!["Yeast"]);
    assert_eq!(summary.conclusion, "Feed it.");
    assert!(result.response.contains("## Background reference"));
    assert_eq!(coordinator_client.call_count(), 2);
}

#[tokio::test]
async fn test_summary_failure_falls_back_to_heuristic_merge() {
    let coordinator_client = Arc::new(
        MockClient::new()
            .with_responses(vec!["not json at all"])
            .with_scripted_error(CompletionError::Unavailable("down".into())),
    );
    let recorder = Arc::new(Recorder::default());
    let mut orch = two_workers(fixed("theory"), fixed("practice"))
        .with_coordinator(Coordinator::new(coordinator_client))
        .with_event_handler(recorder.clone());

    let result = orch
        .process_request(
            "How do I keep a sourdough starter alive?",
            &[],
            CollaborationMode::Concurrent,
        )
        .await
        .unwrap();

    assert!(result.summary.is_none());
    assert!(!result.response.contains("## Background reference"));
    let events = recorder.events.lock().unwrap().clone();
    assert!(events.contains(&"plan:LocalFallback".to_string()));
    assert!(events.contains(&"summary-fallback".to_string()));
}

#[tokio::test]
async fn test_history_is_forwarded_to_workers() {
    let client = Arc::new(MockClient::new());
    let mut orch = Orchestrator::new(quick_config());
    orch.register_worker(Worker::new("analyst", "Analyst", client.clone()))
        .unwrap();

    let history = vec![
        Message::user("I bake on weekends."),
        Message::assistant("Noted."),
    ];
    orch.process_request("Hi", &history, CollaborationMode::Sequential)
        .await
        .unwrap();

    let sent = &client.requests()[0];
    assert_eq!(sent[0].role, Role::System);
    assert_eq!(sent[1].content, "I bake on weekends.");
    assert_eq!(sent.last().unwrap().content, "Hi");
}
