//! Worker actor.
//!
//! A [`Worker`] is an expert persona (name, specialization, capabilities, personality) bound to
//! a completion client. It can be used two ways:
//!
//! - **Directly**: [`Worker::process_task`] answers one task with an explicit transcript. The
//!   sequential and concurrent strategies use this path.
//! - **As an actor on the bus**: the [`Environment`](crate::environment::Environment) drops
//!   messages into the worker's mailbox, [`Worker::observe`] filters them into *news*, and
//!   [`Worker::react`] answers the most relevant one with a reply addressed to its sender.
//!
//! # State
//!
//! ```text
//!            observe() accepted > 0
//!   Idle ─────────────────────────────▶ HasNews
//!    ▲   observe() accepted == 0          │ react()
//!    └────────────────────────────────────┘ (reply returned, news cleared)
//! ```
//!
//! `react` takes `&mut self`, so a worker never runs two respond cycles at once.
//!
//! # Example
//!
//! ```rust,no_run
//! use expertmesh::clients::mock::MockClient;
//! use expertmesh::Worker;
//! use std::sync::Arc;
//!
//! # async {
//! let worker = Worker::new("analyst", "Technical Analyst", Arc::new(MockClient::new()))
//!     .with_specialization("Theoretical analysis")
//!     .with_capabilities(vec!["deep analysis", "logical reasoning"])
//!     .with_personality("Rigorous and precise");
//!
//! let output = worker.process_task("Explain why bread rises", &[]).await.unwrap();
//! println!("{} ({} tokens)", output.content, output.tokens());
//! # };
//! ```

use crate::expertmesh::client_wrapper::{
    with_system_prompt, ClientWrapper, Message, Role, TokenUsage,
};
use crate::expertmesh::config::WorkerConfig;
use crate::expertmesh::error::WorkerError;
use crate::expertmesh::event::{EventHandler, WorkerEvent};
use crate::expertmesh::mailbox::{Mailbox, DEFAULT_MAILBOX_CAPACITY};
use crate::expertmesh::message::{
    preview, AgentMessage, CauseBy, Recipients, META_REPLY_TO, META_RESPONSE_TIME_MS, META_TOKENS,
};
use crate::expertmesh::retrieval::ContextRetriever;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Text and accounting produced by one [`Worker::process_task`] call.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub content: String,
    /// `None` if the provider did not report usage.
    pub usage: Option<TokenUsage>,
    pub elapsed: Duration,
}

impl TaskOutput {
    pub fn tokens(&self) -> usize {
        self.usage.map(|u| u.total_tokens).unwrap_or(0)
    }
}

/// Mutable actor state. Only the owning worker touches it; the bus reaches it through
/// [`Worker::receive`].
#[derive(Debug, Clone)]
pub struct WorkerContext {
    mailbox: Mailbox,
    memory: VecDeque<AgentMessage>,
    news: Vec<AgentMessage>,
    watch: BTreeSet<CauseBy>,
    idle: bool,
    memory_limit: usize,
}

impl WorkerContext {
    fn new(config: &WorkerConfig, mailbox_capacity: usize) -> Self {
        Self {
            mailbox: Mailbox::new(mailbox_capacity),
            memory: VecDeque::new(),
            news: Vec::new(),
            watch: config.watch.iter().cloned().collect(),
            idle: true,
            memory_limit: config.memory_limit.max(1),
        }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Accepted messages, oldest first, capped at the configured memory limit.
    pub fn memory(&self) -> impl Iterator<Item = &AgentMessage> {
        self.memory.iter()
    }

    pub fn news(&self) -> &[AgentMessage] {
        &self.news
    }

    pub fn watch(&self) -> &BTreeSet<CauseBy> {
        &self.watch
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    fn remember(&mut self, message: AgentMessage) {
        self.memory.push_back(message);
        while self.memory.len() > self.memory_limit {
            self.memory.pop_front();
        }
    }
}

/// Serializable snapshot returned by [`Worker::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub id: String,
    pub name: String,
    pub specialization: String,
    pub is_idle: bool,
    pub mailbox_len: usize,
    pub memory_len: usize,
    pub news_len: usize,
    pub watch: Vec<CauseBy>,
}

/// An expert persona bound to a completion client and a bus mailbox.
pub struct Worker {
    /// Stable identifier used for routing.
    pub id: String,
    /// Display name; direct messages may address it instead of the id.
    pub name: String,
    pub specialization: String,
    pub capabilities: Vec<String>,
    pub personality: Option<String>,
    /// Sampling hint folded into the persona prompt.
    pub temperature: Option<f32>,
    /// Length hint folded into the persona prompt.
    pub max_tokens: Option<usize>,

    client: Arc<dyn ClientWrapper>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    context: WorkerContext,
    context_window: usize,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("specialization", &self.specialization)
            .field("model", &self.client.model_name())
            .field("context", &self.context)
            .finish()
    }
}

impl Worker {
    /// Create a worker with default [`WorkerConfig`] and an empty persona.
    pub fn new(id: impl Into<String>, name: impl Into<String>, client: Arc<dyn ClientWrapper>) -> Self {
        let config = WorkerConfig::default();
        Self {
            id: id.into(),
            name: name.into(),
            specialization: "General assistant".to_string(),
            capabilities: Vec::new(),
            personality: None,
            temperature: None,
            max_tokens: None,
            client,
            retriever: None,
            context: WorkerContext::new(&config, DEFAULT_MAILBOX_CAPACITY),
            context_window: config.context_window,
            event_handler: None,
        }
    }

    /// Technical-analysis preset: deep, theory-first answers.
    pub fn analyst(id: impl Into<String>, client: Arc<dyn ClientWrapper>) -> Self {
        Self::new(id, "Analyst", client)
            .with_specialization("Theoretical analysis and scientific research")
            .with_capabilities(vec![
                "deep analysis",
                "theoretical research",
                "scientific explanation",
                "logical reasoning",
                "knowledge integration",
            ])
            .with_personality(
                "You are a rigorous analyst. You explain underlying principles, mechanisms and \
                 trade-offs precisely and back claims with reasoning.",
            )
            .with_temperature(0.3)
            .with_max_tokens(1000)
    }

    /// Practical-advice preset: concrete, step-by-step guidance.
    pub fn advisor(id: impl Into<String>, client: Arc<dyn ClientWrapper>) -> Self {
        Self::new(id, "Advisor", client)
            .with_specialization("Practical solutions and concrete implementation")
            .with_capabilities(vec![
                "practical advice",
                "solution design",
                "step planning",
                "problem solving",
                "execution guidance",
            ])
            .with_personality(
                "You are a hands-on advisor. You turn questions into clear, actionable steps \
                 and call out common pitfalls.",
            )
            .with_temperature(0.7)
            .with_max_tokens(1000)
    }

    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specialization = specialization.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = Some(personality.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Consult `retriever` before each task and append what it finds to the system prompt.
    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Replace memory limit, context window and watch set. Resets actor state.
    pub fn with_config(mut self, config: &WorkerConfig) -> Self {
        let capacity = self.context.mailbox.capacity();
        self.context = WorkerContext::new(config, capacity);
        self.context_window = config.context_window;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Set or replace the event handler on a live worker. Used by the orchestrator to propagate
    /// its own handler.
    pub fn set_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.event_handler = Some(handler);
    }

    /// Swap the mailbox for one of `capacity`, keeping the newest queued messages.
    pub fn set_mailbox_capacity(&mut self, capacity: usize) {
        if capacity == self.context.mailbox.capacity() {
            return;
        }
        let mut mailbox = Mailbox::new(capacity);
        for message in self.context.mailbox.pop_all() {
            mailbox.push(message);
        }
        self.context.mailbox = mailbox;
    }

    async fn emit(&self, event: WorkerEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_worker_event(&event).await;
        }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    pub fn is_idle(&self) -> bool {
        self.context.idle
    }

    /// One-line roster description, e.g. for the coordinator prompt.
    pub fn describe(&self) -> String {
        let strengths: Vec<&str> = self.capabilities.iter().take(3).map(String::as_str).collect();
        format!(
            "{} (id: {}, {}) - good at: {}",
            self.name,
            self.id,
            self.specialization,
            strengths.join(", ")
        )
    }

    /// Accept messages with `cause` even when they are not addressed to this worker.
    pub fn watch(&mut self, cause: CauseBy) {
        self.context.watch.insert(cause);
    }

    pub fn unwatch(&mut self, cause: &CauseBy) {
        self.context.watch.remove(cause);
    }

    // ── Bus protocol ─────────────────────────────────────────────────────

    /// Queue a routed message. Called by the bus.
    pub fn receive(&mut self, message: AgentMessage) {
        log::debug!(
            "{} received message {}: {}",
            self.name,
            message.id,
            message.preview(30)
        );
        self.context.mailbox.push(message);
    }

    /// Whether this worker wants `message`: addressed to its id or display name, tagged with a
    /// watched cause, or broadcast.
    pub fn is_interested(&self, message: &AgentMessage) -> bool {
        self.is_addressed(message)
            || self.context.watch.contains(&message.cause_by)
            || message.send_to.is_broadcast()
    }

    fn is_addressed(&self, message: &AgentMessage) -> bool {
        message.send_to.contains(&self.id) || message.send_to.contains(&self.name)
    }

    /// Drain the mailbox and keep the interesting messages as news. Returns how many were kept.
    ///
    /// News from a previous observe is discarded, so call [`react`](Worker::react) in between
    /// if it should be answered.
    pub fn observe(&mut self) -> usize {
        self.context.news.clear();

        let drained = self.context.mailbox.pop_all();
        if drained.is_empty() {
            self.context.idle = true;
            return 0;
        }

        let drained_count = drained.len();
        for message in drained {
            if self.is_interested(&message) {
                self.context.remember(message.clone());
                self.context.news.push(message);
            }
        }

        let accepted = self.context.news.len();
        self.context.idle = accepted == 0;
        if accepted > 0 {
            log::info!(
                "{} observed {} new message(s) ({} drained)",
                self.name,
                accepted,
                drained_count
            );
        }
        accepted
    }

    /// The news item to answer: the latest direct message, else the latest task assignment,
    /// else the latest accepted message.
    pub fn select_primary_message(&self) -> Option<&AgentMessage> {
        let news = &self.context.news;
        news.iter()
            .rev()
            .find(|m| self.is_addressed(m))
            .or_else(|| {
                news.iter()
                    .rev()
                    .find(|m| m.cause_by == CauseBy::TaskAssignment)
            })
            .or_else(|| news.last())
    }

    /// The last `context_window` memory entries as a transcript. System messages are replayed
    /// as assistant turns so the persona prompt stays the only system message.
    pub fn context_window(&self) -> Vec<Message> {
        let skip = self.context.memory.len().saturating_sub(self.context_window);
        self.context
            .memory
            .iter()
            .skip(skip)
            .map(|m| {
                let role = match m.role {
                    Role::System => Role::Assistant,
                    other => other,
                };
                Message::new(role, m.content.clone())
            })
            .collect()
    }

    /// Answer the primary news item. The reply is addressed to that message's sender, tagged
    /// [`CauseBy::AgentResponse`] and carries token, response-time and reply-to metadata.
    ///
    /// Fails with [`WorkerError::NoNews`] when there is nothing to answer. A completion failure
    /// is returned as is and leaves the news in place.
    pub async fn react(&mut self) -> Result<AgentMessage, WorkerError> {
        let primary = match self.select_primary_message() {
            Some(message) => message.clone(),
            None => return Err(WorkerError::NoNews(self.id.clone())),
        };

        self.context.idle = false;
        let transcript = self.context_window();

        let output = match self.process_task(&primary.content, &transcript).await {
            Ok(output) => output,
            Err(err) => {
                log::error!("{} failed to respond to {}: {}", self.name, primary.id, err);
                self.context.idle = true;
                return Err(err);
            }
        };

        let response_time_ms = (Utc::now() - primary.timestamp).num_milliseconds().max(0) as u64;
        let mut reply = AgentMessage::new(
            output.content.clone(),
            Role::Assistant,
            CauseBy::AgentResponse,
            Recipients::one(primary.sent_from.clone()),
        )
        .with_metadata(META_TOKENS, output.tokens() as u64)
        .with_metadata(META_RESPONSE_TIME_MS, response_time_ms)
        .with_metadata(META_REPLY_TO, primary.id.clone());
        reply.sent_from = self.id.clone();

        self.context.news.clear();
        self.context.idle = true;
        Ok(reply)
    }

    /// Build a message from this worker to `to`. Publish it through the environment.
    pub fn send_message(
        &self,
        to: impl Into<String>,
        content: impl Into<String>,
        cause_by: CauseBy,
    ) -> AgentMessage {
        let mut message = AgentMessage::new(content, Role::Assistant, cause_by, Recipients::one(to));
        message.sent_from = self.id.clone();
        message
    }

    /// Build a broadcast from this worker. Publish it through the environment.
    pub fn broadcast(&self, content: impl Into<String>, cause_by: CauseBy) -> AgentMessage {
        let mut message =
            AgentMessage::new(content, Role::Assistant, cause_by, Recipients::broadcast());
        message.sent_from = self.id.clone();
        message
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            specialization: self.specialization.clone(),
            is_idle: self.context.idle,
            mailbox_len: self.context.mailbox.len(),
            memory_len: self.context.memory.len(),
            news_len: self.context.news.len(),
            watch: self.context.watch.iter().cloned().collect(),
        }
    }

    /// Drop queued mail, memory and news. The watch set is kept.
    pub fn cleanup(&mut self) {
        self.context.mailbox.clear();
        self.context.memory.clear();
        self.context.news.clear();
        self.context.idle = true;
        log::debug!("{} cleaned up", self.name);
    }

    // ── Direct task processing ───────────────────────────────────────────

    fn build_system_prompt(&self, task: &str, background: Option<&str>) -> String {
        let mut prompt = format!("You are {}.\n", self.name);
        if let Some(personality) = &self.personality {
            prompt.push_str(personality);
            prompt.push('\n');
        }

        prompt.push_str(&format!("\nYour specialization: {}\n", self.specialization));
        if !self.capabilities.is_empty() {
            prompt.push_str(&format!(
                "Your core capabilities: {}\n",
                self.capabilities.join(", ")
            ));
        }

        prompt.push_str(&format!("\nCurrent task: {}\n", task));
        prompt.push_str(
            "\nAnswer from the angle of your specialization:\n\
             - For analysis tasks, give in-depth analysis and insight\n\
             - For advice tasks, give practical solutions that can be acted on\n\
             - Stay professional but friendly\n\
             - Focus on where your expertise adds the most value\n",
        );

        if let Some(max_tokens) = self.max_tokens {
            prompt.push_str(&format!(
                "- Keep the answer within roughly {} tokens\n",
                max_tokens
            ));
        }
        if let Some(temperature) = self.temperature {
            if temperature < 0.5 {
                prompt.push_str("- Prefer precise, conservative wording\n");
            } else {
                prompt.push_str("- Feel free to suggest creative alternatives\n");
            }
        }

        if let Some(background) = background {
            prompt.push_str("\nRelevant background:\n");
            prompt.push_str(background);
            prompt.push('\n');
        }

        prompt
    }

    async fn retrieve_background(&self, task: &str) -> Option<String> {
        let retriever = self.retriever.as_ref()?;
        match retriever.retrieve_context(task).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(err) => {
                log::warn!("{} continuing without retrieved context: {}", self.name, err);
                self.emit(WorkerEvent::RetrievalFailed {
                    worker_id: self.id.clone(),
                    error: err.to_string(),
                })
                .await;
                None
            }
        }
    }

    /// Answer `task` with `history` as prior turns. Stateless apart from emitted events.
    pub async fn process_task(
        &self,
        task: &str,
        history: &[Message],
    ) -> Result<TaskOutput, WorkerError> {
        self.emit(WorkerEvent::TaskStarted {
            worker_id: self.id.clone(),
            worker_name: self.name.clone(),
            task_preview: preview(task, 120),
        })
        .await;

        let background = self.retrieve_background(task).await;
        let system_prompt = self.build_system_prompt(task, background.as_deref());

        let mut transcript = history.to_vec();
        transcript.push(Message::user(task));
        let messages = with_system_prompt(&system_prompt, transcript);

        let started = Instant::now();
        match self.client.send_message(&messages).await {
            Ok(completion) => {
                let elapsed = started.elapsed();
                self.emit(WorkerEvent::TaskCompleted {
                    worker_id: self.id.clone(),
                    worker_name: self.name.clone(),
                    tokens_used: completion.usage,
                    response_length: completion.content.len(),
                    elapsed_ms: elapsed.as_millis() as u64,
                })
                .await;
                Ok(TaskOutput {
                    content: completion.content,
                    usage: completion.usage,
                    elapsed,
                })
            }
            Err(source) => {
                self.emit(WorkerEvent::TaskFailed {
                    worker_id: self.id.clone(),
                    worker_name: self.name.clone(),
                    error: source.to_string(),
                })
                .await;
                Err(WorkerError::Completion {
                    worker_id: self.id.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expertmesh::clients::mock::MockClient;
    use crate::expertmesh::error::{CompletionError, RetrievalError};
    use async_trait::async_trait;

    fn incoming(content: &str, from: &str, to: Recipients, cause: CauseBy) -> AgentMessage {
        let mut msg = AgentMessage::new(content, Role::User, cause, to);
        msg.sent_from = from.to_string();
        msg
    }

    fn worker_with(client: Arc<MockClient>) -> Worker {
        Worker::new("w1", "Writer", client).with_specialization("Writing")
    }

    #[test]
    fn test_interest_filter() {
        let mut worker = worker_with(Arc::new(MockClient::new()));
        worker.unwatch(&CauseBy::AgentResponse);

        let by_id = incoming("a", "x", Recipients::one("w1"), CauseBy::Other("Chat".into()));
        let by_name = incoming("b", "x", Recipients::one("Writer"), CauseBy::Other("Chat".into()));
        let watched = incoming("c", "x", Recipients::one("other"), CauseBy::TaskAssignment);
        let broadcast = incoming("d", "x", Recipients::broadcast(), CauseBy::Other("Chat".into()));
        let ignored = incoming("e", "x", Recipients::one("other"), CauseBy::AgentResponse);

        assert!(worker.is_interested(&by_id));
        assert!(worker.is_interested(&by_name));
        assert!(worker.is_interested(&watched));
        assert!(worker.is_interested(&broadcast));
        assert!(!worker.is_interested(&ignored));
    }

    #[test]
    fn test_observe_keeps_only_interesting_messages() {
        let mut worker = worker_with(Arc::new(MockClient::new()));
        worker.unwatch(&CauseBy::AgentResponse);
        worker.receive(incoming("for me", "x", Recipients::one("w1"), CauseBy::DirectCommunication));
        worker.receive(incoming("not for me", "x", Recipients::one("y"), CauseBy::AgentResponse));

        assert_eq!(worker.observe(), 1);
        assert!(!worker.is_idle());
        assert_eq!(worker.context().news()[0].content, "for me");
        assert_eq!(worker.context().memory().count(), 1);
        assert!(worker.context().mailbox().is_empty());

        assert_eq!(worker.observe(), 0);
        assert!(worker.is_idle());
    }

    #[test]
    fn test_primary_message_prefers_direct_then_task() {
        let mut worker = worker_with(Arc::new(MockClient::new()));
        worker.receive(incoming("task", "c", Recipients::one("z"), CauseBy::TaskAssignment));
        worker.receive(incoming("direct", "c", Recipients::one("w1"), CauseBy::DirectCommunication));
        worker.receive(incoming("later", "c", Recipients::broadcast(), CauseBy::Broadcast));
        worker.observe();
        assert_eq!(worker.select_primary_message().unwrap().content, "direct");

        worker.receive(incoming("task2", "c", Recipients::one("z"), CauseBy::TaskAssignment));
        worker.receive(incoming("chatter", "c", Recipients::broadcast(), CauseBy::Broadcast));
        worker.observe();
        assert_eq!(worker.select_primary_message().unwrap().content, "task2");
    }

    #[test]
    fn test_memory_is_bounded_and_context_window_maps_system_role() {
        let config = WorkerConfig {
            memory_limit: 3,
            context_window: 2,
            ..WorkerConfig::default()
        };
        let mut worker = worker_with(Arc::new(MockClient::new())).with_config(&config);
        for i in 0..5 {
            let mut msg = incoming(&format!("m{}", i), "c", Recipients::one("w1"), CauseBy::DirectCommunication);
            if i == 4 {
                msg.role = Role::System;
            }
            worker.receive(msg);
        }
        worker.observe();

        let memory: Vec<&str> = worker.context().memory().map(|m| m.content.as_str()).collect();
        assert_eq!(memory, vec!["m2", "m3", "m4"]);

        let window = worker.context_window();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "m3");
        assert_eq!(window[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_react_without_news_is_an_error() {
        let mut worker = worker_with(Arc::new(MockClient::new()));
        assert!(matches!(worker.react().await, Err(WorkerError::NoNews(id)) if id == "w1"));
    }

    #[tokio::test]
    async fn test_react_replies_to_sender_with_metadata() {
        let client = Arc::new(MockClient::new().with_responses(vec!["here you go"]));
        let mut worker = worker_with(client.clone());
        let question = incoming("help?", "boss", Recipients::one("w1"), CauseBy::DirectCommunication);
        let question_id = question.id.clone();
        worker.receive(question);
        worker.observe();

        let reply = worker.react().await.unwrap();
        assert_eq!(reply.content, "here you go");
        assert_eq!(reply.cause_by, CauseBy::AgentResponse);
        assert_eq!(reply.sent_from, "w1");
        assert!(reply.send_to.contains("boss"));
        assert_eq!(reply.reply_to(), Some(question_id.as_str()));
        assert!(reply.tokens() > 0);
        assert!(reply.response_time().is_some());
        assert!(worker.is_idle());
        assert!(worker.context().news().is_empty());

        let sent = &client.requests()[0];
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent.last().unwrap().content, "help?");
    }

    #[tokio::test]
    async fn test_react_failure_keeps_news() {
        let client = Arc::new(MockClient::new().failing(CompletionError::Unavailable("down".into())));
        let mut worker = worker_with(client);
        worker.receive(incoming("q", "boss", Recipients::one("w1"), CauseBy::DirectCommunication));
        worker.observe();

        let err = worker.react().await.unwrap_err();
        assert!(matches!(err, WorkerError::Completion { .. }));
        assert_eq!(worker.context().news().len(), 1);
    }

    struct BrokenRetriever;

    #[async_trait]
    impl ContextRetriever for BrokenRetriever {
        async fn retrieve_context(&self, _query: &str) -> Result<String, RetrievalError> {
            Err(RetrievalError("index offline".into()))
        }
    }

    struct FixedRetriever;

    #[async_trait]
    impl ContextRetriever for FixedRetriever {
        async fn retrieve_context(&self, _query: &str) -> Result<String, RetrievalError> {
            Ok("Starter should be 5 days old.".into())
        }
    }

    #[tokio::test]
    async fn test_retrieved_context_lands_in_system_prompt() {
        let client = Arc::new(MockClient::new());
        let worker = worker_with(client.clone()).with_retriever(Arc::new(FixedRetriever));
        worker.process_task("bake bread", &[]).await.unwrap();
        assert!(client.requests()[0][0].content.contains("Starter should be 5 days old."));
    }

    #[tokio::test]
    async fn test_retrieval_failure_does_not_fail_task() {
        let client = Arc::new(MockClient::new());
        let worker = worker_with(client.clone()).with_retriever(Arc::new(BrokenRetriever));
        let output = worker.process_task("bake bread", &[]).await.unwrap();
        assert_eq!(output.content, "Acknowledged: bake bread");
        assert!(!client.requests()[0][0].content.contains("Relevant background"));
    }

    #[test]
    fn test_presets_and_cleanup() {
        let client: Arc<MockClient> = Arc::new(MockClient::new());
        let mut analyst = Worker::analyst("analyst", client.clone());
        assert_eq!(analyst.temperature, Some(0.3));
        assert!(analyst.describe().contains("deep analysis"));
        assert!(Worker::advisor("advisor", client).specialization.starts_with("Practical"));

        analyst.receive(incoming("x", "c", Recipients::one("analyst"), CauseBy::DirectCommunication));
        analyst.observe();
        analyst.cleanup();
        let status = analyst.status();
        assert!(status.is_idle);
        assert_eq!(status.memory_len, 0);
        assert_eq!(status.watch.len(), 3);
    }
}
