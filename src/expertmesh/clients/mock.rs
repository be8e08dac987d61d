//! Deterministic offline client.
//!
//! Hosts without API keys get a working mesh (every worker echoes a short acknowledgement), and
//! tests get scripted replies plus a record of every transcript the client was sent.
//!
//! ```rust
//! use expertmesh::clients::mock::MockClient;
//! use expertmesh::client_wrapper::{ClientWrapper, Message};
//!
//! # tokio_test_block(async {
//! let client = MockClient::new().with_responses(vec!["first", "second"]);
//! let first = client.send_message(&[Message::user("hi")]).await.unwrap();
//! assert_eq!(first.content, "first");
//! assert_eq!(client.call_count(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

use crate::expertmesh::client_wrapper::{ClientWrapper, Completion, Message, Role, TokenUsage};
use crate::expertmesh::error::CompletionError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub struct MockClient {
    model: String,
    scripted: Mutex<VecDeque<Result<String, CompletionError>>>,
    failure: Option<CompletionError>,
    latency: Option<Duration>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            scripted: Mutex::new(VecDeque::new()),
            failure: None,
            latency: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Queue replies returned in order; once exhausted the client falls back to echoing.
    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.scripted).extend(responses.into_iter().map(|r| Ok(r.into())));
        self
    }

    /// Queue a single failure at the current end of the script.
    pub fn with_scripted_error(self, error: CompletionError) -> Self {
        lock(&self.scripted).push_back(Err(error));
        self
    }

    /// Fail every call that is not covered by the script.
    pub fn failing(mut self, error: CompletionError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Sleep before answering, to exercise concurrent scheduling.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every transcript received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }

    fn echo(messages: &[Message]) -> String {
        let task = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let preview: String = task.chars().take(80).collect();
        format!("Acknowledged: {}", preview)
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Completion, CompletionError> {
        lock(&self.requests).push(messages.to_vec());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = lock(&self.scripted).pop_front();
        let content = match (next, &self.failure) {
            (Some(reply), _) => reply?,
            (None, Some(error)) => return Err(error.clone()),
            (None, None) => Self::echo(messages),
        };

        let prompt: String = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Completion {
            usage: Some(TokenUsage::estimate(&prompt, &content)),
            content,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
