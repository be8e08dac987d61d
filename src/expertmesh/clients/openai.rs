//! The `OpenAIClient` struct implements `ClientWrapper` for OpenAI's Chat API and any
//! OpenAI-compatible server (DeepSeek, vLLM, Ollama, ...), returning the reported token usage
//! with every completion.
//!
//! # Example
//!
//! ```rust,no_run
//! use expertmesh::clients::openai::OpenAIClient;
//! use expertmesh::client_wrapper::{ClientWrapper, Message};
//!
//! #[tokio::main]
//! async fn main() {
//!     let secret_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
//!     let client = OpenAIClient::new_with_model_string(&secret_key, "gpt-4.1-mini");
//!
//!     let completion = client
//!         .send_message(&[Message::system("You are an assistant."), Message::user("Hello!")])
//!         .await
//!         .unwrap();
//!     println!("{} ({} tokens)", completion.content, completion.total_tokens());
//! }
//! ```
use std::time::Duration;

use async_trait::async_trait;
use openai_rust2 as openai_rust;

use crate::expertmesh::client_wrapper::{ClientWrapper, Completion, Message};
use crate::expertmesh::clients::common::{format_messages, send_and_track, shared_http_client};
use crate::expertmesh::error::CompletionError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client wrapper for OpenAI's Chat Completions API.
///
/// Reuses the shared HTTP client configured in [`crate::clients::common`].
pub struct OpenAIClient {
    /// Underlying SDK client pointing at the REST endpoint.
    client: openai_rust::Client,
    /// Model name that will be injected into each request.
    model: String,
    timeout: Duration,
}

impl OpenAIClient {
    /// Construct a new client using the provided API key and explicit model name.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client(secret_key, shared_http_client()),
            model: model_name.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Construct a client targeting a custom OpenAI compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(
                secret_key,
                shared_http_client(),
                base_url,
            ),
            model: model_name.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Per-call timeout (builder pattern).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Completion, CompletionError> {
        let url_path_string = "/v1/chat/completions".to_string();

        send_and_track(
            &self.client,
            "openai",
            &self.model,
            format_messages(messages),
            Some(url_path_string),
            self.timeout,
        )
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
