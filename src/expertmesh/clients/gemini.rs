use crate::expertmesh::client_wrapper::{ClientWrapper, Completion, Message};
use crate::expertmesh::clients::common::{format_messages, send_and_track};
use crate::expertmesh::error::CompletionError;
use async_trait::async_trait;
use openai_rust2 as openai_rust;
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Gemini through Google's OpenAI-compatible endpoint.
pub struct GeminiClient {
    client: openai_rust::Client,
    pub model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, GEMINI_BASE_URL)
    }

    /// This function is used to create a GeminiClient with a custom base URL
    /// The default base URL is "<https://generativelanguage.googleapis.com/v1beta/>"
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        GeminiClient {
            client: openai_rust::Client::new_with_base_url(secret_key, base_url),
            model: model_name.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ClientWrapper for GeminiClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Completion, CompletionError> {
        let url_path = Some("/v1beta/chat/completions".to_string());
        let result = send_and_track(
            &self.client,
            "gemini",
            &self.model,
            format_messages(messages),
            url_path,
            self.timeout,
        )
        .await;

        if let Err(err) = &result {
            if log::log_enabled!(log::Level::Error) {
                log::error!("GeminiClient::send_message error: {}", err);
            }
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
