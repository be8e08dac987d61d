use crate::expertmesh::client_wrapper::{Completion, Message, TokenUsage};
use crate::expertmesh::error::CompletionError;
use lazy_static::lazy_static;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use std::time::Duration;

lazy_static! {
    /// One connection pool shared by every provider client in the process.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .build()
        .unwrap_or_else(|err| {
            log::warn!("falling back to a default HTTP client: {}", err);
            reqwest::Client::new()
        });
}

/// Cheap clone of the process-wide HTTP client.
pub fn shared_http_client() -> reqwest::Client {
    SHARED_HTTP_CLIENT.clone()
}

/// Convert crate messages into the wire format expected by openai_rust.
pub fn format_messages(messages: &[Message]) -> Vec<chat::Message> {
    messages
        .iter()
        .map(|msg| chat::Message {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        })
        .collect()
}

/// Send a chat request bounded by `timeout` and return the assistant's content with its usage.
pub async fn send_and_track(
    api: &openai_rust::Client,
    provider: &str,
    model: &str,
    formatted_msgs: Vec<chat::Message>,
    url_path: Option<String>,
    timeout: Duration,
) -> Result<Completion, CompletionError> {
    let chat_arguments = chat::ChatArguments::new(model, formatted_msgs);

    let response = match tokio::time::timeout(timeout, api.create_chat(chat_arguments, url_path))
        .await
    {
        Ok(response) => response,
        Err(_) => {
            log::error!(
                "expertmesh::clients::common::send_and_track(...): {} timed out after {:?}",
                provider,
                timeout
            );
            return Err(CompletionError::Timeout {
                provider: provider.to_string(),
                timeout,
            });
        }
    };

    match response {
        Ok(response) => {
            let usage = TokenUsage {
                input_tokens: response.usage.prompt_tokens as usize,
                output_tokens: response.usage.completion_tokens as usize,
                total_tokens: response.usage.total_tokens as usize,
            };

            let content = response
                .choices
                .first()
                .map(|choice| choice.message.content.clone())
                .unwrap_or_default();

            if content.trim().is_empty() {
                return Err(CompletionError::EmptyResponse {
                    provider: provider.to_string(),
                });
            }

            Ok(Completion {
                content,
                usage: Some(usage),
            })
        }
        Err(err) => {
            log::error!(
                "expertmesh::clients::common::send_and_track(...): {} API Error: {}",
                provider,
                err
            );
            Err(CompletionError::Request {
                provider: provider.to_string(),
                message: err.to_string(),
            })
        }
    }
}
