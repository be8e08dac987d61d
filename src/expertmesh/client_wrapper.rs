use crate::expertmesh::error::CompletionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A ClientWrapper is a wrapper around a specific completion service.
/// It provides a common interface to interact with the LLMs.
/// It does not keep track of the conversation; workers assemble the transcript
/// they want to send and hand it over in one call.
// src/expertmesh/client_wrapper

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    // set by the developer to steer the model's responses
    User,
    // a message sent by a human user (or app user)
    Assistant, // lets the model know the content was generated as a response to a user message
}

impl Role {
    /// Wire name used by OpenAI-compatible chat endpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Rough usage figure for providers that do not report one: one token per four characters.
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        let input_tokens = estimate_token_count(prompt);
        let output_tokens = estimate_token_count(completion);
        TokenUsage {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Text returned by a completion call together with the usage it reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    /// `None` when the provider did not report usage.
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn total_tokens(&self) -> usize {
        self.usage.map(|u| u.total_tokens).unwrap_or(0)
    }
}

/// Trait defining the interface to interact with various LLM services.
///
/// The system prompt travels as the leading [`Role::System`] message. Usage is returned
/// alongside the text rather than stashed in a per-client slot so that several calls on the
/// same client can be in flight at once.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send a message to the LLM and get a response.
    /// - `messages`: The messages to send in the request.
    async fn send_message(&self, messages: &[Message]) -> Result<Completion, CompletionError>;

    /// Model identifier used in logs.
    fn model_name(&self) -> &str;
}

/// Prepend `system_prompt` to `transcript` in the layout [`ClientWrapper::send_message`] expects.
pub fn with_system_prompt(system_prompt: &str, transcript: Vec<Message>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(Message::system(system_prompt));
    messages.extend(transcript);
    messages
}

/// Estimates the number of tokens in a string.
/// Uses an approximate formula: one token per 4 characters.
pub fn estimate_token_count(text: &str) -> usize {
    let chars = text.chars().count();
    ((chars + 3) / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_system_prompt_leads_with_system_role() {
        let messages = with_system_prompt("be brief", vec![Message::user("hi")]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "hi");
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        let usage = TokenUsage::estimate("abcde", "abcd");
        assert_eq!(usage.input_tokens, 2);
        assert_eq!(usage.output_tokens, 1);
        assert_eq!(usage.total_tokens, 3);
    }
}
