//! # Generation Capability
//!
//! A language model is reached through the [`AiProvider`] trait. A request carries a
//! system instruction, an ordered list of messages, sampling parameters, and
//! optionally a set of tool specifications. The reply is a single assistant message
//! made of text blocks and/or tool invocation requests.

pub mod embedding;
pub mod gemini;
pub mod local;
pub mod retry;

use crate::{config::GenerationParams, errors::AiError, types::Role};
use async_trait::async_trait;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Debug;

pub use embedding::{generate_embedding, ApiEmbedder, Embedder};
pub use retry::RetryingProvider;

/// The result of running a tool, sent back to the model keyed by invocation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "content", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok(Value),
    Error(String),
}

impl ToolOutcome {
    /// The JSON payload the model sees. Errors are wrapped as `{"error": "..."}`.
    pub fn to_json(&self) -> Value {
        match self {
            ToolOutcome::Ok(value) => value.clone(),
            ToolOutcome::Error(message) => json!({ "error": message }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error(_))
    }
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: ToolOutcome,
    },
}

/// A message exchanged with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// A borrowed view of a tool invocation requested by the model.
#[derive(Debug, Clone, Copy)]
pub struct ToolUse<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub input: &'a Value,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// All text blocks joined by newlines and trimmed.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    pub fn tool_uses(&self) -> Vec<ToolUse<'_>> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUse { id, name, input }),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_uses(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }
}

/// A tool the model may invoke, described by a JSON schema for its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A complete request to a generation capability.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system: system.into(),
            messages,
            max_tokens: 1500,
            temperature: 0.0,
            tools: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.max_tokens = params.max_tokens;
        self.temperature = params.temperature;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Finds the tool name for an invocation id among the assistant messages.
    pub(crate) fn tool_name_for(&self, tool_use_id: &str) -> Option<&str> {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .find_map(|block| match block {
                ContentBlock::ToolUse { id, name, .. } if id == tool_use_id => Some(name.as_str()),
                _ => None,
            })
    }
}

/// A trait for interacting with a language model.
///
/// Implementations only need [`AiProvider::chat`]; [`AiProvider::generate`] is a
/// single-turn convenience built on top of it.
#[async_trait]
pub trait AiProvider: Send + Sync + Debug + DynClone {
    /// Sends a full request and returns the assistant's message.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage, AiError>;

    /// Generates a text response from a system and a user prompt.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AiError> {
        let request = ChatRequest::new(system_prompt, vec![ChatMessage::user_text(user_prompt)]);
        Ok(self.chat(&request).await?.text())
    }
}

dyn_clone::clone_trait_object!(AiProvider);
