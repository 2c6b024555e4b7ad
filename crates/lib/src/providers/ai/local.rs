use crate::{
    errors::AiError,
    providers::ai::{AiProvider, ChatMessage, ChatRequest, ContentBlock},
    types::Role,
};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use tracing::debug;

// --- OpenAI-compatible request and response structures ---

#[derive(Serialize)]
struct LocalAiRequest<'a> {
    messages: Vec<LocalAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<LocalAiTool>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct LocalAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<LocalAiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl LocalAiMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct LocalAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: LocalAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct LocalAiFunctionCall {
    name: String,
    /// JSON-encoded arguments, as the wire format requires.
    arguments: String,
}

#[derive(Serialize)]
struct LocalAiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: LocalAiFunction,
}

#[derive(Serialize)]
struct LocalAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Deserialize, Debug)]
struct LocalAiResponse {
    choices: Vec<LocalAiChoice>,
}

#[derive(Deserialize, Debug)]
struct LocalAiChoice {
    message: LocalAiMessage,
}

// --- Local Provider implementation ---

/// A provider for interacting with a local or OpenAI-compatible API.
#[derive(Clone, Debug)]
pub struct LocalAiProvider {
    client: ReqwestClient,
    api_url: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl LocalAiProvider {
    /// Creates a new `LocalAiProvider`.
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self, AiError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(AiError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            api_url,
            api_key,
            model,
        })
    }

    /// Flattens the block-structured conversation into chat-completions messages.
    /// Tool results become separate `tool` messages.
    fn to_messages(request: &ChatRequest) -> Vec<LocalAiMessage> {
        let mut out = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            out.push(LocalAiMessage::text("system", request.system.clone()));
        }

        for message in &request.messages {
            match message.role {
                Role::Assistant => {
                    let text = message.text();
                    let tool_calls = message
                        .tool_uses()
                        .into_iter()
                        .map(|call| LocalAiToolCall {
                            id: call.id.to_string(),
                            kind: function_type(),
                            function: LocalAiFunctionCall {
                                name: call.name.to_string(),
                                arguments: call.input.to_string(),
                            },
                        })
                        .collect();
                    out.push(LocalAiMessage {
                        role: "assistant".to_string(),
                        content: (!text.is_empty()).then_some(text),
                        tool_calls,
                        tool_call_id: None,
                    });
                }
                Role::User => {
                    let mut text_parts = Vec::new();
                    for block in &message.content {
                        match block {
                            ContentBlock::Text { text } => text_parts.push(text.as_str()),
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content: outcome,
                            } => out.push(LocalAiMessage {
                                role: "tool".to_string(),
                                content: Some(outcome.to_json().to_string()),
                                tool_calls: Vec::new(),
                                tool_call_id: Some(tool_use_id.clone()),
                            }),
                            ContentBlock::ToolUse { .. } => {}
                        }
                    }
                    if !text_parts.is_empty() {
                        out.push(LocalAiMessage::text("user", text_parts.join("\n")));
                    }
                }
            }
        }
        out
    }
}

#[async_trait]
impl AiProvider for LocalAiProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage, AiError> {
        let request_body = LocalAiRequest {
            messages: Self::to_messages(request),
            model: self.model.as_deref(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
            tools: request
                .tools
                .iter()
                .map(|t| LocalAiTool {
                    kind: "function",
                    function: LocalAiFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect(),
        };

        debug!(
            "--> Sending request to local AI provider ({} messages)",
            request_body.messages.len()
        );

        let mut request_builder = self.client.post(&self.api_url);

        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }

        let response = request_builder
            .json(&request_body)
            .send()
            .await
            .map_err(AiError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let local_ai_response: LocalAiResponse =
            response.json().await.map_err(AiError::Deserialization)?;

        let message = local_ai_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AiError::MalformedResponse("response has no choices".into()))?;

        let mut content = Vec::new();
        if let Some(text) = message.content.filter(|t| !t.trim().is_empty()) {
            content.push(ContentBlock::Text { text });
        }
        for call in message.tool_calls {
            let input: Value = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    AiError::MalformedResponse(format!(
                        "tool call '{}' has invalid arguments: {e}",
                        call.function.name
                    ))
                })?
            };
            content.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        debug!("<-- Received response from local AI provider");

        Ok(ChatMessage {
            role: Role::Assistant,
            content,
        })
    }
}
