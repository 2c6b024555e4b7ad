use crate::{
    errors::AiError,
    providers::ai::{AiProvider, ChatMessage, ChatRequest, ContentBlock},
    types::Role,
};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Debug;
use tracing::debug;

// --- Gemini-specific request and response structures ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTools>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Serialize, Deserialize, Debug)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Serialize, Deserialize, Debug)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

// --- Gemini Provider implementation ---

/// A provider for interacting with the Google Gemini API.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: ReqwestClient,
    api_url: String,
    api_key: String,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider`.
    pub fn new(api_url: String, api_key: String) -> Result<Self, AiError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(AiError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }

    fn to_content(request: &ChatRequest, message: &ChatMessage) -> Content {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        let parts = message
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => Part {
                    text: Some(text.clone()),
                    ..Default::default()
                },
                ContentBlock::ToolUse { name, input, .. } => Part {
                    function_call: Some(FunctionCall {
                        name: name.clone(),
                        args: input.clone(),
                    }),
                    ..Default::default()
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content: outcome,
                } => Part {
                    function_response: Some(FunctionResponse {
                        name: request
                            .tool_name_for(tool_use_id)
                            .unwrap_or(tool_use_id)
                            .to_string(),
                        response: json!({ "result": outcome.to_json() }),
                    }),
                    ..Default::default()
                },
            })
            .collect();
        Content {
            role: Some(role.to_string()),
            parts,
        }
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage, AiError> {
        let system_instruction = (!request.system.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: Some(request.system.clone()),
                ..Default::default()
            }],
        });

        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTools {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| FunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    })
                    .collect(),
            }]
        };

        let request_body = GeminiRequest {
            system_instruction,
            contents: request
                .messages
                .iter()
                .map(|m| Self::to_content(request, m))
                .collect(),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
            tools,
        };

        debug!(
            "--> Sending request to Gemini ({} messages)",
            request.messages.len()
        );

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", &self.api_key)])
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

        let gemini_response: GeminiResponse =
            response.json().await.map_err(AiError::Deserialization)?;

        let candidate = gemini_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AiError::MalformedResponse("response has no candidates".into()))?;

        // Gemini has no invocation ids, so each call gets a fresh one.
        let content = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|part| {
                if let Some(call) = part.function_call {
                    Some(ContentBlock::ToolUse {
                        id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                        name: call.name,
                        input: call.args,
                    })
                } else {
                    part.text.map(|text| ContentBlock::Text { text })
                }
            })
            .collect();

        debug!("<-- Received response from Gemini");

        Ok(ChatMessage {
            role: Role::Assistant,
            content,
        })
    }
}
