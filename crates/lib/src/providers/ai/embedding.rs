//! # Embeddings Provider
//!
//! Vector embeddings are produced through the [`Embedder`] trait. [`ApiEmbedder`]
//! calls an external Gemini or OpenAI-compatible embeddings API and checks that
//! every vector it hands back has the dimension it was configured with.

use crate::errors::AiError;
use async_trait::async_trait;
use dyn_clone::DynClone;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::debug;

// --- OpenAI-compatible request and response structures ---

#[derive(Serialize, Debug)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

// --- Gemini-specific request and response structures ---

#[derive(Serialize, Debug)]
struct GeminiEmbeddingRequest<'a> {
    model: String,
    content: GeminiEmbeddingContent<'a>,
}

#[derive(Serialize, Debug)]
struct GeminiEmbeddingContent<'a> {
    parts: Vec<GeminiEmbeddingPart<'a>>,
}

#[derive(Serialize, Debug)]
struct GeminiEmbeddingPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbeddingValue,
}

#[derive(Deserialize, Debug)]
struct GeminiEmbeddingValue {
    values: Vec<f32>,
}

/// A capability that maps text to a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync + Debug + DynClone {
    /// The dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// A human-readable model identifier, reported in index statistics.
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError>;

    /// Embeds several texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

dyn_clone::clone_trait_object!(Embedder);

/// Generates a vector embedding for a given text input using an external API.
///
/// The JSON payload is chosen from the `api_url`: Gemini endpoints get the
/// `models/...` content format, everything else the OpenAI-compatible one.
pub async fn generate_embedding(
    client: &ReqwestClient,
    api_url: &str,
    model: &str,
    input: &str,
    api_key: Option<&str>,
) -> Result<Vec<f32>, AiError> {
    let mut request_builder = client.post(api_url);
    let is_gemini = api_url.contains("generativelanguage.googleapis.com");

    if is_gemini {
        let gemini_model_name = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };

        let request_body = GeminiEmbeddingRequest {
            model: gemini_model_name,
            content: GeminiEmbeddingContent {
                parts: vec![GeminiEmbeddingPart { text: input }],
            },
        };
        debug!(payload = ?request_body, "--> Sending request to Gemini Embeddings API");
        request_builder = request_builder.json(&request_body);
        if let Some(key) = api_key {
            request_builder = request_builder.header("x-goog-api-key", key);
        }
    } else {
        let request_body = OpenAIEmbeddingRequest { model, input };
        debug!(payload = ?request_body, "--> Sending request to OpenAI-compatible Embeddings API");
        request_builder = request_builder.json(&request_body);
        if let Some(key) = api_key {
            request_builder = request_builder.bearer_auth(key);
        }
    }

    let response = request_builder.send().await.map_err(AiError::Request)?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(AiError::Api {
            status: status.as_u16(),
            message,
        });
    }

    if is_gemini {
        let gemini_response: GeminiEmbeddingResponse =
            response.json().await.map_err(AiError::Deserialization)?;
        Ok(gemini_response.embedding.values)
    } else {
        let openai_response: OpenAIEmbeddingResponse =
            response.json().await.map_err(AiError::Deserialization)?;

        openai_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                AiError::MalformedResponse("embeddings API returned no embeddings".to_string())
            })
    }
}

/// An [`Embedder`] backed by a remote embeddings API.
#[derive(Clone, Debug)]
pub struct ApiEmbedder {
    client: ReqwestClient,
    api_url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl ApiEmbedder {
    pub fn new(
        api_url: String,
        model: String,
        api_key: Option<String>,
        dimension: usize,
    ) -> Result<Self, AiError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(AiError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            api_url,
            model,
            api_key,
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let vector = generate_embedding(
            &self.client,
            &self.api_url,
            &self.model,
            text,
            self.api_key.as_deref(),
        )
        .await?;
        if vector.len() != self.dimension {
            return Err(AiError::MalformedResponse(format!(
                "expected a {}-dimensional embedding, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(vector)
    }
}
