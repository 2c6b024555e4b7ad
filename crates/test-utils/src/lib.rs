use anyhow::Result;
use async_trait::async_trait;
use nlsql::errors::AiError;
use nlsql::providers::ai::{AiProvider, ChatMessage, ChatRequest, ContentBlock, Embedder};
use nlsql::providers::db::SqliteSource;
use nlsql::types::Role;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// --- Test Setup ---

/// Seed data shared by every test: three related tables with a handful of rows.
pub const SEED_SQL: &str = "
    CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT, city TEXT);
    CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL, price REAL NOT NULL);
    CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL, product_id INTEGER NOT NULL, quantity INTEGER NOT NULL, ordered_at TEXT);
    INSERT INTO customers (id, name, email, city) VALUES (1, 'Alice', 'alice@example.com', 'Bangkok');
    INSERT INTO customers (id, name, email, city) VALUES (2, 'Bob', 'bob@example.com', 'Chiang Mai');
    INSERT INTO customers (id, name, email, city) VALUES (3, 'Carol', NULL, 'Bangkok');
    INSERT INTO products (id, name, price) VALUES (1, 'Keyboard', 49.5);
    INSERT INTO products (id, name, price) VALUES (2, 'Mouse', 19.0);
    INSERT INTO orders (id, customer_id, product_id, quantity, ordered_at) VALUES (1, 1, 1, 2, '2024-01-03');
    INSERT INTO orders (id, customer_id, product_id, quantity, ordered_at) VALUES (2, 2, 2, 1, '2024-01-04');
    INSERT INTO orders (id, customer_id, product_id, quantity, ordered_at) VALUES (3, 1, 2, 3, '2024-02-10');
";

/// A helper struct to manage database creation for each test.
pub struct TestSetup {
    pub source: SqliteSource,
}

impl TestSetup {
    /// Creates a new, isolated in-memory database seeded with [`SEED_SQL`].
    pub async fn new() -> Result<Self> {
        Self::at(":memory:").await
    }

    /// Creates (or opens) a database file at `path` and seeds it.
    pub async fn at(path: &str) -> Result<Self> {
        let source = SqliteSource::new(path).await?;
        source.initialize_with_data(SEED_SQL).await?;
        Ok(Self { source })
    }
}

// --- Mock AI Provider ---

#[derive(Clone, Debug)]
enum MockReply {
    Message(ChatMessage),
    Failure(String),
}

/// A scripted language model.
///
/// Replies are keyed by a substring of the system prompt. Several replies under the
/// same key are returned in order and the last one repeats.
#[derive(Clone, Debug)]
pub struct MockAiProvider {
    responses: Arc<Mutex<Vec<(String, VecDeque<MockReply>)>>>,
    calls: Arc<Mutex<Vec<ChatRequest>>>,
    delays: Arc<Mutex<Vec<(String, Duration)>>>,
}

impl MockAiProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            delays: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Makes every later call whose system prompt contains `key` wait `delay`
    /// before replying.
    pub fn set_delay(&self, key: &str, delay: Duration) {
        self.delays.lock().unwrap().push((key.to_string(), delay));
    }

    fn push(&self, key: &str, reply: MockReply) {
        let mut responses = self.responses.lock().unwrap();
        match responses.iter_mut().find(|(k, _)| k == key) {
            Some((_, queue)) => queue.push_back(reply),
            None => responses.push((key.to_string(), VecDeque::from([reply]))),
        }
    }

    /// Pre-programs a text response for a specific prompt.
    /// The key should be a unique substring of the system prompt.
    pub fn add_response(&self, key: &str, response: &str) {
        self.push(key, MockReply::Message(ChatMessage::assistant_text(response)));
    }

    /// Pre-programs a full assistant message, e.g. one that invokes tools.
    pub fn add_message(&self, key: &str, message: ChatMessage) {
        self.push(key, MockReply::Message(message));
    }

    /// Pre-programs an assistant message that invokes one tool.
    pub fn add_tool_call(&self, key: &str, id: &str, name: &str, input: Value) {
        self.add_message(
            key,
            ChatMessage {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input,
                }],
            },
        );
    }

    /// Pre-programs a non-transient API failure.
    pub fn add_failure(&self, key: &str, message: &str) {
        self.push(key, MockReply::Failure(message.to_string()));
    }

    /// Retrieves the recorded `(system_prompt, last_user_text)` pairs for assertion.
    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|request| {
                let user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(ChatMessage::text)
                    .unwrap_or_default();
                (request.system.clone(), user)
            })
            .collect()
    }

    /// Retrieves the full recorded requests.
    pub fn get_requests(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose system prompt contains `key`.
    pub fn count_calls(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system.contains(key))
            .count()
    }
}

impl Default for MockAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage, AiError> {
        self.calls.lock().unwrap().push(request.clone());

        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(key, _)| request.system.contains(key.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self.responses.lock().unwrap();
        for (key, queue) in responses.iter_mut() {
            if request.system.contains(key.as_str()) {
                let reply = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
                return match reply {
                    Some(MockReply::Message(message)) => Ok(message),
                    Some(MockReply::Failure(message)) => Err(AiError::Api {
                        status: 400,
                        message,
                    }),
                    None => break,
                };
            }
        }

        Err(AiError::MalformedResponse(format!(
            "MockAiProvider: No response programmed for system prompt. Got: '{}'",
            request.system
        )))
    }
}

// --- Mock Embedder ---

/// Deterministic hashed bag-of-words embeddings.
///
/// Texts sharing words get similar vectors, so nearest-neighbor order is
/// predictable in tests.
#[derive(Clone, Debug)]
pub struct MockEmbedder {
    dimension: usize,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            failing: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes every subsequent `embed` call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The raw (unnormalized) vector for `text`.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        vector
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AiError::Api {
                status: 503,
                message: "MockEmbedder: embedding service unavailable".to_string(),
            });
        }
        Ok(self.vector_for(text))
    }
}
