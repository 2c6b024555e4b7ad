//! # Query Orchestrator
//!
//! Ties the components together for one natural-language request:
//!
//! 1. Load the schema artifacts (memoized until an explicit refresh).
//! 2. Retrieve similar examples. Any retrieval failure degrades to zero examples.
//! 3. Ask the model for SQL and clean the reply.
//! 4. Run the candidate through the safety gate and the data source.
//! 5. Optionally ask the model to explain the outcome. Explanation failures are
//!    logged and dropped.
//!
//! Errors from steps 1 to 4 never escape `process`; they are recorded on the
//! returned [`QueryResult`].

use crate::{
    agent::{agent_multistep, AgentRun, SqlTools, ToolExecutor},
    config::EngineConfig,
    constants::DEFAULT_AGENT_ITERATIONS,
    errors::NlSqlError,
    parsing::clean_sql_response,
    prompts::{
        agent::agent_system_prompt,
        core::{
            explanation_failure_prompt, explanation_success_prompt, sql_generation_system_prompt,
            sql_generation_user_prompt, EXPLANATION_SYSTEM_PROMPT,
        },
    },
    providers::{
        ai::{AiProvider, ChatMessage, ChatRequest, Embedder},
        db::DataSource,
    },
    rag::{ExampleGenerator, ExampleStore, RagStats},
    safety::SqlSafetyGate,
    schema::{CacheInfo, PipelineStage, SchemaCache, SchemaExtractor, SchemaPipeline},
    types::{
        ConversationTurn, DatabaseInfo, Example, ExampleGeneration, QueryResult, QueryRows, Role,
        Row, SchemaInfo, SqlExecution,
    },
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

fn history_messages(history: &[ConversationTurn]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::User => ChatMessage::user_text(turn.content.clone()),
            Role::Assistant => ChatMessage::assistant_text(turn.content.clone()),
        })
        .collect()
}

#[derive(Debug)]
pub struct QueryOrchestrator {
    config: EngineConfig,
    source: Arc<dyn DataSource>,
    ai_provider: Arc<dyn AiProvider>,
    pipeline: SchemaPipeline,
    store: Arc<ExampleStore>,
    generator: ExampleGenerator,
    gate: SqlSafetyGate,
    schema: RwLock<Option<Arc<SchemaInfo>>>,
}

impl QueryOrchestrator {
    /// Builds every component from `config`, opening the example store in
    /// `config.data_dir`.
    pub async fn new(
        config: EngineConfig,
        source: Arc<dyn DataSource>,
        ai_provider: Arc<dyn AiProvider>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, NlSqlError> {
        let store = Arc::new(ExampleStore::open(config.data_dir.clone(), embedder).await?);
        let pipeline = SchemaPipeline::new(
            source.clone(),
            ai_provider.clone(),
            SchemaCache::new(config.cache_dir.clone()),
            SchemaExtractor::new(config.sample_rows),
            config.generation.clone(),
        );
        let generator = ExampleGenerator::new(ai_provider.clone(), config.generation.examples);
        let gate = SqlSafetyGate::new(config.allow_writes);

        info!(
            source = %source.name(),
            dialect = %source.dialect(),
            allow_writes = config.allow_writes,
            "Query orchestrator ready"
        );

        Ok(Self {
            config,
            source,
            ai_provider,
            pipeline,
            store,
            generator,
            gate,
            schema: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn example_store(&self) -> &Arc<ExampleStore> {
        &self.store
    }

    pub fn schema_stage(&self) -> PipelineStage {
        self.pipeline.stage()
    }

    /// Returns the memoized schema artifacts, running the pipeline on first use.
    ///
    /// The memo lock is only held to read or swap the `Arc`; the pipeline
    /// serializes concurrent first loads per fingerprint.
    pub async fn schema_info(&self) -> Result<Arc<SchemaInfo>, NlSqlError> {
        if let Some(info) = self.schema.read().await.as_ref() {
            return Ok(info.clone());
        }

        let info = Arc::new(self.pipeline.get_schema_info(false).await?);
        let mut memo = self.schema.write().await;
        Ok(memo.get_or_insert(info).clone())
    }

    /// Loads or regenerates the schema artifacts and replaces the memoized copy.
    ///
    /// Readers keep the previous artifacts until the regenerated ones are swapped in.
    pub async fn initialize_schema(&self, force_refresh: bool) -> Result<Arc<SchemaInfo>, NlSqlError> {
        if !force_refresh {
            return self.schema_info().await;
        }
        let info = Arc::new(self.pipeline.refresh().await?);
        *self.schema.write().await = Some(info.clone());
        Ok(info)
    }

    pub async fn refresh_schema(&self) -> Result<Arc<SchemaInfo>, NlSqlError> {
        self.initialize_schema(true).await
    }

    pub async fn cache_info(&self) -> Result<CacheInfo, NlSqlError> {
        Ok(self.pipeline.cache_info().await?)
    }

    /// Answers a natural-language question with SQL, rows and an optional explanation.
    pub async fn process(
        &self,
        question: &str,
        include_explanation: bool,
        history: &[ConversationTurn],
    ) -> QueryResult {
        info!(question = %question, "Processing query");
        let mut result = QueryResult::new(question);

        match self.generate_and_run(question, history, &mut result).await {
            Ok(rows) => {
                info!(rows = rows.rows.len(), "Query executed");
                result.success = true;
                result.columns = Some(rows.columns);
                result.results = Some(rows.rows);
            }
            Err(e) => {
                error!(question = %question, error = %e, "Query processing failed");
                result.success = false;
                result.error = Some(e.to_string());
            }
        }

        if include_explanation {
            if let Some(sql) = result.sql.clone() {
                result.explanation = self.explain(question, &sql, &result).await;
            }
        }
        result
    }

    async fn generate_and_run(
        &self,
        question: &str,
        history: &[ConversationTurn],
        result: &mut QueryResult,
    ) -> Result<QueryRows, NlSqlError> {
        let schema = self.schema_info().await?;
        let examples = self.similar_examples(question).await;
        let sql = self
            .generate_sql(question, &schema, &examples, history)
            .await?;
        result.sql = Some(sql.clone());
        self.run_read(&sql).await
    }

    async fn similar_examples(&self, question: &str) -> Vec<Example> {
        match self
            .store
            .find_similar(question, self.config.similar_examples)
            .await
        {
            Ok(examples) => examples,
            Err(e) => {
                warn!(error = %e, "Example retrieval failed, continuing without examples");
                Vec::new()
            }
        }
    }

    async fn generate_sql(
        &self,
        question: &str,
        schema: &SchemaInfo,
        examples: &[Example],
        history: &[ConversationTurn],
    ) -> Result<String, NlSqlError> {
        let system_prompt = sql_generation_system_prompt(self.source.dialect());
        let user_prompt = sql_generation_user_prompt(
            question,
            &schema.raw_schema,
            &schema.data_dictionary,
            examples,
        );
        debug!(examples = examples.len(), user_prompt = %user_prompt, "--> Sending prompts to AI Provider");

        let mut messages = history_messages(history);
        messages.push(ChatMessage::user_text(user_prompt));
        let request =
            ChatRequest::new(system_prompt, messages).with_params(self.config.generation.sql);
        let raw = self.ai_provider.chat(&request).await?.text();

        debug!("<-- Query from AI: {}", raw);
        let sql = clean_sql_response(&raw)?;
        info!(sql = %sql, "Generated SQL");
        Ok(sql)
    }

    /// Validates a read statement, caps its size and runs it.
    async fn run_read(&self, sql: &str) -> Result<QueryRows, NlSqlError> {
        self.gate.validate(sql, false)?;
        let limited = SqlSafetyGate::apply_row_limit(sql, self.config.row_limit);
        let mut rows = self.source.query(&limited, &Default::default()).await?;
        // `WITH` and `EXPLAIN` reads get no LIMIT clause.
        rows.rows.truncate(self.config.row_limit);
        Ok(rows)
    }

    async fn explain(&self, question: &str, sql: &str, result: &QueryResult) -> Option<String> {
        let user_prompt = match (&result.error, &result.results) {
            (Some(error), _) => explanation_failure_prompt(question, sql, error),
            (None, Some(rows)) => explanation_success_prompt(question, sql, rows),
            (None, None) => explanation_success_prompt(question, sql, &[] as &[Row]),
        };
        let request = ChatRequest::new(
            EXPLANATION_SYSTEM_PROMPT,
            vec![ChatMessage::user_text(user_prompt)],
        )
        .with_params(self.config.generation.explanation);

        match self.ai_provider.chat(&request).await {
            Ok(reply) => {
                let text = reply.text();
                (!text.is_empty()).then_some(text)
            }
            Err(e) => {
                warn!(error = %e, "Explanation generation failed");
                None
            }
        }
    }

    /// Runs caller-supplied read SQL through the safety gate without the model.
    pub async fn execute_direct_sql(&self, sql: &str) -> SqlExecution {
        let mut execution = SqlExecution {
            sql: sql.to_string(),
            ..Default::default()
        };
        match self.run_read(sql).await {
            Ok(rows) => {
                execution.success = true;
                execution.columns = Some(rows.columns);
                execution.results = Some(rows.rows);
            }
            Err(e) => {
                warn!(sql = %sql, error = %e, "Direct SQL execution failed");
                execution.error = Some(e.to_string());
            }
        }
        execution
    }

    pub async fn list_tables(&self) -> Result<Vec<String>, NlSqlError> {
        Ok(self.source.list_tables().await?)
    }

    /// The raw schema text, read straight from the data source without the model.
    pub async fn raw_schema(&self) -> Result<String, NlSqlError> {
        let (raw_schema, _) = SchemaExtractor::new(self.config.sample_rows)
            .extract(self.source.as_ref())
            .await?;
        Ok(raw_schema)
    }

    /// Table names together with every schema artifact.
    pub async fn database_info(&self) -> Result<DatabaseInfo, NlSqlError> {
        let tables = self.source.list_tables().await?;
        let schema = self.schema_info().await?;
        Ok(DatabaseInfo {
            tables,
            raw_schema: schema.raw_schema.clone(),
            structured_schema: schema.structured_schema.clone(),
            data_dictionary: schema.data_dictionary.clone(),
            sample_data: schema.sample_data.clone(),
        })
    }

    /// Regenerates the stored examples from the current schema.
    pub async fn generate_examples(&self, count: usize) -> Result<ExampleGeneration, NlSqlError> {
        let schema = self.schema_info().await?;
        let tables = self.source.list_tables().await?;
        let (examples, used_fallback) = self
            .generator
            .generate(
                count,
                self.source.dialect(),
                &schema.raw_schema,
                &schema.sample_data,
                &tables,
            )
            .await;

        self.store.add_all(examples.clone()).await?;
        Ok(ExampleGeneration {
            num_examples: examples.len(),
            examples,
            used_fallback,
        })
    }

    pub async fn rag_stats(&self) -> RagStats {
        self.store.stats().await
    }

    pub async fn rag_examples(&self) -> Vec<Example> {
        self.store.all().await
    }

    pub async fn clear_examples(&self) -> Result<(), NlSqlError> {
        Ok(self.store.clear().await?)
    }

    /// Lets the model explore the database with the SQL tools to answer `question`.
    pub async fn run_agent(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<AgentRun, NlSqlError> {
        let tools = SqlTools::new(self.source.clone(), self.gate);
        let mut messages = history_messages(history);
        messages.push(ChatMessage::user_text(question));

        let request = ChatRequest::new(agent_system_prompt(self.source.dialect()), messages)
            .with_params(self.config.generation.agent)
            .with_tools(tools.specs());

        info!(question = %question, "Running tool-calling agent");
        Ok(agent_multistep(
            self.ai_provider.as_ref(),
            &tools,
            &request,
            DEFAULT_AGENT_ITERATIONS,
        )
        .await?)
    }
}
