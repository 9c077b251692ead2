//! The bounded-retry text-to-SQL state machine.
//!
//! Stage order: retrieve schema -> generate SQL -> syntax check ->
//! [retry via sample retrieval] -> execute -> [retry] -> synthesize answer.
//! The retry edges are a single explicit loop sharing one counter, so
//! termination is bounded by the retry budget rather than by a graph
//! engine's recursion limit.
//!
//! Expected failures never escape this module: they are retried while budget
//! remains and become explanatory answer content once it is spent.

use async_trait::async_trait;

use masset_core::schema::basic_schema_examples;
use masset_core::services::{ContextRetriever, SqlStore, TextCompletion};
use masset_core::sql::extract_sql;
use masset_llm::SqlCache;

use crate::prompts;
use crate::state::{PipelineOutcome, PipelineState};

/// Schema snippets fetched per question.
const SCHEMA_CONTEXT_LIMIT: usize = 3;

/// Exemplar statements fetched per retry.
const SAMPLE_CONTEXT_LIMIT: usize = 2;

/// The narrow seam the HTTP layer depends on, so handlers can be tested
/// against a scripted engine.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run one question through the pipeline. Infallible by design: every
    /// expected failure ends as an explanatory answer.
    async fn run(&self, question: &str) -> PipelineOutcome;
}

/// The production pipeline over injected collaborators.
pub struct Pipeline<C, R, S> {
    completion: C,
    retriever: R,
    store: S,
    cache: SqlCache,
    max_retries: u32,
}

impl<C, R, S> Pipeline<C, R, S>
where
    C: TextCompletion,
    R: ContextRetriever,
    S: SqlStore,
{
    pub fn new(completion: C, retriever: R, store: S, cache: SqlCache, max_retries: u32) -> Self {
        Self {
            completion,
            retriever,
            store,
            cache,
            max_retries,
        }
    }

    /// Fetch schema context, substituting the default schema on any error or
    /// empty result. Never fails.
    async fn retrieve_schema(&self, state: &mut PipelineState) {
        match self
            .retriever
            .schema_examples(&state.original_query, SCHEMA_CONTEXT_LIMIT)
            .await
        {
            Ok(examples) if !examples.is_empty() => {
                tracing::info!(found = examples.len(), "Schema context retrieved");
                state.schema_examples = examples;
            }
            Ok(_) => {
                tracing::warn!("No schema examples found, using default schema");
                state.schema_examples = basic_schema_examples();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Schema retrieval failed, using default schema");
                state.schema_examples = basic_schema_examples();
            }
        }
    }

    /// Fetch exemplar statements for the next generation attempt. Errors are
    /// tolerated; the retry proceeds with whatever context exists.
    async fn retrieve_samples(&self, state: &mut PipelineState) {
        match self
            .retriever
            .sample_queries(&state.original_query, SAMPLE_CONTEXT_LIMIT)
            .await
        {
            Ok(samples) => {
                tracing::info!(found = samples.len(), "Sample queries retrieved");
                state.sample_queries = samples;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sample query retrieval failed");
                state.sample_queries.clear();
            }
        }
    }

    /// One generation attempt. Always increments the retry counter; on
    /// failure the error is recorded and the empty statement flows onward
    /// for the syntax check to reject.
    async fn generate_sql(&self, state: &mut PipelineState) {
        state.retry_count += 1;

        let context = format!(
            "{}:::{}",
            state.schema_examples.join("\n"),
            state.sample_queries.join("\n"),
        );
        if let Some(cached) = self.cache.get(&state.original_query, &context) {
            tracing::info!(attempt = state.retry_count, "Using cached SQL statement");
            state.final_query = cached;
            state.error_message = None;
            return;
        }

        let prompt = prompts::sql_generation(state);
        match self.completion.complete(&prompt).await {
            Ok(response) => {
                let sql = extract_sql(&response);
                if sql.is_empty() {
                    tracing::warn!(attempt = state.retry_count, "Completion contained no SQL");
                    state.final_query.clear();
                    state.error_message =
                        Some("no SQL statement found in completion response".into());
                } else {
                    tracing::info!(attempt = state.retry_count, sql = %sql, "SQL generated");
                    self.cache.put(&state.original_query, &context, &sql);
                    state.final_query = sql;
                    state.error_message = None;
                }
            }
            Err(e) => {
                tracing::error!(attempt = state.retry_count, error = %e, "SQL generation failed");
                state.final_query.clear();
                state.error_message = Some(format!("SQL generation failed: {e}"));
            }
        }
    }

    /// Syntax-check the candidate. A reported error is recorded but is not
    /// fatal here; the decision to retry or pass through happens in `run`.
    async fn check_syntax(&self, state: &mut PipelineState) {
        if state.final_query.is_empty() {
            state.error_message = Some("no SQL statement was generated to check".into());
            return;
        }
        match self.store.check_syntax(&state.final_query).await {
            Ok(()) => {
                tracing::info!("Syntax check passed");
                state.error_message = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Syntax check failed");
                state.error_message = Some(e.to_string());
            }
        }
    }

    /// Execute the candidate, capturing the result or the error.
    async fn execute(&self, state: &mut PipelineState) {
        if state.final_query.is_empty() {
            state.error_message = Some("cannot execute: no SQL statement available".into());
            state.query_result = "execution skipped".into();
            return;
        }
        match self.store.execute(&state.final_query).await {
            Ok(rows) => {
                tracing::info!("Query execution succeeded");
                state.query_result = rows;
                state.error_message = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Query execution failed");
                state.query_result = format!("Execution error: {e}");
                state.error_message = Some(e.to_string());
            }
        }
    }

    /// Synthesize the final answer. Runs exactly once per pipeline
    /// invocation and always leaves a non-empty answer behind: completion
    /// failures fall back to a template built from the raw result or error.
    async fn generate_answer(&self, state: &mut PipelineState) {
        let prompt = if state.error_message.is_some() {
            prompts::error_answer(state)
        } else {
            prompts::result_answer(state)
        };

        match self.completion.complete(&prompt).await {
            Ok(answer) if !answer.trim().is_empty() => {
                state.final_answer = Some(answer.trim().to_string());
            }
            Ok(_) => {
                tracing::warn!("Answer synthesis returned empty text, using fallback");
                state.final_answer = Some(prompts::fallback_answer(state));
            }
            Err(e) => {
                tracing::error!(error = %e, "Answer synthesis failed, using fallback");
                state.final_answer = Some(prompts::fallback_answer(state));
            }
        }
    }
}

#[async_trait]
impl<C, R, S> QueryEngine for Pipeline<C, R, S>
where
    C: TextCompletion,
    R: ContextRetriever,
    S: SqlStore,
{
    async fn run(&self, question: &str) -> PipelineOutcome {
        let mut state = PipelineState::new(question);

        self.retrieve_schema(&mut state).await;

        loop {
            self.generate_sql(&mut state).await;

            self.check_syntax(&mut state).await;
            if state.error_message.is_some() && state.retry_count < self.max_retries {
                tracing::info!(
                    attempt = state.retry_count,
                    max_retries = self.max_retries,
                    "Syntax check failed, regenerating with sample context",
                );
                self.retrieve_samples(&mut state).await;
                continue;
            }

            // Retries exhausted: execute anyway so the execution outcome
            // becomes the authoritative failure signal.
            self.execute(&mut state).await;
            if state.error_message.is_some() && state.retry_count < self.max_retries {
                tracing::info!(
                    attempt = state.retry_count,
                    max_retries = self.max_retries,
                    "Execution failed, regenerating with sample context",
                );
                self.retrieve_samples(&mut state).await;
                continue;
            }

            break;
        }

        self.generate_answer(&mut state).await;
        PipelineOutcome::from_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use masset_core::config::CacheConfig;
    use masset_core::error::CoreError;

    // ---- doubles ----------------------------------------------------------

    /// Pops one scripted response per call and records every prompt.
    struct ScriptedCompletion {
        responses: Mutex<VecDeque<Result<String, CoreError>>>,
        prompts: Arc<Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedCompletion {
        fn new(responses: Vec<Result<String, CoreError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl TextCompletion for ScriptedCompletion {
        async fn complete(&self, prompt: &str) -> Result<String, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CoreError::Generation("script exhausted".into())))
        }
    }

    /// Retriever with fixed results, or errors on every call.
    struct StubRetriever {
        schemas: Result<Vec<String>, ()>,
        samples: Result<Vec<String>, ()>,
    }

    impl StubRetriever {
        fn failing() -> Self {
            Self {
                schemas: Err(()),
                samples: Err(()),
            }
        }

        fn with_schemas(schemas: Vec<String>) -> Self {
            Self {
                schemas: Ok(schemas),
                samples: Ok(vec!["SELECT close_price FROM prices;".into()]),
            }
        }
    }

    #[async_trait]
    impl ContextRetriever for StubRetriever {
        async fn schema_examples(&self, _q: &str, _limit: usize) -> Result<Vec<String>, CoreError> {
            self.schemas
                .clone()
                .map_err(|()| CoreError::Retrieval("vector store down".into()))
        }

        async fn sample_queries(&self, _q: &str, _limit: usize) -> Result<Vec<String>, CoreError> {
            self.samples
                .clone()
                .map_err(|()| CoreError::Retrieval("vector store down".into()))
        }
    }

    /// Store with scripted per-call check/execute results; once a script is
    /// exhausted the last behavior repeats.
    struct ScriptedStore {
        checks: Mutex<VecDeque<Result<(), String>>>,
        executions: Mutex<VecDeque<Result<String, String>>>,
    }

    impl ScriptedStore {
        fn new(checks: Vec<Result<(), String>>, executions: Vec<Result<String, String>>) -> Self {
            Self {
                checks: Mutex::new(checks.into()),
                executions: Mutex::new(executions.into()),
            }
        }

        fn always_failing() -> Self {
            Self::new(vec![], vec![])
        }
    }

    #[async_trait]
    impl SqlStore for ScriptedStore {
        async fn check_syntax(&self, _sql: &str) -> Result<(), CoreError> {
            self.checks
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("syntax error near \"SELEC\"".into()))
                .map_err(CoreError::Syntax)
        }

        async fn execute(&self, _sql: &str) -> Result<String, CoreError> {
            self.executions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("relation \"nope\" does not exist".into()))
                .map_err(CoreError::Execution)
        }
    }

    fn sql(text: &str) -> Result<String, CoreError> {
        Ok(format!("```sql\n{text}\n```"))
    }

    fn answer(text: &str) -> Result<String, CoreError> {
        Ok(text.to_string())
    }

    fn pipeline<C, R, S>(completion: C, retriever: R, store: S, max_retries: u32) -> Pipeline<C, R, S>
    where
        C: TextCompletion,
        R: ContextRetriever,
        S: SqlStore,
    {
        Pipeline::new(completion, retriever, store, SqlCache::disabled(), max_retries)
    }

    // ---- tests ------------------------------------------------------------

    #[tokio::test]
    async fn happy_path_succeeds_on_first_attempt() {
        let completion = ScriptedCompletion::new(vec![
            sql("SELECT kor_name_small FROM exchange_kosdaq_stock_master LIMIT 5;"),
            answer("Here are the top five companies."),
        ]);
        let retriever = StubRetriever::with_schemas(vec!["CREATE TABLE m (a INT);".into()]);
        let store = ScriptedStore::new(vec![Ok(())], vec![Ok("[{\"a\":1}]".into())]);

        let outcome = pipeline(completion, retriever, store, 3).run("Top 5 companies").await;

        assert!(outcome.success);
        assert_eq!(outcome.retry_count, 1);
        assert_eq!(outcome.error_message, None);
        assert_eq!(outcome.result.as_deref(), Some("[{\"a\":1}]"));
        assert_eq!(outcome.answer, "Here are the top five companies.");
    }

    #[tokio::test]
    async fn deterministic_failure_terminates_within_retry_budget() {
        // Generation always produces SQL; the store rejects everything.
        let completion = ScriptedCompletion::new(vec![
            sql("SELEC 1;"),
            sql("SELEC 2;"),
            sql("SELEC 3;"),
            answer("That query could not be executed."),
        ]);
        let calls = Arc::clone(&completion.calls);
        let retriever = StubRetriever::with_schemas(vec!["CREATE TABLE m (a INT);".into()]);
        let store = ScriptedStore::always_failing();

        let outcome = pipeline(completion, retriever, store, 3).run("broken").await;

        assert!(!outcome.success);
        assert_eq!(outcome.retry_count, 3);
        assert!(outcome.error_message.is_some());
        assert!(!outcome.answer.is_empty());
        // 3 generation calls + 1 answer call; the budget structurally
        // prevents a fourth generation attempt.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn schema_retrieval_failure_falls_back_to_default_schema() {
        let completion = ScriptedCompletion::new(vec![
            sql("SELECT 1;"),
            answer("done"),
        ]);
        let prompts = Arc::clone(&completion.prompts);
        let store = ScriptedStore::new(vec![Ok(())], vec![Ok("[]".into())]);

        let outcome = pipeline(completion, StubRetriever::failing(), store, 3)
            .run("anything")
            .await;

        assert!(outcome.success);
        // The generation prompt must carry the default schema tables.
        let generation_prompt = &prompts.lock().unwrap()[0];
        assert!(generation_prompt.contains("exchange_kosdaq_stock_master"));
    }

    #[tokio::test]
    async fn always_erroring_vector_store_still_reaches_terminal() {
        // Retrieval fails for schema AND samples; the pipeline must still
        // terminate with a non-empty answer.
        let completion = ScriptedCompletion::new(vec![
            sql("SELEC bad;"),
            sql("SELECT good;"),
            answer("recovered"),
        ]);
        let store = ScriptedStore::new(
            vec![Err("syntax error".into()), Ok(())],
            vec![Ok("[]".into())],
        );

        let outcome = pipeline(completion, StubRetriever::failing(), store, 3)
            .run("anything")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(outcome.answer, "recovered");
    }

    #[tokio::test]
    async fn bad_column_then_corrected_query_succeeds() {
        // First generation uses an invalid column, syntax check fails once,
        // the second generation succeeds and executes.
        let completion = ScriptedCompletion::new(vec![
            sql("SELECT marketcap FROM prices;"),
            sql("SELECT market_cap FROM prices;"),
            answer("The largest company is ..."),
        ]);
        let prompts = Arc::clone(&completion.prompts);
        let retriever = StubRetriever::with_schemas(vec!["CREATE TABLE prices (market_cap BIGINT);".into()]);
        let store = ScriptedStore::new(
            vec![Err("column \"marketcap\" does not exist".into()), Ok(())],
            vec![Ok("[{\"market_cap\":100}]".into())],
        );

        let outcome = pipeline(completion, retriever, store, 3)
            .run("Top 5 companies by market cap")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(outcome.error_message, None);
        assert_eq!(outcome.answer, "The largest company is ...");
        // The retry prompt consumed the syntax error and the sample context.
        let retry_prompt = &prompts.lock().unwrap()[1];
        assert!(retry_prompt.contains("column \"marketcap\" does not exist"));
        assert!(retry_prompt.contains("SELECT close_price FROM prices;"));
    }

    #[tokio::test]
    async fn syntax_failure_passes_through_once_budget_is_spent() {
        // The checker never accepts, but execution succeeds: after the last
        // generation attempt the statement is executed anyway and the run
        // ends successfully.
        let completion = ScriptedCompletion::new(vec![
            sql("SELECT 1;"),
            sql("SELECT 2;"),
            answer("executed after all"),
        ]);
        let retriever = StubRetriever::with_schemas(vec!["CREATE TABLE m (a INT);".into()]);
        let store = ScriptedStore::new(
            vec![Err("checker says no".into()), Err("checker says no".into())],
            vec![Ok("[]".into())],
        );

        let outcome = pipeline(completion, retriever, store, 2).run("q").await;

        assert!(outcome.success);
        assert_eq!(outcome.retry_count, 2);
        assert_eq!(outcome.error_message, None);
    }

    #[tokio::test]
    async fn generation_failure_is_recorded_and_retried() {
        let completion = ScriptedCompletion::new(vec![
            Err(CoreError::Generation("completion service 503".into())),
            sql("SELECT 1;"),
            answer("fine now"),
        ]);
        let retriever = StubRetriever::with_schemas(vec!["CREATE TABLE m (a INT);".into()]);
        let store = ScriptedStore::new(vec![Ok(())], vec![Ok("[]".into())]);

        let outcome = pipeline(completion, retriever, store, 3).run("q").await;

        assert!(outcome.success);
        assert_eq!(outcome.retry_count, 2);
    }

    #[tokio::test]
    async fn answer_synthesis_failure_falls_back_to_template() {
        let completion = ScriptedCompletion::new(vec![
            sql("SELECT 1;"),
            Err(CoreError::Generation("completion service down".into())),
        ]);
        let retriever = StubRetriever::with_schemas(vec!["CREATE TABLE m (a INT);".into()]);
        let store = ScriptedStore::new(vec![Ok(())], vec![Ok("[{\"a\":1}]".into())]);

        let outcome = pipeline(completion, retriever, store, 3).run("q").await;

        assert!(outcome.success);
        assert!(outcome.answer.contains("[{\"a\":1}]"));
    }

    #[tokio::test]
    async fn error_fallback_answer_explains_the_failure() {
        // Everything fails, including answer synthesis: the templated
        // error answer must still be produced.
        let completion = ScriptedCompletion::new(vec![
            sql("SELEC 1;"),
            Err(CoreError::Generation("down".into())),
        ]);
        let retriever = StubRetriever::with_schemas(vec!["CREATE TABLE m (a INT);".into()]);
        let store = ScriptedStore::always_failing();

        let outcome = pipeline(completion, retriever, store, 1).run("q").await;

        assert!(!outcome.success);
        assert!(!outcome.answer.is_empty());
        assert!(outcome.answer.contains("could not be executed"));
    }

    #[tokio::test]
    async fn cache_hit_skips_the_generation_call() {
        let cache_config = CacheConfig {
            enabled: true,
            ttl: std::time::Duration::from_secs(60),
            max_entries: 16,
        };

        // First run populates the cache.
        let first = Pipeline::new(
            ScriptedCompletion::new(vec![sql("SELECT 42;"), answer("a")]),
            StubRetriever::with_schemas(vec!["s".into()]),
            ScriptedStore::new(vec![Ok(())], vec![Ok("[]".into())]),
            SqlCache::new(&cache_config),
            3,
        );
        let outcome = first.run("cached question").await;
        assert!(outcome.success);

        // Second run over the same cache: only the answer call hits the
        // completion service.
        let completion = ScriptedCompletion::new(vec![answer("b")]);
        let calls = Arc::clone(&completion.calls);
        let Pipeline { cache, .. } = first;
        let second = Pipeline::new(
            completion,
            StubRetriever::with_schemas(vec!["s".into()]),
            ScriptedStore::new(vec![Ok(())], vec![Ok("[]".into())]),
            cache,
            3,
        );

        let outcome = second.run("cached question").await;
        assert!(outcome.success);
        assert_eq!(outcome.retry_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
