use serde::Serialize;

/// Mutable record threaded through every pipeline stage.
///
/// Created fresh per incoming question and destroyed when the pipeline
/// returns; never shared across requests.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// The natural-language question, immutable once set.
    pub original_query: String,
    /// Retrieved or default schema snippets.
    pub schema_examples: Vec<String>,
    /// Retrieved exemplar SQL, populated only on retry.
    pub sample_queries: Vec<String>,
    /// Current best SQL candidate.
    pub final_query: String,
    /// Last failure detail; cleared on success, consumed as prompt context
    /// on the next generation attempt.
    pub error_message: Option<String>,
    /// Serialized execution output.
    pub query_result: String,
    /// Synthesized natural-language answer.
    pub final_answer: Option<String>,
    /// Generation attempts so far. Never decreases; once it reaches the
    /// retry budget no further generation attempts occur.
    pub retry_count: u32,
}

impl PipelineState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            original_query: question.into(),
            ..Default::default()
        }
    }
}

/// What one pipeline run produced, shaped for the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub generated_sql: Option<String>,
    /// Serialized result rows; present only on success.
    pub result: Option<String>,
    pub error_message: Option<String>,
    /// Natural-language answer; non-empty regardless of upstream failures.
    pub answer: String,
    pub retry_count: u32,
}

impl PipelineOutcome {
    /// Collapse terminal pipeline state into the response shape.
    pub fn from_state(state: PipelineState) -> Self {
        let success = state.error_message.is_none()
            && !state.final_query.is_empty()
            && !state.query_result.is_empty();
        Self {
            success,
            generated_sql: (!state.final_query.is_empty()).then_some(state.final_query),
            result: success.then_some(state.query_result),
            error_message: state.error_message,
            answer: state
                .final_answer
                .unwrap_or_else(|| "No answer was produced.".to_string()),
            retry_count: state.retry_count,
        }
    }
}
