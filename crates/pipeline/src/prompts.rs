//! Prompt construction for SQL generation and answer synthesis.
//!
//! The exact wording is deliberately plain; the pipeline's behavior does not
//! depend on it beyond the fenced-SQL output contract.

use crate::state::PipelineState;

/// Build the SQL-generation prompt from schema context, optional exemplar
/// statements, and the previous attempt's error, if any.
pub fn sql_generation(state: &PipelineState) -> String {
    let schema = state.schema_examples.join("\n\n");

    let mut reference = String::new();
    if !state.sample_queries.is_empty() {
        reference.push_str("Example queries for similar questions:\n");
        for sample in &state.sample_queries {
            reference.push_str("```sql\n");
            reference.push_str(sample);
            reference.push_str("\n```\n");
        }
    }

    let mut question = state.original_query.clone();
    if let Some(error) = &state.error_message {
        question.push_str(&format!(
            "\n\nPrevious SQL execution failed with error:\n{error}\n\
             Analyze the error and correct the column names, table names, or syntax accordingly."
        ));
    }

    format!(
        "Task Overview:\n\
         You are a data science expert. Below, you are provided with a database schema \
         and a natural language question. Your task is to understand the schema and \
         generate a valid SQL query to answer the question.\n\n\
         Database Engine:\nPostgreSQL\n\n\
         Database Schema:\n{schema}\n\n\
         Reference information:\n{reference}\n\
         Question:\n{question}\n\n\
         Instructions:\n\
         - Accurately reflect the user's specific request.\n\
         - Strictly use the given database schema; do not invent column or table names.\n\
         - Produce one complete query ending with a semicolon.\n\
         - Do not include explanations or incomplete queries.\n\
         - Pay attention to hints in error messages (e.g. \"Perhaps you meant to reference the column...\").\n\n\
         Output Format:\n\
         Enclose the generated SQL query in a code block:\n\
         ```sql\n\
         -- Your SQL query\n\
         ```"
    )
}

/// Prompt for a results-based natural-language answer.
pub fn result_answer(state: &PipelineState) -> String {
    format!(
        "Generate a natural-language answer to the user's question based on the SQL \
         execution result.\n\n\
         User question: {question}\n\n\
         Executed SQL query:\n{sql}\n\n\
         Query execution result:\n{result}\n\n\
         Guidelines:\n\
         - Explain the result so the user can understand it without reading SQL.\n\
         - If the result is empty, say that no data matched the conditions.\n\
         - Use a markdown table when listing multiple rows.\n\
         - Show stock names together with stock codes where available.\n\n\
         Answer:",
        question = state.original_query,
        sql = state.final_query,
        result = state.query_result,
    )
}

/// Prompt for an error-based explanation when execution ultimately failed.
pub fn error_answer(state: &PipelineState) -> String {
    format!(
        "The SQL query for the user's question could not be executed. Explain what \
         went wrong and suggest an alternative if possible.\n\n\
         User question: {question}\n\n\
         Attempted SQL query:\n{sql}\n\n\
         Error message:\n{error}\n\n\
         Guidelines:\n\
         - Briefly explain why the error occurred.\n\
         - Suggest how the user might rephrase the question.\n\
         - Use plain language; do not show stack traces.\n\n\
         Answer:",
        question = state.original_query,
        sql = state.final_query,
        error = state.error_message.as_deref().unwrap_or("unknown error"),
    )
}

/// Templated answer used when the completion service itself fails at the
/// synthesis stage. Always non-empty.
pub fn fallback_answer(state: &PipelineState) -> String {
    match &state.error_message {
        Some(error) => format!(
            "Sorry - the query for your question could not be executed.\n\n\
             Error detail: {error}\n\n\
             Please try again with different conditions."
        ),
        None => format!("Query result: {}", state.query_result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(question: &str) -> PipelineState {
        let mut state = PipelineState::new(question);
        state.schema_examples = vec!["CREATE TABLE t (a INT);".into()];
        state
    }

    #[test]
    fn generation_prompt_carries_schema_and_question() {
        let prompt = sql_generation(&state_with("top 5 stocks"));
        assert!(prompt.contains("CREATE TABLE t (a INT);"));
        assert!(prompt.contains("top 5 stocks"));
        assert!(prompt.contains("```sql"));
    }

    #[test]
    fn generation_prompt_includes_prior_error() {
        let mut state = state_with("top 5 stocks");
        state.error_message = Some("column \"marketcap\" does not exist".into());
        let prompt = sql_generation(&state);
        assert!(prompt.contains("column \"marketcap\" does not exist"));
    }

    #[test]
    fn generation_prompt_includes_samples_on_retry() {
        let mut state = state_with("top 5 stocks");
        state.sample_queries = vec!["SELECT 1;".into()];
        let prompt = sql_generation(&state);
        assert!(prompt.contains("Example queries"));
        assert!(prompt.contains("SELECT 1;"));
    }

    #[test]
    fn fallback_answer_is_never_empty() {
        let mut state = state_with("q");
        assert!(!fallback_answer(&state).is_empty());
        state.error_message = Some("boom".into());
        assert!(fallback_answer(&state).contains("boom"));
    }
}
