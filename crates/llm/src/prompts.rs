//! Default prompt templates for summarization and question answering

use crate::prompt::PromptTemplate;

/// Initial summary prompt; the document goes in `{{ text }}`
pub const SUMMARIZE_INITIAL_PROMPT: &str = "Write a concise summary of the following:


\"{{ text }}\"


CONCISE SUMMARY:";

/// Refine summary prompt; `{{ existing_answer }}` is the summary so far
pub const SUMMARIZE_REFINE_PROMPT: &str = "Your job is to produce a final summary.
We have provided an existing summary up to a certain point: {{ existing_answer }}
We have the opportunity to refine the existing summary (only if needed) with some more context below.
------------
{{ text }}
------------
Given the new context, refine the original summary.
If the context isn't useful, return the original summary.";

/// Initial answer prompt for the `context`/`output` pipeline
pub const QUESTION_INITIAL_PROMPT: &str = "Context information is below.
---------------------
{{ context }}
---------------------
Given the context information and no prior knowledge, answer the question: {{ question }}
";

/// Refine answer prompt for the `context`/`output` pipeline
pub const QUESTION_REFINE_PROMPT: &str = "The original question is as follows: {{ question }}
We have provided an existing answer: {{ output }}
We have the opportunity to refine the existing answer (only if needed) with some more context below.
------------
{{ context }}
------------
Given the new context, refine the original answer to better answer the question. If the context isn't useful, return the original answer.";

/// Variable holding each document in the summarize prompts
pub const SUMMARIZE_DOCUMENT_VARIABLE: &str = "text";

/// Variable holding the running summary in the summarize refine prompt
pub const SUMMARIZE_RESPONSE_VARIABLE: &str = "existing_answer";

/// Parsed (initial, refine) summarize prompts
pub fn summarize_prompts() -> (PromptTemplate, PromptTemplate) {
    (
        parse_builtin(SUMMARIZE_INITIAL_PROMPT),
        parse_builtin(SUMMARIZE_REFINE_PROMPT),
    )
}

/// Parsed (initial, refine) question-answering prompts
pub fn question_prompts() -> (PromptTemplate, PromptTemplate) {
    (
        parse_builtin(QUESTION_INITIAL_PROMPT),
        parse_builtin(QUESTION_REFINE_PROMPT),
    )
}

fn parse_builtin(text: &str) -> PromptTemplate {
    match PromptTemplate::new(text) {
        Ok(prompt) => prompt,
        Err(e) => unreachable!("built-in prompt does not parse: {}", e),
    }
}
