use async_trait::async_trait;
use docrefine_common::{DocRefineError, Result};
use std::sync::Arc;
use tracing::{info_span, Instrument};

use super::{
    check_extra_inputs, run_refine_loop, CombineDocuments, ExtraInputs, RefineOutput, RefineStep, DOCUMENTS_KEY,
    INTERMEDIATE_STEPS_KEY, OUTPUT_KEY,
};
use crate::document::{default_document_prompt, Document};
use crate::llm_trait::LanguageModel;
use crate::prompt::PromptTemplate;

/// Refine pipeline with fixed variable names
///
/// Built by [`create_refine_documents_chain`]. Documents go in `context`, the
/// running answer in `output`. Every result carries its intermediate steps.
pub struct RefineDocumentsPipeline {
    llm: Arc<dyn LanguageModel>,
    initial: RefineStep,
    refine: RefineStep,
    document_prompt: PromptTemplate,
}

/// Build a pipeline that feeds documents to `llm` one at a time and updates
/// the output.
///
/// `initial_prompt` must accept `context`; `refine_prompt` must accept
/// `context` and `output`. `document_prompt` defaults to the bare page
/// content.
pub fn create_refine_documents_chain(
    llm: Arc<dyn LanguageModel>,
    initial_prompt: PromptTemplate,
    refine_prompt: PromptTemplate,
    document_prompt: Option<PromptTemplate>,
) -> Result<RefineDocumentsPipeline> {
    validate_prompt(&initial_prompt, &[DOCUMENTS_KEY])?;
    validate_prompt(&refine_prompt, &[DOCUMENTS_KEY, OUTPUT_KEY])?;

    Ok(RefineDocumentsPipeline {
        llm,
        initial: RefineStep::initial(initial_prompt, DOCUMENTS_KEY),
        refine: RefineStep::refine(refine_prompt, DOCUMENTS_KEY, OUTPUT_KEY),
        document_prompt: document_prompt.unwrap_or_else(default_document_prompt),
    })
}

fn validate_prompt(prompt: &PromptTemplate, expected: &[&str]) -> Result<()> {
    let missing: Vec<&str> = expected.iter().copied().filter(|key| !prompt.accepts(key)).collect();
    if missing.is_empty() {
        return Ok(());
    }

    Err(DocRefineError::config(format!(
        "Prompt must accept {:?} as input variables. Received prompt with input variables: {:?}",
        missing,
        prompt.input_variables()
    )))
}

impl RefineDocumentsPipeline {
    /// Run over `documents`; `extra` holds any other named values the
    /// prompts reference, e.g. a question
    pub async fn invoke(&self, documents: &[Document], extra: &ExtraInputs) -> Result<RefineOutput> {
        self.combine_docs(documents, extra).await
    }
}

#[async_trait]
impl CombineDocuments for RefineDocumentsPipeline {
    async fn combine_docs(&self, documents: &[Document], extra: &ExtraInputs) -> Result<RefineOutput> {
        check_extra_inputs(extra, &[DOCUMENTS_KEY, OUTPUT_KEY, INTERMEDIATE_STEPS_KEY])?;

        let steps = run_refine_loop(
            self.llm.as_ref(),
            &self.document_prompt,
            &self.initial,
            &self.refine,
            documents,
            extra,
        )
        .instrument(info_span!("refine_documents_pipeline"))
        .await?;

        RefineOutput::assemble(steps, true)
    }
}
