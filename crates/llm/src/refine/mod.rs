//! Refine strategy: answer from the first document, then update the answer
//! once per remaining document.
//!
//! Two facades share one sequencer:
//! - [`RefineDocumentsChain`]: configurable variable names and optional
//!   intermediate steps
//! - [`create_refine_documents_chain`]: fixed `context`/`output` variables,
//!   always reports intermediate steps

mod chain;
mod pipeline;

pub use chain::{RefineChainConfig, RefineDocumentsChain, DEFAULT_INITIAL_RESPONSE_NAME, OUTPUT_TEXT_KEY};
pub use pipeline::{create_refine_documents_chain, RefineDocumentsPipeline};

use async_trait::async_trait;
use docrefine_common::{DocRefineError, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::document::{format_document, Document};
use crate::llm_trait::LanguageModel;
use crate::prompt::{Inputs, PromptTemplate};

/// Variable the pipeline puts each formatted document in
pub const DOCUMENTS_KEY: &str = "context";

/// Variable the pipeline puts the previous answer in
pub const OUTPUT_KEY: &str = "output";

/// Result field holding every step's output
pub const INTERMEDIATE_STEPS_KEY: &str = "intermediate_steps";

/// Extra named values merged into every step's prompt inputs
pub type ExtraInputs = Inputs;

/// Final answer of a refine run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineOutput {
    /// Output of the last step
    pub output: String,

    /// Output of every step in document order, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate_steps: Option<Vec<String>>,
}

impl RefineOutput {
    /// Package the collected step outputs
    pub(crate) fn assemble(steps: Vec<String>, return_intermediate_steps: bool) -> Result<Self> {
        let output = steps.last().cloned().ok_or(DocRefineError::EmptyDocuments)?;
        Ok(Self {
            output,
            intermediate_steps: return_intermediate_steps.then_some(steps),
        })
    }
}

/// One model call: format a document, fill the prompt, generate
#[derive(Debug, Clone)]
pub(crate) struct RefineStep {
    prompt: PromptTemplate,
    document_variable: String,
    /// Where the previous answer goes; `None` for the initial step
    response_variable: Option<String>,
}

impl RefineStep {
    pub(crate) fn initial(prompt: PromptTemplate, document_variable: impl Into<String>) -> Self {
        Self {
            prompt,
            document_variable: document_variable.into(),
            response_variable: None,
        }
    }

    pub(crate) fn refine(
        prompt: PromptTemplate,
        document_variable: impl Into<String>,
        response_variable: impl Into<String>,
    ) -> Self {
        Self {
            prompt,
            document_variable: document_variable.into(),
            response_variable: Some(response_variable.into()),
        }
    }

    fn build_inputs(
        &self,
        document: &Document,
        document_prompt: &PromptTemplate,
        previous: Option<&str>,
        extra: &ExtraInputs,
    ) -> Result<Inputs> {
        let mut inputs = extra.clone();
        inputs.insert(self.document_variable.clone(), format_document(document, document_prompt)?);
        if let (Some(name), Some(previous)) = (&self.response_variable, previous) {
            inputs.insert(name.clone(), previous.to_string());
        }
        Ok(inputs)
    }

    async fn run(
        &self,
        llm: &dyn LanguageModel,
        document: &Document,
        document_prompt: &PromptTemplate,
        previous: Option<&str>,
        extra: &ExtraInputs,
    ) -> Result<String> {
        let inputs = self.build_inputs(document, document_prompt, previous, extra)?;
        let prompt = self.prompt.format(&inputs)?;
        debug!("Prompt length: {} chars", prompt.len());
        llm.generate(&prompt).await
    }
}

/// Run the initial step on the first document and a refine step on each
/// remaining one, strictly in order. Returns every step's output.
pub(crate) async fn run_refine_loop(
    llm: &dyn LanguageModel,
    document_prompt: &PromptTemplate,
    initial: &RefineStep,
    refine: &RefineStep,
    documents: &[Document],
    extra: &ExtraInputs,
) -> Result<Vec<String>> {
    let (first, rest) = documents.split_first().ok_or(DocRefineError::EmptyDocuments)?;

    info!(
        "Starting refine run - Documents: {}, Model: {}",
        documents.len(),
        llm.model_name()
    );

    let mut steps = Vec::with_capacity(documents.len());

    let mut answer = initial
        .run(llm, first, document_prompt, None, extra)
        .instrument(info_span!("initial_response"))
        .await?;
    steps.push(answer.clone());

    for (index, document) in rest.iter().enumerate() {
        let iteration = index + 1;
        debug!("Refining with document {}/{}", iteration + 1, documents.len());
        let refined = refine
            .run(llm, document, document_prompt, Some(&answer), extra)
            .instrument(info_span!("refine_step", iteration))
            .await?;
        steps.push(refined.clone());
        answer = refined;
    }

    info!("Refine run finished - Steps: {}", steps.len());
    Ok(steps)
}

/// Reject extra inputs that would shadow a variable the chain fills itself
pub(crate) fn check_extra_inputs(extra: &ExtraInputs, reserved: &[&str]) -> Result<()> {
    let clashes: Vec<&str> = reserved
        .iter()
        .copied()
        .filter(|name| extra.contains_key(*name))
        .collect();

    if clashes.is_empty() {
        Ok(())
    } else {
        Err(DocRefineError::invalid_input(format!(
            "Extra inputs {:?} collide with variables filled by the chain",
            clashes
        )))
    }
}

/// Combine an ordered list of documents into one answer
#[async_trait]
pub trait CombineDocuments: Send + Sync {
    /// Run the chain over `documents`, passing `extra` to every step
    async fn combine_docs(&self, documents: &[Document], extra: &ExtraInputs) -> Result<RefineOutput>;

    /// Like [`CombineDocuments::combine_docs`], aborting the in-flight step
    /// when `token` is cancelled. A cancelled run yields no partial output.
    async fn combine_docs_cancellable(
        &self,
        documents: &[Document],
        extra: &ExtraInputs,
        token: CancellationToken,
    ) -> Result<RefineOutput> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Refine run cancelled");
                Err(DocRefineError::Cancelled)
            }
            result = self.combine_docs(documents, extra) => result,
        }
    }

    /// Blocking entry point. Drives the same run on a private current-thread
    /// runtime, so it must not be called from inside an async context.
    fn combine_docs_blocking(&self, documents: &[Document], extra: &ExtraInputs) -> Result<RefineOutput> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.combine_docs(documents, extra))
    }
}
