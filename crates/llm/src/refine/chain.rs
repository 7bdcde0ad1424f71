use async_trait::async_trait;
use docrefine_common::{DocRefineError, Result};
use std::sync::Arc;
use tracing::{info_span, Instrument};

use super::{check_extra_inputs, run_refine_loop, CombineDocuments, ExtraInputs, RefineOutput, RefineStep};
use crate::document::{default_document_prompt, Document};
use crate::llm_trait::LanguageModel;
use crate::prompt::PromptTemplate;

/// Default variable name for the previous answer in the refine prompt
pub const DEFAULT_INITIAL_RESPONSE_NAME: &str = "existing_answer";

/// Output field holding the final answer
pub const OUTPUT_TEXT_KEY: &str = "output_text";

/// Settings for [`RefineDocumentsChain`]
#[derive(Debug, Clone)]
pub struct RefineChainConfig {
    /// Variable the formatted document goes in. Inferred from the initial
    /// prompt when it has exactly one input variable.
    pub document_variable_name: Option<String>,

    /// Variable the previous answer goes in on refine steps
    pub initial_response_name: String,

    /// Template turning each document into text
    pub document_prompt: PromptTemplate,

    /// Report every step's output in the result
    pub return_intermediate_steps: bool,
}

impl Default for RefineChainConfig {
    fn default() -> Self {
        Self {
            document_variable_name: None,
            initial_response_name: DEFAULT_INITIAL_RESPONSE_NAME.to_string(),
            document_prompt: default_document_prompt(),
            return_intermediate_steps: false,
        }
    }
}

impl RefineChainConfig {
    pub fn with_document_variable_name(mut self, name: impl Into<String>) -> Self {
        self.document_variable_name = Some(name.into());
        self
    }

    pub fn with_initial_response_name(mut self, name: impl Into<String>) -> Self {
        self.initial_response_name = name.into();
        self
    }

    pub fn with_document_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.document_prompt = prompt;
        self
    }

    pub fn with_intermediate_steps(mut self, enabled: bool) -> Self {
        self.return_intermediate_steps = enabled;
        self
    }
}

/// Refine chain with configurable variable names
///
/// The first document is passed to `initial_prompt` under the document
/// variable. Every later document is passed to `refine_prompt` under the same
/// variable, together with the previous answer under `initial_response_name`.
/// Extra inputs given at call time reach every step unchanged.
pub struct RefineDocumentsChain {
    llm: Arc<dyn LanguageModel>,
    initial: RefineStep,
    refine: RefineStep,
    document_variable_name: String,
    initial_response_name: String,
    document_prompt: PromptTemplate,
    return_intermediate_steps: bool,
}

impl RefineDocumentsChain {
    /// Validate the prompts against the configuration and build the chain
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        initial_prompt: PromptTemplate,
        refine_prompt: PromptTemplate,
        config: RefineChainConfig,
    ) -> Result<Self> {
        let document_variable_name =
            resolve_document_variable(&initial_prompt, config.document_variable_name)?;
        let initial_response_name = config.initial_response_name;

        if initial_response_name == document_variable_name {
            return Err(DocRefineError::config(format!(
                "initial_response_name and document_variable_name are both '{}'",
                initial_response_name
            )));
        }

        for name in [&document_variable_name, &initial_response_name] {
            if !refine_prompt.accepts(name) {
                return Err(DocRefineError::config(format!(
                    "refine prompt must accept '{}' as an input variable, found {:?}",
                    name,
                    refine_prompt.input_variables()
                )));
            }
        }

        Ok(Self {
            llm,
            initial: RefineStep::initial(initial_prompt, document_variable_name.clone()),
            refine: RefineStep::refine(refine_prompt, document_variable_name.clone(), initial_response_name.clone()),
            document_variable_name,
            initial_response_name,
            document_prompt: config.document_prompt,
            return_intermediate_steps: config.return_intermediate_steps,
        })
    }

    pub fn document_variable_name(&self) -> &str {
        &self.document_variable_name
    }

    pub fn initial_response_name(&self) -> &str {
        &self.initial_response_name
    }

    /// Keys present in every result of this chain
    pub fn output_keys(&self) -> Vec<&'static str> {
        let mut keys = vec![OUTPUT_TEXT_KEY];
        if self.return_intermediate_steps {
            keys.push(super::INTERMEDIATE_STEPS_KEY);
        }
        keys
    }
}

#[async_trait]
impl CombineDocuments for RefineDocumentsChain {
    async fn combine_docs(&self, documents: &[Document], extra: &ExtraInputs) -> Result<RefineOutput> {
        check_extra_inputs(
            extra,
            &[self.document_variable_name.as_str(), self.initial_response_name.as_str()],
        )?;

        let steps = run_refine_loop(
            self.llm.as_ref(),
            &self.document_prompt,
            &self.initial,
            &self.refine,
            documents,
            extra,
        )
        .instrument(info_span!("refine_documents_chain"))
        .await?;

        RefineOutput::assemble(steps, self.return_intermediate_steps)
    }
}

fn resolve_document_variable(initial_prompt: &PromptTemplate, explicit: Option<String>) -> Result<String> {
    let variables = initial_prompt.input_variables();
    match explicit {
        Some(name) if initial_prompt.accepts(&name) => Ok(name),
        Some(name) => Err(DocRefineError::config(format!(
            "document_variable_name {} was not found in the initial prompt's input variables: {:?}",
            name, variables
        ))),
        None if variables.len() == 1 => Ok(variables[0].clone()),
        None => Err(DocRefineError::config(format!(
            "document_variable_name must be provided if the initial prompt has {} input variables: {:?}",
            variables.len(),
            variables
        ))),
    }
}
