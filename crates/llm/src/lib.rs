//! DocRefine LLM integration
//!
//! Ollama client, prompt templates, documents and the refine chains that
//! combine a list of documents into one answer

mod chunking;
mod client;
mod document;
mod llm_trait;
mod prompt;
mod prompts;
mod refine;
mod types;

#[cfg(test)]
mod testing;

pub use chunking::{chunk_text, split_into_documents, split_paragraphs, TextChunk};
pub use client::OllamaClient;
pub use document::{default_document_prompt, format_document, Document, PAGE_CONTENT_KEY};
pub use llm_trait::LanguageModel;
pub use prompt::{Inputs, PromptTemplate};
pub use prompts::{
    question_prompts, summarize_prompts, QUESTION_INITIAL_PROMPT, QUESTION_REFINE_PROMPT,
    SUMMARIZE_DOCUMENT_VARIABLE, SUMMARIZE_INITIAL_PROMPT, SUMMARIZE_REFINE_PROMPT, SUMMARIZE_RESPONSE_VARIABLE,
};
pub use refine::{
    create_refine_documents_chain, CombineDocuments, ExtraInputs, RefineChainConfig, RefineDocumentsChain,
    RefineDocumentsPipeline, RefineOutput, DEFAULT_INITIAL_RESPONSE_NAME, DOCUMENTS_KEY, INTERMEDIATE_STEPS_KEY,
    OUTPUT_KEY, OUTPUT_TEXT_KEY,
};
pub use types::{GenerateOptions, GenerateRequest, GenerateResponse};
