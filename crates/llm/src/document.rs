use docrefine_common::{DocRefineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::prompt::{Inputs, PromptTemplate};

/// Template variable that resolves to [`Document::page_content`]
pub const PAGE_CONTENT_KEY: &str = "page_content";

/// A unit of text plus metadata, the input to one refine step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document text
    pub page_content: String,

    /// Arbitrary metadata, addressable from document templates by key
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Document {
    /// Create document without metadata
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata value
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Template used when the caller does not supply one: the bare page content
pub fn default_document_prompt() -> PromptTemplate {
    PromptTemplate::single_variable(PAGE_CONTENT_KEY)
}

/// Render one document through a document template
///
/// `page_content` is taken from the document body, every other variable from
/// its metadata. String metadata is inserted as-is, anything else as JSON.
pub fn format_document(document: &Document, prompt: &PromptTemplate) -> Result<String> {
    let mut values = Inputs::new();
    let mut missing = Vec::new();

    for name in prompt.input_variables() {
        if name == PAGE_CONTENT_KEY {
            values.insert(name.clone(), document.page_content.clone());
            continue;
        }

        match document.metadata.get(name) {
            Some(Value::String(s)) => {
                values.insert(name.clone(), s.clone());
            }
            Some(other) => {
                values.insert(name.clone(), other.to_string());
            }
            None => missing.push(name.as_str()),
        }
    }

    if !missing.is_empty() {
        return Err(DocRefineError::template(format!(
            "Document template requires metadata variables {:?}, which the document does not have",
            missing
        )));
    }

    prompt.format(&values)
}
