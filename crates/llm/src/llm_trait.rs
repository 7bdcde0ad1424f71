use async_trait::async_trait;
use docrefine_common::Result;
use std::sync::Arc;

/// Text generation capability used by the refine chains
///
/// Implementations receive a fully formatted prompt and return the generated
/// text. Callers treat the returned text as opaque; no post-processing is
/// applied on the way back.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate text from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier, used for logging
    fn model_name(&self) -> &str;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
