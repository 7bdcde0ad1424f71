//! In-memory model for chain tests

use async_trait::async_trait;
use docrefine_common::{DocRefineError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::llm_trait::LanguageModel;

/// Replies with a fixed script and records every prompt it receives
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub(crate) fn new<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_replies(replies.into_iter().map(|r| Ok(r.to_string())))
    }

    /// Script where the call at `fail_at` (0-based) returns an error
    pub(crate) fn failing_at<'a>(replies: impl IntoIterator<Item = &'a str>, fail_at: usize) -> Self {
        Self::from_replies(replies.into_iter().enumerate().map(|(i, r)| {
            if i == fail_at {
                Err(format!("model unavailable on call {}", i))
            } else {
                Ok(r.to_string())
            }
        }))
    }

    fn from_replies(replies: impl IntoIterator<Item = std::result::Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before every reply
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(DocRefineError::llm(msg)),
            None => Err(DocRefineError::llm("script exhausted")),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
