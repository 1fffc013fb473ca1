//! The seam between the engine and a language-model provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::balance::ClientHandle;
use crate::error::ProcessError;
use crate::model::{ReviewOutcome, ReviewPrompt, RunContext};

/// Provider request parameters, passed through to the processor untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl ChatCompletionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

/// Settings for turning a prompt into provider messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMapperConfig {
    /// Prefix each source line with its number.
    #[serde(default)]
    pub number_lines: bool,
    /// Template for the file section header; `{path}` is replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_header_template: Option<String>,
}

/// Reviews one prompt with one client.
///
/// Implementations own the provider call and response parsing. Usage already
/// consumed when a call fails should be reported through
/// [`ProcessError::Provider::partial_usage`](ProcessError::Provider).
#[async_trait]
pub trait ReviewProcessor: Send + Sync {
    async fn process(
        &self,
        context: &RunContext,
        prompt: &ReviewPrompt,
        chat: &ChatCompletionConfig,
        mapper: &MessageMapperConfig,
        client: &ClientHandle,
    ) -> Result<ReviewOutcome, ProcessError>;
}
