//! Persists the outcome of every processed prompt.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::balance::ClientHandle;
use crate::error::ProcessError;
use crate::model::{CompletionUsage, InferenceRecord, ReviewOutcome, ReviewPrompt, RunContext};
use crate::processor::{ChatCompletionConfig, MessageMapperConfig, ReviewProcessor};
use crate::store::InferenceStore;

/// Wraps a processor and records a FINISHED or FAILED inference for each
/// call, so a later run can skip finished prompts.
pub struct StatefulRecorder {
    inner: Arc<dyn ReviewProcessor>,
    store: Arc<dyn InferenceStore>,
}

impl StatefulRecorder {
    pub fn new(inner: Arc<dyn ReviewProcessor>, store: Arc<dyn InferenceStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl ReviewProcessor for StatefulRecorder {
    async fn process(
        &self,
        context: &RunContext,
        prompt: &ReviewPrompt,
        chat: &ChatCompletionConfig,
        mapper: &MessageMapperConfig,
        client: &ClientHandle,
    ) -> Result<ReviewOutcome, ProcessError> {
        match self
            .inner
            .process(context, prompt, chat, mapper, client)
            .await
        {
            Ok(outcome) => {
                let record = InferenceRecord::finished(context, prompt.id, outcome.clone());
                self.store.save(&record)?;
                debug!(
                    review_id = context.review_id,
                    run_id = context.run_id,
                    prompt_id = prompt.id,
                    comments = outcome.comment_count(),
                    "Recorded finished inference"
                );
                Ok(outcome)
            }
            Err(err) => {
                let usage = err
                    .partial_usage()
                    .copied()
                    .unwrap_or_else(CompletionUsage::zero);
                let record = InferenceRecord::failed(context, prompt.id, usage);
                if let Err(store_err) = self.store.save(&record) {
                    error!(
                        prompt_id = prompt.id,
                        error = %store_err,
                        "Failed to record failed inference"
                    );
                }
                warn!(
                    review_id = context.review_id,
                    run_id = context.run_id,
                    prompt_id = prompt.id,
                    error = %err,
                    "Inference failed"
                );
                Err(ProcessError::Inference {
                    prompt_id: prompt.id,
                    source: Box::new(err),
                })
            }
        }
    }
}
