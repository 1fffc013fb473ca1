//! Builds the prompts a dispatch will process.

use std::sync::Arc;

use tracing::info;

use crate::error::EngineResult;
use crate::model::{PersistedPrompt, ReviewPrompt, RunContext, WorkUnit};
use crate::store::PromptStore;

/// Creates prompts for a fresh run, or reloads the unfinished ones when a
/// run resumes.
#[derive(Clone)]
pub struct PromptMaterializer {
    store: Arc<dyn PromptStore>,
}

impl PromptMaterializer {
    pub fn new(store: Arc<dyn PromptStore>) -> Self {
        Self { store }
    }

    /// Prompts to dispatch, in processing order.
    ///
    /// A fresh run persists one prompt per unit, in unit order. A resumed run
    /// ignores `units` and returns every prompt of the review that has no
    /// FINISHED inference, ascending by id.
    pub fn create(
        &self,
        context: &RunContext,
        units: &[WorkUnit],
        use_reasoning: bool,
    ) -> EngineResult<Vec<ReviewPrompt>> {
        if !context.is_new_run {
            let prompts: Vec<ReviewPrompt> = self
                .store
                .find_not_finished_by_review_id(context.review_id)?
                .into_iter()
                .map(PersistedPrompt::into_prompt)
                .collect();
            info!(
                review_id = context.review_id,
                run_id = context.run_id,
                prompts = prompts.len(),
                "Resuming unfinished prompts"
            );
            return Ok(prompts);
        }

        let mut prompts = Vec::with_capacity(units.len());
        for unit in units {
            let mut prompt = ReviewPrompt::from_work_unit(unit, use_reasoning);
            prompt.id = self.store.save(context.review_id, &prompt)?;
            prompts.push(prompt);
        }
        info!(
            review_id = context.review_id,
            run_id = context.run_id,
            prompts = prompts.len(),
            "Created prompts"
        );
        Ok(prompts)
    }
}
