//! Data types flowing through planning, dispatch and persistence.

mod outcome;
mod prompt;
mod resolved;
mod rules;

pub use outcome::{
    CompletionUsage, CumulativeUsage, InferenceRecord, InferenceStatus, ReviewOutcome,
    ReviewedComment, ReviewedFile, ThinkStep,
};
pub use prompt::{ExecutionDetails, PersistedPrompt, PromptFile, PromptTexts, ReviewPrompt};
pub use resolved::{FileGroupContext, ResolvedFileGroup, ResolvedFilePath, ResolvedTarget};
pub use rules::{Rule, Severity};

use serde::{Deserialize, Serialize};

/// Identity of one review invocation.
///
/// Created once by the caller and handed to every worker. `is_new_run`
/// decides whether prompts are built fresh or loaded for resumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub review_id: i64,
    pub run_id: i64,
    pub is_new_run: bool,
}

impl RunContext {
    /// Context for the first run of a review.
    pub fn fresh(review_id: i64, run_id: i64) -> Self {
        Self {
            review_id,
            run_id,
            is_new_run: true,
        }
    }

    /// Context for a run resuming an earlier, unfinished one.
    pub fn resumed(review_id: i64, run_id: i64) -> Self {
        Self {
            review_id,
            run_id,
            is_new_run: false,
        }
    }
}

/// One file batch paired with one rule batch; becomes one provider request.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub files: Vec<ResolvedFilePath>,
    pub rules: Vec<Rule>,
}
