//! Prompt and inference persistence.
//!
//! Two backends are provided: [`MemoryStore`] for tests and short-lived
//! runs, and [`FileStore`], which keeps JSON-lines files per review so an
//! interrupted run can be resumed by a later process.

mod config;
mod file;
mod memory;

pub use config::{FileStoreConfig, DEFAULT_RETENTION_DAYS, RETENTION_ENV_VAR};
pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::HashSet;

use crate::error::StoreResult;
use crate::model::{InferenceRecord, InferenceStatus, PersistedPrompt, ReviewPrompt};

/// Storage for prompts built during planning.
pub trait PromptStore: Send + Sync {
    /// Persist a prompt for `review_id` and return its assigned id.
    /// Ids increase in save order.
    fn save(&self, review_id: i64, prompt: &ReviewPrompt) -> StoreResult<i64>;

    /// Prompts of the review without a FINISHED inference, ascending by id.
    fn find_not_finished_by_review_id(&self, review_id: i64) -> StoreResult<Vec<PersistedPrompt>>;
}

/// Storage for per-prompt inference outcomes.
pub trait InferenceStore: Send + Sync {
    /// Persist a record and return its assigned id.
    fn save(&self, record: &InferenceRecord) -> StoreResult<i64>;

    /// All records of the review, in save order.
    fn find_by_review_id(&self, review_id: i64) -> StoreResult<Vec<InferenceRecord>>;
}

/// Keep prompts that have no FINISHED record, sorted by id.
fn not_finished(
    mut prompts: Vec<PersistedPrompt>,
    inferences: &[InferenceRecord],
) -> Vec<PersistedPrompt> {
    let finished: HashSet<i64> = inferences
        .iter()
        .filter(|record| record.status == InferenceStatus::Finished)
        .map(|record| record.prompt_id)
        .collect();

    prompts.retain(|prompt| !finished.contains(&prompt.id));
    prompts.sort_by_key(|prompt| prompt.id);
    prompts
}
