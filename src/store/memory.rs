use std::sync::{Mutex, MutexGuard};

use super::{not_finished, InferenceStore, PromptStore};
use crate::error::StoreResult;
use crate::model::{InferenceRecord, PersistedPrompt, ReviewPrompt};

#[derive(Debug, Default)]
struct MemoryState {
    prompts: Vec<PersistedPrompt>,
    inferences: Vec<InferenceRecord>,
    last_prompt_id: i64,
    last_inference_id: i64,
}

/// In-process store. Ids start at 1 and are shared across reviews.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records saved so far, in save order.
    pub fn inferences(&self) -> Vec<InferenceRecord> {
        self.lock().inferences.clone()
    }

    /// All prompts saved so far, in save order.
    pub fn prompts(&self) -> Vec<PersistedPrompt> {
        self.lock().prompts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PromptStore for MemoryStore {
    fn save(&self, review_id: i64, prompt: &ReviewPrompt) -> StoreResult<i64> {
        let mut state = self.lock();
        state.last_prompt_id += 1;
        let id = state.last_prompt_id;

        let mut stored = prompt.clone();
        stored.id = id;
        state.prompts.push(PersistedPrompt {
            id,
            review_id,
            prompt: stored,
        });
        Ok(id)
    }

    fn find_not_finished_by_review_id(&self, review_id: i64) -> StoreResult<Vec<PersistedPrompt>> {
        let state = self.lock();
        let prompts = state
            .prompts
            .iter()
            .filter(|prompt| prompt.review_id == review_id)
            .cloned()
            .collect();
        let inferences: Vec<InferenceRecord> = state
            .inferences
            .iter()
            .filter(|record| record.review_id == review_id)
            .cloned()
            .collect();
        Ok(not_finished(prompts, &inferences))
    }
}

impl InferenceStore for MemoryStore {
    fn save(&self, record: &InferenceRecord) -> StoreResult<i64> {
        let mut state = self.lock();
        state.last_inference_id += 1;
        let id = state.last_inference_id;

        let mut stored = record.clone();
        stored.id = id;
        state.inferences.push(stored);
        Ok(id)
    }

    fn find_by_review_id(&self, review_id: i64) -> StoreResult<Vec<InferenceRecord>> {
        Ok(self
            .lock()
            .inferences
            .iter()
            .filter(|record| record.review_id == review_id)
            .cloned()
            .collect())
    }
}
