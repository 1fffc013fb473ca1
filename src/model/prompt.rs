use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rules::Rule;
use super::WorkUnit;

/// Free-form instructions collected from each configuration level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTexts {
    #[serde(default)]
    pub system: Vec<String>,
    #[serde(default)]
    pub review: Vec<String>,
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default)]
    pub file_group: Vec<String>,
}

/// A file referenced by a prompt. `id` is the file's position within the
/// prompt, starting at 1, and is how findings refer back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptFile {
    pub id: u32,
    pub path: PathBuf,
    pub group_id: i64,
    pub target_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_page: Option<String>,
}

/// Bookkeeping about how the prompt was planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub group_id: i64,
    pub target_id: i64,
    pub planned_at: DateTime<Utc>,
}

/// The unit handed to a review processor.
///
/// `id` is 0 until the prompt store assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPrompt {
    #[serde(default)]
    pub id: i64,
    pub use_reasoning: bool,
    pub texts: PromptTexts,
    pub rules: Vec<Rule>,
    pub files: Vec<PromptFile>,
    pub execution_details: ExecutionDetails,
}

impl ReviewPrompt {
    /// Build an unsaved prompt for a work unit.
    ///
    /// Every file in a unit comes from one file group, so the group's
    /// prompt texts apply to the whole prompt.
    pub fn from_work_unit(unit: &WorkUnit, use_reasoning: bool) -> Self {
        let (texts, group_id, target_id) = unit
            .files
            .first()
            .map(|first| {
                (
                    first.group.prompts.clone(),
                    first.group.group_id,
                    first.group.target_id,
                )
            })
            .unwrap_or_default();

        let files = unit
            .files
            .iter()
            .zip(1u32..)
            .map(|(resolved, id)| PromptFile {
                id,
                path: resolved.path.clone(),
                group_id: resolved.group.group_id,
                target_id: resolved.group.target_id,
                code_page: resolved.group.code_page.clone(),
            })
            .collect();

        Self {
            id: 0,
            use_reasoning,
            texts,
            rules: unit.rules.clone(),
            files,
            execution_details: ExecutionDetails {
                group_id,
                target_id,
                planned_at: Utc::now(),
            },
        }
    }
}

/// A prompt as stored, keyed by its assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPrompt {
    pub id: i64,
    pub review_id: i64,
    pub prompt: ReviewPrompt,
}

impl PersistedPrompt {
    /// The stored prompt with its id restored.
    pub fn into_prompt(self) -> ReviewPrompt {
        let mut prompt = self.prompt;
        prompt.id = self.id;
        prompt
    }
}
