use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rules::Severity;
use super::RunContext;

/// Token usage reported by the provider for one call. Providers may omit
/// any field; a missing field counts as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUsage {
    pub completion_tokens: Option<u64>,
    pub prompt_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl CompletionUsage {
    pub fn new(completion_tokens: u64, prompt_tokens: u64, total_tokens: u64) -> Self {
        Self {
            completion_tokens: Some(completion_tokens),
            prompt_tokens: Some(prompt_tokens),
            total_tokens: Some(total_tokens),
        }
    }

    /// Usage with every field explicitly zero.
    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Running token totals. Never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeUsage {
    pub completion_tokens: u64,
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

impl CumulativeUsage {
    pub fn new(completion_tokens: u64, prompt_tokens: u64, total_tokens: u64) -> Self {
        Self {
            completion_tokens,
            prompt_tokens,
            total_tokens,
        }
    }

    /// Add one call's usage, treating missing fields as zero.
    pub fn add(&mut self, usage: &CompletionUsage) {
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(usage.completion_tokens.unwrap_or(0));
        self.prompt_tokens = self
            .prompt_tokens
            .saturating_add(usage.prompt_tokens.unwrap_or(0));
        self.total_tokens = self
            .total_tokens
            .saturating_add(usage.total_tokens.unwrap_or(0));
    }

    /// Raise each field to at least the given call's usage.
    pub fn raise_to(&mut self, usage: &CompletionUsage) {
        self.completion_tokens = self
            .completion_tokens
            .max(usage.completion_tokens.unwrap_or(0));
        self.prompt_tokens = self.prompt_tokens.max(usage.prompt_tokens.unwrap_or(0));
        self.total_tokens = self.total_tokens.max(usage.total_tokens.unwrap_or(0));
    }
}

/// A finding reported against one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewedComment {
    pub rule_code: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Findings for one reviewed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewedFile {
    pub file_id: u32,
    pub path: PathBuf,
    #[serde(default)]
    pub comments: Vec<ReviewedComment>,
}

/// Reasoning text the provider emitted while reviewing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_code: Option<String>,
    pub text: String,
}

/// The structured result of reviewing one prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    #[serde(default)]
    pub files: Vec<ReviewedFile>,
    #[serde(default)]
    pub think_steps: Vec<ThinkStep>,
    #[serde(default)]
    pub completion_usage: Option<CompletionUsage>,
}

impl ReviewOutcome {
    /// Payload recorded for a failed call: no findings, only usage.
    pub fn failed(usage: CompletionUsage) -> Self {
        Self {
            files: Vec::new(),
            think_steps: Vec::new(),
            completion_usage: Some(usage),
        }
    }

    pub fn comment_count(&self) -> usize {
        self.files.iter().map(|file| file.comments.len()).sum()
    }
}

/// Terminal status of one inference attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InferenceStatus {
    Finished,
    Failed,
}

impl InferenceStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            InferenceStatus::Finished => "FINISHED",
            InferenceStatus::Failed => "FAILED",
        }
    }
}

/// Persisted outcome of one prompt attempt within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRecord {
    /// Assigned by the inference store; 0 until saved.
    #[serde(default)]
    pub id: i64,
    pub run_id: i64,
    pub review_id: i64,
    pub prompt_id: i64,
    pub status: InferenceStatus,
    pub payload: ReviewOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl InferenceRecord {
    pub fn new(
        context: &RunContext,
        prompt_id: i64,
        status: InferenceStatus,
        payload: ReviewOutcome,
    ) -> Self {
        Self {
            id: 0,
            run_id: context.run_id,
            review_id: context.review_id,
            prompt_id,
            status,
            payload,
            recorded_at: Utc::now(),
        }
    }

    pub fn finished(context: &RunContext, prompt_id: i64, payload: ReviewOutcome) -> Self {
        Self::new(context, prompt_id, InferenceStatus::Finished, payload)
    }

    pub fn failed(context: &RunContext, prompt_id: i64, usage: CompletionUsage) -> Self {
        Self::new(
            context,
            prompt_id,
            InferenceStatus::Failed,
            ReviewOutcome::failed(usage),
        )
    }
}
