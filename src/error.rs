//! Error types shared across the engine.
//!
//! Errors are split by who raises them:
//! - [`EngineError`] is what a dispatch or engine run returns to its caller.
//! - [`ProcessError`] is raised by a [`crate::processor::ReviewProcessor`]
//!   (the provider call, message mapping, or outcome persistence).
//! - [`StoreError`] is raised by the prompt and inference stores.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::model::CompletionUsage;
use crate::quota::QuotaViolation;

/// Errors raised by prompt and inference stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid review identifier.
    #[error("Invalid review ID: {0}")]
    InvalidReviewId(i64),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while processing a single prompt.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The provider call failed. Usage already consumed, if known, travels
    /// with the error so the failure record can account for it.
    #[error("provider request failed: {message}")]
    Provider {
        message: String,
        partial_usage: Option<CompletionUsage>,
    },

    /// The prompt could not be mapped to provider messages.
    #[error("message mapping failed: {0}")]
    Mapping(String),

    /// The outcome was produced but could not be persisted.
    #[error("failed to persist inference outcome: {0}")]
    Persistence(#[from] StoreError),

    /// A failure already recorded as FAILED for the given prompt.
    #[error("inference for prompt {prompt_id} failed: {source}")]
    Inference {
        prompt_id: i64,
        #[source]
        source: Box<ProcessError>,
    },
}

impl ProcessError {
    /// Create a provider failure without usage information.
    pub fn provider(message: impl Into<String>) -> Self {
        ProcessError::Provider {
            message: message.into(),
            partial_usage: None,
        }
    }

    /// Usage consumed before the failure, looking through wrapped errors.
    pub fn partial_usage(&self) -> Option<&CompletionUsage> {
        match self {
            ProcessError::Provider { partial_usage, .. } => partial_usage.as_ref(),
            ProcessError::Inference { source, .. } => source.partial_usage(),
            _ => None,
        }
    }
}

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid inputs or a plan that can never fit the configured quotas.
    Configuration,
    /// Token quota reached during dispatch.
    Quota,
    /// The dispatch deadline passed.
    Timeout,
    /// A task was cancelled before it produced a result.
    Cancelled,
    /// A task failed while executing.
    Execution,
    /// The dispatch was interrupted from outside.
    Interrupted,
    /// Prompt or inference persistence failed.
    Storage,
}

impl ErrorCategory {
    /// Stable label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Quota => "quota",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Execution => "execution",
            ErrorCategory::Interrupted => "interrupted",
            ErrorCategory::Storage => "storage",
        }
    }
}

/// Errors returned by dispatchers and the review engine.
///
/// `group` is set when the error was raised by the parallel dispatcher and
/// names the zero-based group the failing task belonged to. `index` is always
/// the zero-based position of the prompt in dispatch order.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing or invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The plan needs more provider requests than the request quota allows.
    #[error("request quota exceeded: {planned} planned requests, quota is {quota}")]
    RequestQuotaExceeded { planned: u64, quota: u64 },

    /// A token quota dimension would be overspent by the next task.
    #[error("tokens quota exceeded before task #{index}: {violation}")]
    TokensQuotaExceeded {
        index: usize,
        group: Option<usize>,
        #[source]
        violation: QuotaViolation,
    },

    /// The dispatch deadline passed before the task could complete.
    #[error("timeout after {timeout_ms} ms at task #{index}", timeout_ms = .timeout.as_millis())]
    Timeout {
        timeout: Duration,
        index: usize,
        group: Option<usize>,
    },

    /// The task was cancelled before producing a result.
    #[error("task #{index} in group #{group} was cancelled")]
    Cancelled { index: usize, group: usize },

    /// The task returned an error.
    #[error("task #{index} (prompt {prompt_id}) failed: {source}")]
    TaskFailed {
        index: usize,
        group: Option<usize>,
        prompt_id: i64,
        #[source]
        source: ProcessError,
    },

    /// The worker running the task panicked.
    #[error("task #{index} in group #{group} aborted: {reason}")]
    TaskAborted {
        index: usize,
        group: usize,
        reason: String,
    },

    /// A shutdown signal was observed while waiting for a group.
    #[error("dispatch interrupted while waiting for group #{group}")]
    Interrupted { group: usize },

    /// Prompt materialization or another store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Validation(_) | EngineError::RequestQuotaExceeded { .. } => {
                ErrorCategory::Configuration
            }
            EngineError::TokensQuotaExceeded { .. } => ErrorCategory::Quota,
            EngineError::Timeout { .. } => ErrorCategory::Timeout,
            EngineError::Cancelled { .. } => ErrorCategory::Cancelled,
            EngineError::TaskFailed { .. } | EngineError::TaskAborted { .. } => {
                ErrorCategory::Execution
            }
            EngineError::Interrupted { .. } => ErrorCategory::Interrupted,
            EngineError::Store(_) => ErrorCategory::Storage,
        }
    }

    /// True for errors raised before any provider call could be made.
    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// The group a parallel dispatch failed in, if any.
    pub fn group(&self) -> Option<usize> {
        match self {
            EngineError::TokensQuotaExceeded { group, .. }
            | EngineError::Timeout { group, .. }
            | EngineError::TaskFailed { group, .. } => *group,
            EngineError::Cancelled { group, .. }
            | EngineError::TaskAborted { group, .. }
            | EngineError::Interrupted { group } => Some(*group),
            _ => None,
        }
    }

    /// The prompt index the failure is attributed to, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            EngineError::TokensQuotaExceeded { index, .. }
            | EngineError::Timeout { index, .. }
            | EngineError::Cancelled { index, .. }
            | EngineError::TaskFailed { index, .. }
            | EngineError::TaskAborted { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
