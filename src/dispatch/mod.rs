//! Prompt dispatch.
//!
//! Both dispatchers take planned file and rule batches, materialize prompts
//! and run each prompt through the same steps:
//!
//! 1. check the token quota against usage so far;
//! 2. select a client;
//! 3. call the processor;
//! 4. add the reported usage to the tracker.
//!
//! [`SequentialDispatcher`] runs prompts one at a time on the calling task.
//! [`ParallelDispatcher`] runs them in groups on a tokio runtime.

mod deadline;
mod parallel;
mod sequential;

pub use deadline::Deadline;
pub use parallel::ParallelDispatcher;
pub use sequential::SequentialDispatcher;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::balance::ClientSelector;
use crate::config::{EngineConfig, TokensQuota};
use crate::error::{EngineError, ProcessError};
use crate::model::{ReviewOutcome, ReviewPrompt, RunContext};
use crate::processor::{ChatCompletionConfig, MessageMapperConfig, ReviewProcessor};
use crate::quota::{QuotaTracker, QuotaViolation};

/// Settings shared by every task of a dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub chat: ChatCompletionConfig,
    pub mapper: MessageMapperConfig,
    /// Deadline for the whole dispatch.
    pub timeout: Option<Duration>,
    pub tokens_quota: Option<TokensQuota>,
    pub use_reasoning: bool,
}

impl DispatchOptions {
    pub fn new(chat: ChatCompletionConfig, mapper: MessageMapperConfig) -> Self {
        Self {
            chat,
            mapper,
            ..Self::default()
        }
    }

    /// Options carrying the dispatch-related settings of `config`. A tokens
    /// quota with no limits set is dropped.
    pub fn from_config(
        config: &EngineConfig,
        chat: ChatCompletionConfig,
        mapper: MessageMapperConfig,
    ) -> Self {
        Self {
            chat,
            mapper,
            timeout: config.timeout(),
            tokens_quota: config.quotas.tokens.filter(|quota| !quota.is_unbounded()),
            use_reasoning: config.use_reasoning,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_tokens_quota(mut self, quota: TokensQuota) -> Self {
        self.tokens_quota = Some(quota);
        self
    }

    pub fn with_reasoning(mut self, use_reasoning: bool) -> Self {
        self.use_reasoning = use_reasoning;
        self
    }
}

/// Why a single task did not produce an outcome.
#[derive(Debug)]
pub(crate) enum TaskError {
    Quota(QuotaViolation),
    Process(ProcessError),
    /// The group was cancelled before the task started.
    Cancelled,
}

impl TaskError {
    pub(crate) fn into_engine_error(
        self,
        index: usize,
        group: Option<usize>,
        prompt_id: i64,
    ) -> EngineError {
        match self {
            TaskError::Quota(violation) => EngineError::TokensQuotaExceeded {
                index,
                group,
                violation,
            },
            TaskError::Process(source) => EngineError::TaskFailed {
                index,
                group,
                prompt_id,
                source,
            },
            TaskError::Cancelled => EngineError::Cancelled {
                index,
                group: group.unwrap_or_default(),
            },
        }
    }
}

/// Everything a worker needs to process one prompt. Cheap to clone.
#[derive(Clone)]
pub(crate) struct TaskRunner {
    processor: Arc<dyn ReviewProcessor>,
    context: RunContext,
    chat: Arc<ChatCompletionConfig>,
    mapper: Arc<MessageMapperConfig>,
    selector: ClientSelector,
    tokens_quota: Option<TokensQuota>,
}

impl TaskRunner {
    pub(crate) fn new(
        processor: Arc<dyn ReviewProcessor>,
        context: &RunContext,
        options: &DispatchOptions,
        selector: ClientSelector,
    ) -> Self {
        Self {
            processor,
            context: context.clone(),
            chat: Arc::new(options.chat.clone()),
            mapper: Arc::new(options.mapper.clone()),
            selector,
            tokens_quota: options.tokens_quota,
        }
    }

    pub(crate) async fn run<T>(
        &self,
        prompt: &ReviewPrompt,
        tracker: &mut T,
    ) -> Result<ReviewOutcome, TaskError>
    where
        T: QuotaTracker + ?Sized,
    {
        tracker
            .check(self.tokens_quota.as_ref())
            .map_err(TaskError::Quota)?;

        let client = self.selector.select().clone();
        let outcome = self
            .processor
            .process(&self.context, prompt, &self.chat, &self.mapper, &client)
            .await
            .map_err(TaskError::Process)?;

        tracker.add_usage(outcome.completion_usage.as_ref());
        debug!(
            prompt_id = prompt.id,
            client = client.name(),
            files = prompt.files.len(),
            rules = prompt.rules.len(),
            "Prompt processed"
        );
        Ok(outcome)
    }
}
