//! End-to-end review execution: plan, guard, dispatch, summarize.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::balance::{ClientSelector, ClientSource};
use crate::batch::{check_request_quota, collect_rules, plan_file_batches, plan_rule_batches};
use crate::config::EngineConfig;
use crate::dispatch::{DispatchOptions, ParallelDispatcher, SequentialDispatcher};
use crate::error::{EngineError, EngineResult};
use crate::model::{ResolvedTarget, ReviewOutcome, Rule, RunContext};
use crate::processor::{ChatCompletionConfig, MessageMapperConfig, ReviewProcessor};
use crate::recorder::StatefulRecorder;
use crate::store::{InferenceStore, PromptStore};
use crate::summary::ReviewSummary;

/// Inputs of one review run.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub targets: Vec<ResolvedTarget>,
    /// Rules declared at review level. Target and group rules travel with
    /// the targets.
    pub rules: Vec<Rule>,
    pub clients: ClientSource,
    pub chat: ChatCompletionConfig,
    pub mapper: MessageMapperConfig,
}

impl ReviewRequest {
    pub fn new(targets: Vec<ResolvedTarget>, clients: ClientSource) -> Self {
        Self {
            targets,
            rules: Vec::new(),
            clients,
            chat: ChatCompletionConfig::default(),
            mapper: MessageMapperConfig::default(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_chat(mut self, chat: ChatCompletionConfig) -> Self {
        self.chat = chat;
        self
    }

    pub fn with_mapper(mut self, mapper: MessageMapperConfig) -> Self {
        self.mapper = mapper;
        self
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct ReviewRun {
    /// One outcome per dispatched prompt, in prompt order.
    pub outcomes: Vec<ReviewOutcome>,
    pub summary: ReviewSummary,
}

/// Runs reviews against a processor and a pair of stores.
///
/// Every processed prompt is recorded in the inference store, so a run
/// that fails part way can be resumed with [`RunContext::resumed`].
pub struct ReviewEngine {
    processor: Arc<dyn ReviewProcessor>,
    prompts: Arc<dyn PromptStore>,
    inferences: Arc<dyn InferenceStore>,
    executor: Option<Handle>,
    interrupt: Option<watch::Receiver<bool>>,
}

impl ReviewEngine {
    pub fn new(
        processor: Arc<dyn ReviewProcessor>,
        prompts: Arc<dyn PromptStore>,
        inferences: Arc<dyn InferenceStore>,
    ) -> Self {
        Self {
            processor,
            prompts,
            inferences,
            executor: None,
            interrupt: None,
        }
    }

    /// Engine using one backend for both prompts and inferences.
    pub fn with_store<S>(processor: Arc<dyn ReviewProcessor>, store: Arc<S>) -> Self
    where
        S: PromptStore + InferenceStore + 'static,
    {
        let prompts: Arc<dyn PromptStore> = Arc::clone(&store) as Arc<dyn PromptStore>;
        let inferences: Arc<dyn InferenceStore> = store;
        Self::new(processor, prompts, inferences)
    }

    /// Runtime for parallel dispatch. Defaults to the runtime `run` is
    /// awaited on.
    pub fn with_executor(mut self, executor: Handle) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Shutdown signal observed by parallel dispatch.
    pub fn with_interrupt(mut self, signal: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(signal);
        self
    }

    pub async fn run(
        &self,
        context: &RunContext,
        request: &ReviewRequest,
        config: &EngineConfig,
    ) -> EngineResult<ReviewRun> {
        config
            .validate()
            .map_err(|err| EngineError::Validation(err.to_string()))?;
        let clients = ClientSelector::new(&request.clients, config.load_balancing)?;

        let rules = collect_rules(&request.rules, &request.targets);
        let file_batches = plan_file_batches(&request.targets);
        let rule_batches = plan_rule_batches(&rules, config.rules_batch_size);
        let planned =
            check_request_quota(config.quotas.request, rule_batches.len(), file_batches.len())?;

        info!(
            review_id = context.review_id,
            run_id = context.run_id,
            resumed = !context.is_new_run,
            rules = rules.len(),
            file_batches = file_batches.len(),
            rule_batches = rule_batches.len(),
            planned_requests = planned,
            load_balancing = ?config.load_balancing,
            "Planned review"
        );

        let recorder: Arc<dyn ReviewProcessor> = Arc::new(StatefulRecorder::new(
            Arc::clone(&self.processor),
            Arc::clone(&self.inferences),
        ));
        let options =
            DispatchOptions::from_config(config, request.chat.clone(), request.mapper.clone());

        let outcomes = if config.concurrency == 1 {
            SequentialDispatcher::new(recorder, Arc::clone(&self.prompts))
                .dispatch(
                    context,
                    &file_batches,
                    &rule_batches,
                    &clients,
                    &options,
                )
                .await?
        } else {
            let executor = match &self.executor {
                Some(handle) => handle.clone(),
                None => Handle::try_current().map_err(|err| {
                    EngineError::Validation(format!("no tokio runtime for parallel dispatch: {err}"))
                })?,
            };
            let mut dispatcher =
                ParallelDispatcher::new(recorder, Arc::clone(&self.prompts), executor);
            if let Some(signal) = &self.interrupt {
                dispatcher = dispatcher.with_interrupt(signal.clone());
            }
            dispatcher
                .dispatch(
                    context,
                    &file_batches,
                    &rule_batches,
                    &clients,
                    &options,
                    config.concurrency,
                )
                .await?
        };

        let summary = ReviewSummary::from_outcomes(&outcomes, &config.run_failure);
        if summary.failed {
            warn!(
                review_id = context.review_id,
                critical = summary.severities.critical,
                warning = summary.severities.warning,
                "Review reached failure thresholds"
            );
        }
        info!(
            review_id = context.review_id,
            prompts = summary.prompts,
            total_tokens = summary.usage.total_tokens,
            "Review run complete"
        );

        Ok(ReviewRun { outcomes, summary })
    }
}
