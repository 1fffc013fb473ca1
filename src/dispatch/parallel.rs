use std::future;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::{Deadline, DispatchOptions, TaskError, TaskRunner};
use crate::balance::ClientSelector;
use crate::batch::{combine, FileBatch, RuleBatch};
use crate::error::{EngineError, EngineResult};
use crate::materialize::PromptMaterializer;
use crate::model::{ReviewOutcome, ReviewPrompt, RunContext};
use crate::processor::ReviewProcessor;
use crate::quota::SharedQuotaTracker;
use crate::store::PromptStore;

/// Processes prompts in groups of `concurrency` on a tokio runtime.
///
/// A group fully settles before the next one starts. Outcomes are returned
/// in prompt order regardless of completion order. The first failure in a
/// group cancels its unfinished siblings and fails the whole dispatch.
#[derive(Clone)]
pub struct ParallelDispatcher {
    processor: Arc<dyn ReviewProcessor>,
    materializer: PromptMaterializer,
    executor: Handle,
    interrupt: Option<watch::Receiver<bool>>,
}

impl ParallelDispatcher {
    pub fn new(
        processor: Arc<dyn ReviewProcessor>,
        prompts: Arc<dyn PromptStore>,
        executor: Handle,
    ) -> Self {
        Self {
            processor,
            materializer: PromptMaterializer::new(prompts),
            executor,
            interrupt: None,
        }
    }

    /// Abort the in-flight group when `signal` becomes `true`.
    pub fn with_interrupt(mut self, signal: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(signal);
        self
    }

    pub async fn dispatch(
        &self,
        context: &RunContext,
        file_batches: &[FileBatch],
        rule_batches: &[RuleBatch],
        clients: &ClientSelector,
        options: &DispatchOptions,
        concurrency: usize,
    ) -> EngineResult<Vec<ReviewOutcome>> {
        if concurrency == 0 {
            return Err(EngineError::Validation(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if file_batches.is_empty() {
            info!(review_id = context.review_id, "No file batches to review");
            return Ok(Vec::new());
        }

        if matches!(self.executor.runtime_flavor(), RuntimeFlavor::CurrentThread) && concurrency > 1 {
            warn!(
                concurrency,
                "Executor is a current-thread runtime; group tasks will interleave on one worker"
            );
        }

        let deadline = Deadline::start(options.timeout);
        let units = combine(file_batches, rule_batches);
        let prompts = self
            .materializer
            .create(context, &units, options.use_reasoning)?;

        let total = prompts.len();
        let group_count = total.div_ceil(concurrency);
        info!(
            review_id = context.review_id,
            run_id = context.run_id,
            prompts = total,
            concurrency,
            groups = group_count,
            "Starting parallel dispatch"
        );

        let runner = TaskRunner::new(
            Arc::clone(&self.processor),
            context,
            options,
            clients.clone(),
        );
        let tracker = SharedQuotaTracker::new();
        let mut outcomes = Vec::with_capacity(total);
        let mut pending = prompts.into_iter();

        for group in 0..group_count {
            let start = group * concurrency;
            let prompts: Vec<ReviewPrompt> = pending.by_ref().take(concurrency).collect();

            if deadline.is_expired() {
                let timeout = deadline.budget().unwrap_or_default();
                error!(group, index = start, "Dispatch deadline passed before group start");
                return Err(EngineError::Timeout {
                    timeout,
                    index: start,
                    group: Some(group),
                });
            }

            info!(
                "Processing parallel batch group #{} of {} ({} tasks)",
                group + 1,
                group_count,
                prompts.len()
            );
            let group_started = Instant::now();
            let group_outcomes = self
                .run_group(group, start, prompts, &runner, &tracker, &deadline)
                .await?;
            info!(
                group = group + 1,
                elapsed_ms = group_started.elapsed().as_millis() as u64,
                "Completed parallel batch group"
            );
            outcomes.extend(group_outcomes);
        }

        info!(
            prompts = outcomes.len(),
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "Parallel dispatch complete"
        );
        Ok(outcomes)
    }

    async fn run_group(
        &self,
        group: usize,
        start: usize,
        prompts: Vec<ReviewPrompt>,
        runner: &TaskRunner,
        tracker: &SharedQuotaTracker,
        deadline: &Deadline,
    ) -> EngineResult<Vec<ReviewOutcome>> {
        let size = prompts.len();
        let (cancel_tx, _cancel_rx) = watch::channel(false);
        let mut prompt_ids = Vec::with_capacity(size);
        let mut abort_handles: Vec<AbortHandle> = Vec::with_capacity(size);
        let mut tasks = FuturesUnordered::new();

        for (offset, prompt) in prompts.into_iter().enumerate() {
            prompt_ids.push(prompt.id);
            let runner = runner.clone();
            let mut tracker = tracker.clone();
            let cancel_rx = cancel_tx.subscribe();

            let handle = self.executor.spawn(async move {
                let cancelled = *cancel_rx.borrow();
                if cancelled {
                    return Err(TaskError::Cancelled);
                }
                runner.run(&prompt, &mut tracker).await
            });
            abort_handles.push(handle.abort_handle());
            tasks.push(handle.map(move |joined| (offset, joined)));
        }

        let mut slots: Vec<Option<ReviewOutcome>> = vec![None; size];
        let mut interrupt = self.interrupt.clone();

        loop {
            let next = tokio::select! {
                next = tasks.next() => next,
                _ = expired(deadline) => {
                    cancel_group(&cancel_tx, &abort_handles);
                    let offset = slots.iter().position(Option::is_none).unwrap_or(0);
                    let timeout = deadline.budget().unwrap_or_default();
                    error!(group, index = start + offset, "Dispatch deadline passed during group");
                    return Err(EngineError::Timeout {
                        timeout,
                        index: start + offset,
                        group: Some(group),
                    });
                }
                _ = interrupted(&mut interrupt) => {
                    cancel_group(&cancel_tx, &abort_handles);
                    warn!(group, "Dispatch interrupted");
                    return Err(EngineError::Interrupted { group });
                }
            };

            let Some((offset, joined)) = next else {
                break;
            };
            let index = start + offset;

            let failure = match joined {
                Ok(Ok(outcome)) => {
                    debug!(group, index, "Task completed");
                    slots[offset] = Some(outcome);
                    continue;
                }
                Ok(Err(err)) => err.into_engine_error(index, Some(group), prompt_ids[offset]),
                Err(join_err) if join_err.is_cancelled() => EngineError::Cancelled { index, group },
                Err(join_err) => EngineError::TaskAborted {
                    index,
                    group,
                    reason: join_err.to_string(),
                },
            };

            cancel_group(&cancel_tx, &abort_handles);
            error!(group, index, error = %failure, "Group failed; remaining tasks cancelled");
            return Err(failure);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

/// Raise the cancellation flag and abort every task of the group.
/// Aborting an already finished task has no effect.
fn cancel_group(cancel_tx: &watch::Sender<bool>, abort_handles: &[AbortHandle]) {
    let _ = cancel_tx.send(true);
    for handle in abort_handles {
        handle.abort();
    }
}

async fn expired(deadline: &Deadline) {
    match deadline.expires_at() {
        Some(at) => tokio::time::sleep_until(at).await,
        None => future::pending().await,
    }
}

/// Resolves once the signal reads `true`. A dropped sender never interrupts.
async fn interrupted(signal: &mut Option<watch::Receiver<bool>>) {
    let Some(signal) = signal else {
        return future::pending().await;
    };
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            return future::pending().await;
        }
    }
}
