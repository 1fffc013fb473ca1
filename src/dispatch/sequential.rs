use std::sync::Arc;

use tracing::{error, info};

use super::{Deadline, DispatchOptions, TaskRunner};
use crate::balance::ClientSelector;
use crate::batch::{combine, FileBatch, RuleBatch};
use crate::error::{EngineError, EngineResult};
use crate::materialize::PromptMaterializer;
use crate::model::{ReviewOutcome, RunContext};
use crate::processor::ReviewProcessor;
use crate::quota::SimpleQuotaTracker;
use crate::store::PromptStore;

/// Processes prompts one after another on the calling task.
#[derive(Clone)]
pub struct SequentialDispatcher {
    processor: Arc<dyn ReviewProcessor>,
    materializer: PromptMaterializer,
}

impl SequentialDispatcher {
    pub fn new(processor: Arc<dyn ReviewProcessor>, prompts: Arc<dyn PromptStore>) -> Self {
        Self {
            processor,
            materializer: PromptMaterializer::new(prompts),
        }
    }

    /// Process every prompt in order and return outcomes in the same order.
    ///
    /// The first failing prompt aborts the dispatch; outcomes already
    /// produced are not returned.
    pub async fn dispatch(
        &self,
        context: &RunContext,
        file_batches: &[FileBatch],
        rule_batches: &[RuleBatch],
        clients: &ClientSelector,
        options: &DispatchOptions,
    ) -> EngineResult<Vec<ReviewOutcome>> {
        if file_batches.is_empty() {
            info!(review_id = context.review_id, "No file batches to review");
            return Ok(Vec::new());
        }

        let deadline = Deadline::start(options.timeout);
        let units = combine(file_batches, rule_batches);
        let prompts = self
            .materializer
            .create(context, &units, options.use_reasoning)?;

        info!(
            review_id = context.review_id,
            run_id = context.run_id,
            prompts = prompts.len(),
            "Starting sequential dispatch"
        );

        let runner = TaskRunner::new(
            Arc::clone(&self.processor),
            context,
            options,
            clients.clone(),
        );
        let mut tracker = SimpleQuotaTracker::new();
        let mut outcomes = Vec::with_capacity(prompts.len());

        for (index, prompt) in prompts.iter().enumerate() {
            if deadline.is_expired() {
                let timeout = deadline.budget().unwrap_or_default();
                error!(
                    index,
                    timeout_ms = timeout.as_millis() as u64,
                    "Dispatch deadline passed"
                );
                return Err(EngineError::Timeout {
                    timeout,
                    index,
                    group: None,
                });
            }

            match runner.run(prompt, &mut tracker).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    let err = err.into_engine_error(index, None, prompt.id);
                    error!(index, prompt_id = prompt.id, error = %err, "Task failed");
                    return Err(err);
                }
            }
        }

        info!(
            prompts = outcomes.len(),
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "Sequential dispatch complete"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::config::TokensQuota;
    use crate::dispatch::test_support::{
        path, round_robin, single_client, single_file_batches, Script, ScriptedProcessor,
    };
    use crate::model::{CompletionUsage, InferenceStatus, Rule, Severity};
    use crate::recorder::StatefulRecorder;
    use crate::store::{InferenceStore, MemoryStore};

    fn dispatcher(processor: Arc<ScriptedProcessor>, store: &Arc<MemoryStore>) -> SequentialDispatcher {
        SequentialDispatcher::new(processor, Arc::clone(store) as Arc<dyn PromptStore>)
    }

    fn single() -> ClientSelector {
        single_client("primary")
    }

    #[tokio::test]
    async fn test_outcomes_follow_prompt_order() {
        let processor = Arc::new(ScriptedProcessor::new());
        let store = Arc::new(MemoryStore::new());

        let outcomes = dispatcher(Arc::clone(&processor), &store)
            .dispatch(
                &RunContext::fresh(1, 1),
                &single_file_batches(3),
                &[],
                &single(),
                &DispatchOptions::default(),
            )
            .await
            .expect("dispatch");

        let paths: Vec<PathBuf> = outcomes.iter().map(path).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/f0.rs"),
                PathBuf::from("/f1.rs"),
                PathBuf::from("/f2.rs")
            ]
        );
        assert_eq!(processor.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_rule_batches_multiply_prompts() {
        let processor = Arc::new(ScriptedProcessor::new());
        let store = Arc::new(MemoryStore::new());
        let rules = vec![
            vec![Rule::new("R1", "one", Severity::Info)],
            vec![Rule::new("R2", "two", Severity::Info)],
        ];

        let outcomes = dispatcher(Arc::clone(&processor), &store)
            .dispatch(
                &RunContext::fresh(1, 1),
                &single_file_batches(2),
                &rules,
                &single(),
                &DispatchOptions::default(),
            )
            .await
            .expect("dispatch");

        assert_eq!(outcomes.len(), 4);
        assert_eq!(store.prompts().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_batches_skip_everything() {
        let processor = Arc::new(ScriptedProcessor::new());
        let store = Arc::new(MemoryStore::new());
        let clients = round_robin(&["a", "b"]);

        let outcomes = dispatcher(Arc::clone(&processor), &store)
            .dispatch(
                &RunContext::fresh(1, 1),
                &[],
                &[vec![Rule::new("R1", "one", Severity::Info)]],
                &clients,
                &DispatchOptions::default(),
            )
            .await
            .expect("dispatch");

        assert!(outcomes.is_empty());
        assert!(processor.calls().is_empty());
        assert!(store.prompts().is_empty());
        // The rotation was never advanced.
        assert_eq!(clients.select().name(), "a");
    }

    #[tokio::test]
    async fn test_failure_reports_index_and_prompt() {
        let processor = Arc::new(
            ScriptedProcessor::new().with_script("/f1.rs", Script::Fail { delay: Duration::ZERO }),
        );
        let store = Arc::new(MemoryStore::new());

        let err = dispatcher(Arc::clone(&processor), &store)
            .dispatch(
                &RunContext::fresh(1, 1),
                &single_file_batches(3),
                &[],
                &single(),
                &DispatchOptions::default(),
            )
            .await
            .expect_err("second prompt fails");

        match err {
            EngineError::TaskFailed {
                index,
                group,
                prompt_id,
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(group, None);
                assert_eq!(prompt_id, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(processor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_names_index() {
        let processor = Arc::new(ScriptedProcessor::new().with_script(
            "/f0.rs",
            Script::Succeed {
                delay: Duration::from_millis(80),
                usage: CompletionUsage::zero(),
            },
        ));
        let store = Arc::new(MemoryStore::new());

        let err = dispatcher(Arc::clone(&processor), &store)
            .dispatch(
                &RunContext::fresh(1, 1),
                &single_file_batches(3),
                &[],
                &single(),
                &DispatchOptions::default().with_timeout(Duration::from_millis(20)),
            )
            .await
            .expect_err("deadline passes during first prompt");

        assert!(matches!(err, EngineError::Timeout { index: 1, .. }));
        assert_eq!(processor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_round_robin_across_prompts() {
        let processor = Arc::new(ScriptedProcessor::new());
        let store = Arc::new(MemoryStore::new());
        let pool = round_robin(&["a", "b"]);

        dispatcher(Arc::clone(&processor), &store)
            .dispatch(
                &RunContext::fresh(1, 1),
                &single_file_batches(3),
                &[],
                &pool,
                &DispatchOptions::default(),
            )
            .await
            .expect("dispatch");

        let clients: Vec<String> = processor.calls().into_iter().map(|(_, c)| c).collect();
        assert_eq!(clients, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_quota_blocks_before_overspending_call() {
        let processor = Arc::new(
            ScriptedProcessor::new().with_default_usage(CompletionUsage::new(0, 0, 95)),
        );
        let store = Arc::new(MemoryStore::new());

        let err = dispatcher(Arc::clone(&processor), &store)
            .dispatch(
                &RunContext::fresh(1, 1),
                &single_file_batches(2),
                &[],
                &single(),
                &DispatchOptions::default()
                    .with_tokens_quota(TokensQuota::default().with_total(100)),
            )
            .await
            .expect_err("second call would overspend");

        assert!(matches!(
            err,
            EngineError::TokensQuotaExceeded { index: 1, .. }
        ));
        assert_eq!(processor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_recorder_persists_each_outcome() {
        let processor = Arc::new(ScriptedProcessor::new());
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(StatefulRecorder::new(
            processor,
            Arc::clone(&store) as Arc<dyn InferenceStore>,
        ));
        let dispatcher =
            SequentialDispatcher::new(recorder, Arc::clone(&store) as Arc<dyn PromptStore>);

        dispatcher
            .dispatch(
                &RunContext::fresh(3, 9),
                &single_file_batches(2),
                &[],
                &single(),
                &DispatchOptions::default(),
            )
            .await
            .expect("dispatch");

        let records = store.inferences();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.status == InferenceStatus::Finished && r.run_id == 9));
    }
}
