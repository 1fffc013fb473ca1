#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use review_engine::model::{
    CompletionUsage, FileGroupContext, ResolvedFileGroup, ResolvedTarget, ReviewOutcome,
    ReviewPrompt, ReviewedComment, ReviewedFile, RunContext, Severity,
};
use review_engine::{
    ChatCompletionConfig, ClientHandle, MessageMapperConfig, ProcessError, ReviewProcessor,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route engine logs through the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// Processor that reports one comment per file and can be told to fail or
/// stall for specific first-file paths.
pub struct FakeReviewer {
    failing: Mutex<HashSet<PathBuf>>,
    delays: HashMap<PathBuf, Duration>,
    severity: Severity,
    usage: CompletionUsage,
    calls: Mutex<Vec<i64>>,
    clients: Mutex<Vec<String>>,
}

impl FakeReviewer {
    pub fn new() -> Self {
        init_tracing();
        Self {
            failing: Mutex::new(HashSet::new()),
            delays: HashMap::new(),
            severity: Severity::Info,
            usage: CompletionUsage::new(10, 20, 30),
            calls: Mutex::new(Vec::new()),
            clients: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(self, path: &str) -> Self {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(PathBuf::from(path));
        self
    }

    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(PathBuf::from(path), delay);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn heal(&self) {
        self.failing.lock().expect("failing lock").clear();
    }

    /// Prompt ids seen, in call order.
    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Client names used, in call order.
    pub fn clients(&self) -> Vec<String> {
        self.clients.lock().expect("clients lock").clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
        self.clients.lock().expect("clients lock").clear();
    }
}

#[async_trait]
impl ReviewProcessor for FakeReviewer {
    async fn process(
        &self,
        _context: &RunContext,
        prompt: &ReviewPrompt,
        _chat: &ChatCompletionConfig,
        _mapper: &MessageMapperConfig,
        client: &ClientHandle,
    ) -> Result<ReviewOutcome, ProcessError> {
        self.calls.lock().expect("calls lock").push(prompt.id);
        self.clients
            .lock()
            .expect("clients lock")
            .push(client.name().to_string());

        let first = prompt
            .files
            .first()
            .map(|file| file.path.clone())
            .unwrap_or_default();
        if let Some(delay) = self.delays.get(&first) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.lock().expect("failing lock").contains(&first) {
            return Err(ProcessError::Provider {
                message: format!("upstream error for {}", first.display()),
                partial_usage: Some(CompletionUsage::new(0, 20, 20)),
            });
        }

        Ok(ReviewOutcome {
            files: prompt
                .files
                .iter()
                .map(|file| ReviewedFile {
                    file_id: file.id,
                    path: file.path.clone(),
                    comments: vec![ReviewedComment {
                        rule_code: prompt
                            .rules
                            .first()
                            .map(|rule| rule.code.clone())
                            .unwrap_or_default(),
                        severity: self.severity,
                        line: Some(1),
                        column: None,
                        message: "finding".to_string(),
                        suggestion: None,
                    }],
                })
                .collect(),
            think_steps: Vec::new(),
            completion_usage: Some(self.usage),
        })
    }
}

/// One target with one group holding `paths`, batched `batch_size` per prompt.
pub fn target(paths: &[&str], batch_size: Option<usize>) -> ResolvedTarget {
    ResolvedTarget::new(1).with_group(ResolvedFileGroup::new(
        FileGroupContext {
            group_id: 1,
            target_id: 1,
            files_batch_size: batch_size,
            ..FileGroupContext::default()
        },
        paths.iter().map(PathBuf::from).collect(),
    ))
}
