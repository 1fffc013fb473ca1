//! Review execution engine for language-model code review.
//!
//! The engine plans resolved source files and rules into bounded
//! [`WorkUnit`](model::WorkUnit)s, enforces request and token quotas,
//! spreads provider calls over a pool of clients, runs them sequentially or
//! in concurrent groups, and records every outcome so an interrupted review
//! can resume where it stopped.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use review_engine::{
//!     ClientHandle, ClientSource, EngineConfig, MemoryStore, ReviewEngine, ReviewRequest,
//!     RunContext,
//! };
//!
//! let engine = ReviewEngine::with_store(Arc::new(MyProcessor::new()), Arc::new(MemoryStore::new()));
//! let request = ReviewRequest::new(targets, ClientSource::Single(ClientHandle::named("default")));
//! let run = engine
//!     .run(&RunContext::fresh(1, 1), &request, &EngineConfig::new().with_concurrency(4))
//!     .await?;
//! println!("{}", run.summary.format());
//! ```

pub mod balance;
pub mod batch;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod materialize;
pub mod model;
pub mod processor;
pub mod quota;
pub mod recorder;
pub mod store;
pub mod summary;

pub use balance::{ClientHandle, ClientSelector, ClientSource};
pub use crate::config::{EngineConfig, LoadBalancingStrategy, Quotas, TokensQuota};
pub use dispatch::{DispatchOptions, ParallelDispatcher, SequentialDispatcher};
pub use engine::{ReviewEngine, ReviewRequest, ReviewRun};
pub use error::{EngineError, EngineResult, ErrorCategory, ProcessError, StoreError};
pub use model::RunContext;
pub use processor::{ChatCompletionConfig, MessageMapperConfig, ReviewProcessor};
pub use recorder::StatefulRecorder;
pub use store::{FileStore, InferenceStore, MemoryStore, PromptStore};
pub use summary::{ReviewSummary, RunFailureConfig};
