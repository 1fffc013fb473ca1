use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::prompt::PromptTexts;
use super::rules::Rule;

/// Settings shared by every path resolved from one file group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileGroupContext {
    pub group_id: i64,
    pub target_id: i64,
    /// Character encoding of the group's files, if not UTF-8.
    pub code_page: Option<String>,
    /// Maximum files per batch; `None` or 0 puts the whole group in one batch.
    pub files_batch_size: Option<usize>,
    /// Prompt texts inherited from the review, target and group levels.
    pub prompts: PromptTexts,
}

/// An absolute path together with the group it was resolved from.
#[derive(Debug, Clone)]
pub struct ResolvedFilePath {
    pub path: PathBuf,
    pub group: Arc<FileGroupContext>,
}

impl ResolvedFilePath {
    pub fn new(path: impl Into<PathBuf>, group: Arc<FileGroupContext>) -> Self {
        Self {
            path: path.into(),
            group,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Paths resolved for one file group of a target.
#[derive(Debug, Clone)]
pub struct ResolvedFileGroup {
    pub context: Arc<FileGroupContext>,
    pub paths: Vec<PathBuf>,
    /// Rules declared on the group itself.
    pub rules: Vec<Rule>,
}

impl ResolvedFileGroup {
    pub fn new(context: FileGroupContext, paths: Vec<PathBuf>) -> Self {
        Self {
            context: Arc::new(context),
            paths,
            rules: Vec::new(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Paths paired with the shared group context.
    pub fn resolved_paths(&self) -> Vec<ResolvedFilePath> {
        self.paths
            .iter()
            .map(|path| ResolvedFilePath::new(path.clone(), Arc::clone(&self.context)))
            .collect()
    }
}

/// One review target and its resolved file groups.
#[derive(Debug, Clone, Default)]
pub struct ResolvedTarget {
    pub id: i64,
    /// Rules declared on the target.
    pub rules: Vec<Rule>,
    pub groups: Vec<ResolvedFileGroup>,
}

impl ResolvedTarget {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_group(mut self, group: ResolvedFileGroup) -> Self {
        self.groups.push(group);
        self
    }
}
