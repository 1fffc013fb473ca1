//! Run summary and failure thresholds.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::model::{CumulativeUsage, ReviewOutcome, Severity};

/// Finding counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityStatistics {
    pub info: u64,
    pub warning: u64,
    pub critical: u64,
}

impl SeverityStatistics {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Info => self.info += 1,
            Severity::Warning => self.warning += 1,
            Severity::Critical => self.critical += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.info + self.warning + self.critical
    }
}

/// Finding counts at which a run is considered failed.
///
/// A threshold that is unset or 0 is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunFailureConfig {
    pub warning_threshold: Option<u32>,
    pub critical_threshold: Option<u32>,
}

impl RunFailureConfig {
    pub fn with_warning_threshold(mut self, threshold: u32) -> Self {
        self.warning_threshold = Some(threshold);
        self
    }

    pub fn with_critical_threshold(mut self, threshold: u32) -> Self {
        self.critical_threshold = Some(threshold);
        self
    }

    /// True when any configured threshold is reached.
    pub fn is_failure(&self, stats: &SeverityStatistics) -> bool {
        debug!(
            warning_threshold = ?self.warning_threshold,
            critical_threshold = ?self.critical_threshold,
            warning_count = stats.warning,
            critical_count = stats.critical,
            "Checking run failure thresholds"
        );

        if let Some(threshold) = self.critical_threshold.filter(|t| *t > 0) {
            if stats.critical >= u64::from(threshold) {
                error!(
                    critical_count = stats.critical,
                    threshold, "Run fails: critical findings reached threshold"
                );
                return true;
            }
        }
        if let Some(threshold) = self.warning_threshold.filter(|t| *t > 0) {
            if stats.warning >= u64::from(threshold) {
                error!(
                    warning_count = stats.warning,
                    threshold, "Run fails: warning findings reached threshold"
                );
                return true;
            }
        }

        info!("Run within failure thresholds");
        false
    }
}

/// Aggregate view over the outcomes of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub prompts: usize,
    pub files_reviewed: usize,
    pub severities: SeverityStatistics,
    pub usage: CumulativeUsage,
    pub failed: bool,
}

impl ReviewSummary {
    /// Summarize outcomes and evaluate the failure thresholds.
    pub fn from_outcomes(outcomes: &[ReviewOutcome], failure: &RunFailureConfig) -> Self {
        let mut summary = Self {
            prompts: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            summary.files_reviewed += outcome.files.len();
            for comment in outcome.files.iter().flat_map(|file| file.comments.iter()) {
                summary.severities.record(comment.severity);
            }
            if let Some(usage) = outcome.completion_usage.as_ref() {
                summary.usage.add(usage);
            }
        }

        summary.failed = failure.is_failure(&summary.severities);
        summary
    }

    /// Format as a human-readable string.
    pub fn format(&self) -> String {
        let mut output = String::from("## Review Summary\n\n");

        output.push_str(&format!(
            "**Prompts**: {} ({} files reviewed)\n",
            self.prompts, self.files_reviewed
        ));
        output.push_str(&format!(
            "**Findings**: {} ({} critical, {} warning, {} info)\n",
            self.severities.total(),
            self.severities.critical,
            self.severities.warning,
            self.severities.info
        ));
        output.push_str(&format!(
            "**Tokens Used**: {} ({} prompt, {} completion)\n",
            self.usage.total_tokens, self.usage.prompt_tokens, self.usage.completion_tokens
        ));
        output.push_str(&format!(
            "**Status**: {}\n",
            if self.failed { "FAILED" } else { "PASSED" }
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::model::{CompletionUsage, ReviewedComment, ReviewedFile};

    fn comment(severity: Severity) -> ReviewedComment {
        ReviewedComment {
            rule_code: "R1".to_string(),
            severity,
            line: Some(1),
            column: None,
            message: "finding".to_string(),
            suggestion: None,
        }
    }

    fn outcome(severities: &[Severity], usage: CompletionUsage) -> ReviewOutcome {
        ReviewOutcome {
            files: vec![ReviewedFile {
                file_id: 1,
                path: PathBuf::from("/src/lib.rs"),
                comments: severities.iter().copied().map(comment).collect(),
            }],
            think_steps: Vec::new(),
            completion_usage: Some(usage),
        }
    }

    #[test]
    fn test_summary_counts_and_usage() {
        let outcomes = vec![
            outcome(
                &[Severity::Critical, Severity::Info],
                CompletionUsage::new(10, 20, 30),
            ),
            outcome(&[Severity::Warning], CompletionUsage::new(1, 2, 3)),
        ];

        let summary = ReviewSummary::from_outcomes(&outcomes, &RunFailureConfig::default());

        assert_eq!(summary.prompts, 2);
        assert_eq!(summary.files_reviewed, 2);
        assert_eq!(summary.severities.critical, 1);
        assert_eq!(summary.severities.warning, 1);
        assert_eq!(summary.severities.info, 1);
        assert_eq!(summary.usage, CumulativeUsage::new(11, 22, 33));
        assert!(!summary.failed);
    }

    #[test]
    fn test_critical_threshold_fails_run() {
        let config = RunFailureConfig::default().with_critical_threshold(1);
        let stats = SeverityStatistics {
            critical: 1,
            ..SeverityStatistics::default()
        };
        assert!(config.is_failure(&stats));
    }

    #[test]
    fn test_warning_threshold_below_count_passes() {
        let config = RunFailureConfig::default().with_warning_threshold(3);
        let stats = SeverityStatistics {
            warning: 2,
            ..SeverityStatistics::default()
        };
        assert!(!config.is_failure(&stats));
    }

    #[test]
    fn test_zero_threshold_is_ignored() {
        let config = RunFailureConfig::default()
            .with_warning_threshold(0)
            .with_critical_threshold(0);
        let stats = SeverityStatistics {
            warning: 10,
            critical: 10,
            info: 0,
        };
        assert!(!config.is_failure(&stats));
    }

    #[test]
    fn test_format_includes_status() {
        let summary = ReviewSummary {
            failed: true,
            ..ReviewSummary::default()
        };
        let text = summary.format();
        assert!(text.contains("## Review Summary"));
        assert!(text.contains("**Status**: FAILED"));
    }
}
