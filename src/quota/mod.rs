//! Token quota tracking and enforcement.
//!
//! A tracker accumulates the usage reported by every provider call of one
//! dispatch. Before each call the dispatcher checks the tracker against the
//! configured [`TokensQuota`]:
//!
//! - a dimension already at or over its ceiling rejects the call;
//! - a dimension whose usage plus the largest single call seen so far would
//!   go over its ceiling also rejects the call.
//!
//! Rejection leaves the tracker untouched.
//!
//! # Example
//!
//! ```
//! use review_engine::config::TokensQuota;
//! use review_engine::model::CompletionUsage;
//! use review_engine::quota::{QuotaTracker, SimpleQuotaTracker};
//!
//! let quota = TokensQuota::default().with_total(100);
//! let mut tracker = SimpleQuotaTracker::new();
//!
//! tracker.add_usage(Some(&CompletionUsage::new(20, 20, 40)));
//! assert!(tracker.check(Some(&quota)).is_ok());
//!
//! tracker.add_usage(Some(&CompletionUsage::new(15, 15, 30)));
//! // 70 used, the next call may use up to 40 more
//! assert!(tracker.check(Some(&quota)).is_err());
//! ```

mod tracker;

pub use tracker::{SharedQuotaTracker, SimpleQuotaTracker};

use std::fmt;

use thiserror::Error;

use crate::config::TokensQuota;
use crate::model::{CompletionUsage, CumulativeUsage};

/// One of the three token counters a quota can bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDimension {
    Completion,
    Prompt,
    Total,
}

impl fmt::Display for TokenDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TokenDimension::Completion => "completion",
            TokenDimension::Prompt => "prompt",
            TokenDimension::Total => "total",
        };
        f.write_str(label)
    }
}

/// A quota dimension that blocks the next provider call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{dimension} tokens used {used}, projected {projected}, quota {quota}")]
pub struct QuotaViolation {
    pub dimension: TokenDimension,
    pub used: u64,
    /// Usage after the next call if it is as large as the largest seen so far.
    pub projected: u64,
    pub quota: u64,
}

/// Cumulative usage counter for one dispatch.
pub trait QuotaTracker {
    /// Record one call's usage. `None` is ignored; missing fields count as 0.
    fn add_usage(&mut self, usage: Option<&CompletionUsage>);

    /// Usage recorded so far.
    fn current_usage(&self) -> CumulativeUsage;

    /// Largest single-call usage recorded so far, per dimension.
    fn peak_call_usage(&self) -> CumulativeUsage;

    /// Check whether another call fits in `quota`.
    fn check(&self, quota: Option<&TokensQuota>) -> Result<(), QuotaViolation> {
        check_tokens_quota(quota, &self.current_usage(), &self.peak_call_usage())
    }
}

/// Check `used` against each configured dimension of `quota`.
pub fn check_tokens_quota(
    quota: Option<&TokensQuota>,
    used: &CumulativeUsage,
    peak: &CumulativeUsage,
) -> Result<(), QuotaViolation> {
    let Some(quota) = quota else {
        return Ok(());
    };

    let dimensions = [
        (
            TokenDimension::Completion,
            quota.completion,
            used.completion_tokens,
            peak.completion_tokens,
        ),
        (
            TokenDimension::Prompt,
            quota.prompt,
            used.prompt_tokens,
            peak.prompt_tokens,
        ),
        (
            TokenDimension::Total,
            quota.total,
            used.total_tokens,
            peak.total_tokens,
        ),
    ];

    for (dimension, limit, used, peak) in dimensions {
        let Some(limit) = limit else {
            continue;
        };
        let projected = used.saturating_add(peak);
        if used >= limit || projected > limit {
            return Err(QuotaViolation {
                dimension,
                used,
                projected,
                quota: limit,
            });
        }
    }

    Ok(())
}
