use std::sync::{Arc, Mutex, MutexGuard};

use super::{check_tokens_quota, QuotaTracker, QuotaViolation};
use crate::config::TokensQuota;
use crate::model::{CompletionUsage, CumulativeUsage};

/// Tracker owned by a single task.
#[derive(Debug, Clone, Default)]
pub struct SimpleQuotaTracker {
    usage: CumulativeUsage,
    peak: CumulativeUsage,
}

impl SimpleQuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuotaTracker for SimpleQuotaTracker {
    fn add_usage(&mut self, usage: Option<&CompletionUsage>) {
        if let Some(usage) = usage {
            self.usage.add(usage);
            self.peak.raise_to(usage);
        }
    }

    fn current_usage(&self) -> CumulativeUsage {
        self.usage
    }

    fn peak_call_usage(&self) -> CumulativeUsage {
        self.peak
    }
}

/// Tracker shared by concurrent workers.
///
/// Clones share the same counters. All three fields are updated under one
/// lock so readers never observe a half-applied call.
#[derive(Debug, Clone, Default)]
pub struct SharedQuotaTracker {
    inner: Arc<Mutex<SimpleQuotaTracker>>,
}

impl SharedQuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record usage through a shared reference.
    pub fn record(&self, usage: Option<&CompletionUsage>) {
        self.lock().add_usage(usage);
    }

    fn lock(&self) -> MutexGuard<'_, SimpleQuotaTracker> {
        // A panic while holding the lock cannot leave the counters half-written.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QuotaTracker for SharedQuotaTracker {
    fn add_usage(&mut self, usage: Option<&CompletionUsage>) {
        self.record(usage);
    }

    fn current_usage(&self) -> CumulativeUsage {
        self.lock().current_usage()
    }

    fn peak_call_usage(&self) -> CumulativeUsage {
        self.lock().peak_call_usage()
    }

    fn check(&self, quota: Option<&TokensQuota>) -> Result<(), QuotaViolation> {
        let tracker = self.lock();
        check_tokens_quota(quota, &tracker.usage, &tracker.peak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tracker_accumulates() {
        let mut tracker = SimpleQuotaTracker::new();
        tracker.add_usage(Some(&CompletionUsage::new(1, 2, 3)));
        tracker.add_usage(None);
        tracker.add_usage(Some(&CompletionUsage {
            completion_tokens: None,
            prompt_tokens: Some(10),
            total_tokens: None,
        }));

        assert_eq!(tracker.current_usage(), CumulativeUsage::new(1, 12, 3));
        assert_eq!(tracker.peak_call_usage(), CumulativeUsage::new(1, 10, 3));
    }

    #[test]
    fn test_shared_tracker_clones_share_state() {
        let tracker = SharedQuotaTracker::new();
        let mut handle = tracker.clone();

        handle.add_usage(Some(&CompletionUsage::new(5, 5, 10)));
        tracker.record(Some(&CompletionUsage::new(5, 5, 10)));

        assert_eq!(tracker.current_usage(), CumulativeUsage::new(10, 10, 20));
        assert_eq!(handle.current_usage(), CumulativeUsage::new(10, 10, 20));
    }

    #[test]
    fn test_shared_tracker_concurrent_updates() {
        let tracker = SharedQuotaTracker::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record(Some(&CompletionUsage::new(1, 2, 3)));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().expect("join");
        }

        assert_eq!(tracker.current_usage(), CumulativeUsage::new(800, 1600, 2400));
    }

    #[test]
    fn test_shared_check_uses_peak() {
        let tracker = SharedQuotaTracker::new();
        tracker.record(Some(&CompletionUsage::new(0, 0, 60)));
        let quota = TokensQuota::default().with_total(100);
        assert!(tracker.check(Some(&quota)).is_err());
    }
}
