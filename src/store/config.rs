//! Settings for [`FileStore`](super::FileStore).

use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Overrides how many days an idle review is kept on disk.
pub const RETENTION_ENV_VAR: &str = "REVIEW_ENGINE_RETENTION_DAYS";

pub const DEFAULT_RETENTION_DAYS: u64 = 30;

/// How long reviews stay on disk after their last write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// Days since the last write before a review is pruned. `0` keeps
    /// everything.
    pub retention_days: u64,
}

impl FileStoreConfig {
    pub fn new(retention_days: u64) -> Self {
        Self { retention_days }
    }

    /// Keep reviews forever.
    pub fn keep_all() -> Self {
        Self::new(0)
    }

    /// Read the retention window from `REVIEW_ENGINE_RETENTION_DAYS`.
    pub fn from_env() -> Self {
        Self::from_env_value(env::var(RETENTION_ENV_VAR).ok().as_deref())
    }

    /// Parse a raw retention value, falling back to the default when it is
    /// absent or not a whole number of days.
    pub fn from_env_value(value: Option<&str>) -> Self {
        let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::new(DEFAULT_RETENTION_DAYS);
        };
        match raw.parse::<u64>() {
            Ok(days) => Self::new(days),
            Err(_) => {
                warn!(
                    value = raw,
                    default = DEFAULT_RETENTION_DAYS,
                    "Ignoring invalid {}",
                    RETENTION_ENV_VAR
                );
                Self::new(DEFAULT_RETENTION_DAYS)
            }
        }
    }

    pub fn retains_forever(&self) -> bool {
        self.retention_days == 0
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}
