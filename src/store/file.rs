use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::config::FileStoreConfig;
use super::{not_finished, InferenceStore, PromptStore};
use crate::error::{StoreError, StoreResult};
use crate::model::{InferenceRecord, PersistedPrompt, ReviewPrompt};

const ENGINE_DIR_NAME: &str = ".review-engine";
const REVIEWS_DIR_NAME: &str = "reviews";
const MANIFEST_FILE_NAME: &str = "review.json";
const PROMPTS_FILE_NAME: &str = "prompts.jsonl";
const INFERENCES_FILE_NAME: &str = "inferences.jsonl";

/// Per-review id counters and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReviewManifest {
    review_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_prompt_id: i64,
    last_inference_id: i64,
}

impl ReviewManifest {
    fn new(review_id: i64) -> Self {
        let now = Utc::now();
        Self {
            review_id,
            created_at: now,
            updated_at: now,
            last_prompt_id: 0,
            last_inference_id: 0,
        }
    }
}

/// Store backed by the local filesystem.
///
/// Each review gets a directory holding `prompts.jsonl`, `inferences.jsonl`
/// and a `review.json` manifest with the id counters. Ids are assigned per
/// review starting at 1.
#[derive(Debug)]
pub struct FileStore {
    root_dir: PathBuf,
    config: FileStoreConfig,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a new store rooted at the given base directory.
    pub fn new(base_dir: impl Into<PathBuf>, config: FileStoreConfig) -> StoreResult<Self> {
        let root_dir = base_dir.into().join(ENGINE_DIR_NAME);
        fs::create_dir_all(root_dir.join(REVIEWS_DIR_NAME))?;
        Ok(Self {
            root_dir,
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the store root directory path.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Delete all data for a review.
    pub fn delete_review(&self, review_id: i64) -> StoreResult<()> {
        let review_dir = self.review_dir(review_id)?;
        let _guard = self.lock();
        match fs::remove_dir_all(&review_dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Delete reviews not updated within the retention period.
    pub fn enforce_retention(&self) -> StoreResult<usize> {
        if self.config.retains_forever() {
            return Ok(0);
        }

        let reviews_dir = self.root_dir.join(REVIEWS_DIR_NAME);
        let cutoff = Utc::now() - Duration::days(self.config.retention_days as i64);
        let _guard = self.lock();
        let mut deleted = 0;

        for entry in fs::read_dir(&reviews_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let review_dir = entry.path();
            let Some(manifest) = read_manifest(&review_dir.join(MANIFEST_FILE_NAME))? else {
                continue;
            };

            if manifest.updated_at < cutoff {
                fs::remove_dir_all(&review_dir)?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(deleted, retention_days = self.config.retention_days, "Pruned expired reviews");
        }
        Ok(deleted)
    }

    fn review_dir(&self, review_id: i64) -> StoreResult<PathBuf> {
        if review_id < 0 {
            return Err(StoreError::InvalidReviewId(review_id));
        }
        Ok(self
            .root_dir
            .join(REVIEWS_DIR_NAME)
            .join(review_id.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate the next id with `next`, persist the advanced manifest, then
    /// append the entry `build` makes from it.
    ///
    /// An id is never handed out twice; a failed append leaves a gap.
    fn append_with_id<T, F>(
        &self,
        review_id: i64,
        file_name: &str,
        next: fn(&mut ReviewManifest) -> i64,
        build: F,
    ) -> StoreResult<i64>
    where
        T: Serialize,
        F: FnOnce(i64) -> T,
    {
        let review_dir = self.review_dir(review_id)?;
        let _guard = self.lock();
        fs::create_dir_all(&review_dir)?;

        let manifest_path = review_dir.join(MANIFEST_FILE_NAME);
        let mut manifest =
            read_manifest(&manifest_path)?.unwrap_or_else(|| ReviewManifest::new(review_id));
        let id = next(&mut manifest);
        manifest.updated_at = Utc::now();

        write_manifest(&review_dir, &manifest)?;
        append_line(&review_dir.join(file_name), &build(id))?;

        Ok(id)
    }
}

impl PromptStore for FileStore {
    fn save(&self, review_id: i64, prompt: &ReviewPrompt) -> StoreResult<i64> {
        let id = self.append_with_id(
            review_id,
            PROMPTS_FILE_NAME,
            |manifest| {
                manifest.last_prompt_id += 1;
                manifest.last_prompt_id
            },
            |id| {
                let mut stored = prompt.clone();
                stored.id = id;
                PersistedPrompt {
                    id,
                    review_id,
                    prompt: stored,
                }
            },
        )?;
        debug!(review_id, prompt_id = id, "Saved prompt");
        Ok(id)
    }

    fn find_not_finished_by_review_id(&self, review_id: i64) -> StoreResult<Vec<PersistedPrompt>> {
        let review_dir = self.review_dir(review_id)?;
        let prompts = read_lines(&review_dir.join(PROMPTS_FILE_NAME))?;
        let inferences: Vec<InferenceRecord> =
            read_lines(&review_dir.join(INFERENCES_FILE_NAME))?;
        Ok(not_finished(prompts, &inferences))
    }
}

impl InferenceStore for FileStore {
    fn save(&self, record: &InferenceRecord) -> StoreResult<i64> {
        let id = self.append_with_id(
            record.review_id,
            INFERENCES_FILE_NAME,
            |manifest| {
                manifest.last_inference_id += 1;
                manifest.last_inference_id
            },
            |id| {
                let mut stored = record.clone();
                stored.id = id;
                stored
            },
        )?;
        debug!(
            review_id = record.review_id,
            prompt_id = record.prompt_id,
            status = record.status.as_label(),
            "Saved inference record"
        );
        Ok(id)
    }

    fn find_by_review_id(&self, review_id: i64) -> StoreResult<Vec<InferenceRecord>> {
        let review_dir = self.review_dir(review_id)?;
        read_lines(&review_dir.join(INFERENCES_FILE_NAME))
    }
}

fn append_line<T: Serialize>(path: &Path, entry: &T) -> StoreResult<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let json = serde_json::to_string(entry)?;
    writeln!(file, "{}", json)?;
    file.sync_all()?;
    Ok(())
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::Io(err)),
    };

    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

fn read_manifest(manifest_path: &Path) -> StoreResult<Option<ReviewManifest>> {
    match fs::read_to_string(manifest_path) {
        Ok(content) => {
            let manifest = serde_json::from_str(&content)?;
            Ok(Some(manifest))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::Io(err)),
    }
}

fn write_manifest(review_dir: &Path, manifest: &ReviewManifest) -> StoreResult<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    let temp_path = review_dir.join(format!("{}.tmp", MANIFEST_FILE_NAME));
    let manifest_path = review_dir.join(MANIFEST_FILE_NAME);

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    fs::rename(&temp_path, &manifest_path)?;

    Ok(())
}
