//! Job Store: owns every text artifact on disk.
//!
//! Layout is a single flat directory with one file per job:
//!
//! ```text
//! outputs/
//!   3f0c…-…_output.txt
//!   9a41…-…_output.txt
//! ```
//!
//! Each job id maps to a disjoint path, so operations on different jobs
//! never contend. Within a job, overwrite and delete hold a per-job lock and
//! apply in arrival order: a save that lands after a delete reports
//! `JobNotFound` instead of bringing the artifact back. Writes go to a
//! uniquely named temp file that is then renamed over the artifact, so
//! readers (which take no lock) see either the old or the new text.

use crate::error::OcrError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fixed suffix appended to every artifact file name.
pub const ARTIFACT_SUFFIX: &str = "_output.txt";

/// Collision-resistant job identifier (random UUID v4).
///
/// Parsing accepts any textual UUID form (hyphenated, simple, braced or
/// `urn:uuid:`) but a job id always displays hyphenated, and no accepted form
/// can carry a path separator into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Name of the artifact file for this job.
    pub fn artifact_file_name(&self) -> String {
        format!("{}{}", self.0, ARTIFACT_SUFFIX)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(JobId)
            .map_err(|_| OcrError::InvalidJobId {
                input: s.to_string(),
            })
    }
}

/// Filesystem-backed artifact store.
///
/// Clones share the same directory and the same per-job locks.
#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
    locks: Arc<DashMap<JobId, Arc<Mutex<()>>>>,
}

impl JobStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, OcrError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| OcrError::storage(&root, e))?;
        debug!("Job store ready at {}", root.display());
        Ok(Self {
            root,
            locks: Arc::new(DashMap::new()),
        })
    }

    /// Directory holding the artifacts.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact for `job_id` (which may not exist).
    pub fn artifact_path(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.artifact_file_name())
    }

    /// Persist `text` under a newly generated job id.
    pub async fn create(&self, text: &str) -> Result<JobId, OcrError> {
        let job_id = JobId::new();
        self.create_with_id(&job_id, text).await?;
        Ok(job_id)
    }

    /// Persist `text` for a job id minted elsewhere.
    ///
    /// Fails if an artifact for this id already exists; ids are never reused.
    pub async fn create_with_id(&self, job_id: &JobId, text: &str) -> Result<(), OcrError> {
        let path = self.artifact_path(job_id);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                if e.kind() == IoErrorKind::AlreadyExists {
                    OcrError::Internal(format!("job id collision for {job_id}"))
                } else {
                    OcrError::storage(&path, e)
                }
            })?;

        let written = async {
            file.write_all(text.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            // Don't leave a truncated artifact behind.
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(OcrError::storage(&path, e));
        }

        info!("Created artifact for job {} ({} bytes)", job_id, text.len());
        Ok(())
    }

    /// Read the artifact text for `job_id`.
    pub async fn read(&self, job_id: &JobId) -> Result<String, OcrError> {
        let path = self.artifact_path(job_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(OcrError::JobNotFound {
                job_id: job_id.to_string(),
            }),
            Err(e) => Err(OcrError::storage(&path, e)),
        }
    }

    /// Replace the artifact text for `job_id`. Last write wins.
    pub async fn overwrite(&self, job_id: &JobId, text: &str) -> Result<(), OcrError> {
        let lock = self.job_lock(job_id);
        let result = {
            let _guard = lock.lock().await;
            self.overwrite_locked(job_id, text).await
        };
        drop(lock);
        self.release_job_lock(job_id);
        result
    }

    async fn overwrite_locked(&self, job_id: &JobId, text: &str) -> Result<(), OcrError> {
        let path = self.artifact_path(job_id);
        if !path_exists(&path).await? {
            return Err(OcrError::JobNotFound {
                job_id: job_id.to_string(),
            });
        }

        let tmp_path = self.root.join(temp_file_name(job_id));
        if let Err(e) = tokio::fs::write(&tmp_path, text.as_bytes()).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(OcrError::storage(&tmp_path, e));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(OcrError::storage(&path, e));
        }

        debug!("Overwrote artifact for job {} ({} bytes)", job_id, text.len());
        Ok(())
    }

    /// Remove the artifact for `job_id`. Deleting a missing job is not an error.
    pub async fn delete(&self, job_id: &JobId) -> Result<(), OcrError> {
        let lock = self.job_lock(job_id);
        let result = {
            let _guard = lock.lock().await;
            self.delete_locked(job_id).await
        };
        drop(lock);
        self.release_job_lock(job_id);
        result
    }

    async fn delete_locked(&self, job_id: &JobId) -> Result<(), OcrError> {
        let path = self.artifact_path(job_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted artifact for job {}", job_id);
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(OcrError::storage(&path, e)),
        }
    }

    /// Remove a leftover temp file of `job_id`.
    ///
    /// Taken under the job lock, so no overwrite of that job is mid-write.
    async fn remove_orphan_temp(&self, job_id: &JobId, path: &Path) -> bool {
        let lock = self.job_lock(job_id);
        let removed = {
            let _guard = lock.lock().await;
            match tokio::fs::remove_file(path).await {
                Ok(()) => true,
                Err(e) if e.kind() == IoErrorKind::NotFound => false,
                Err(e) => {
                    warn!("Could not remove temp file {}: {}", path.display(), e);
                    false
                }
            }
        };
        drop(lock);
        self.release_job_lock(job_id);
        removed
    }

    fn job_lock(&self, job_id: &JobId) -> Arc<Mutex<()>> {
        self.locks.entry(*job_id).or_default().clone()
    }

    /// Forget the lock once nobody but the table holds it.
    fn release_job_lock(&self, job_id: &JobId) {
        self.locks
            .remove_if(job_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Whether an artifact currently exists for `job_id`.
    pub async fn exists(&self, job_id: &JobId) -> Result<bool, OcrError> {
        path_exists(&self.artifact_path(job_id)).await
    }

    /// Delete every artifact whose last modification is older than `ttl`.
    ///
    /// Temp files left behind by an interrupted overwrite are collected on
    /// the same pass. Returns the number of artifacts removed. Files that
    /// don't look like ours are left alone; unreadable entries are skipped
    /// with a warning.
    pub async fn sweep_expired(&self, ttl: Duration) -> Result<usize, OcrError> {
        let now = SystemTime::now();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| OcrError::storage(&self.root, e))?;
        let mut removed = 0;
        let mut orphans = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OcrError::storage(&self.root, e))?
        {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };
            if let Some(job_id) = parse_temp_name(name_str) {
                if self.remove_orphan_temp(&job_id, &entry.path()).await {
                    orphans += 1;
                }
                continue;
            }
            let Some(job_id) = parse_artifact_name(name_str) else {
                continue;
            };

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping {:?} during sweep: {}", name, e);
                    continue;
                }
            };

            let age = now.duration_since(modified).unwrap_or_default();
            if age > ttl {
                self.delete(&job_id).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Retention sweep removed {} expired artifacts", removed);
        }
        if orphans > 0 {
            info!("Retention sweep removed {} orphaned temp files", orphans);
        }
        Ok(removed)
    }
}

/// Unique temp name per write: two concurrent saves never share a temp file.
fn temp_file_name(job_id: &JobId) -> String {
    format!(".{}.{}.tmp", job_id, Uuid::new_v4().simple())
}

/// Extract the job id from a temp file name written by [`temp_file_name`].
fn parse_temp_name(name: &str) -> Option<JobId> {
    let (job_id, _) = name
        .strip_prefix('.')?
        .strip_suffix(".tmp")?
        .rsplit_once('.')?;
    job_id.parse().ok()
}

/// Extract the job id from an artifact file name.
fn parse_artifact_name(name: &str) -> Option<JobId> {
    name.strip_suffix(ARTIFACT_SUFFIX)
        .and_then(|id| id.parse().ok())
}

async fn path_exists(path: &Path) -> Result<bool, OcrError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| OcrError::storage(path, e))
}
