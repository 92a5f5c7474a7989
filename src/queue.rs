//! # Fallback Queue
//!
//! Crash-safe, at-least-once local storage for operations the primary store
//! rejected transiently. Entries are newline-delimited JSON in an append-only
//! file; a background drain replays them through the processor once storage
//! recovers.
//!
//! All mutating operations serialize on one whole-queue lock with a bounded
//! acquisition timeout. The lock is intentionally coarse: correctness, not
//! throughput, is the goal of the fallback path. A syntactically corrupt line
//! is logged and skipped without aborting the batch; it never takes the valid
//! entries around it down with it.

use crate::error::{PipelineError, Result};
use crate::logging;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// One queued operation, serialized as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueueEntry {
    fn new(payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            queued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries replayed successfully and removed.
    pub processed: usize,
    /// Entries that failed and remain queued for a later drain.
    pub retained: usize,
    /// Entries discarded after reaching the attempt cap.
    pub dropped: usize,
    /// Unparsable lines skipped.
    pub corrupt: usize,
}

/// Consumer side of a drain pass; implemented by whatever replays entries
/// against the primary store.
#[async_trait]
pub trait QueueItemProcessor: Send + Sync {
    async fn process(&self, payload: serde_json::Value) -> Result<()>;
}

/// Durable local queue absorbing operations while primary storage is down.
///
/// The backing store is swappable; the pipeline only depends on this
/// interface.
#[async_trait]
pub trait FallbackQueue: Send + Sync {
    /// Append one payload. Fails loudly on lock timeout; never drops
    /// silently.
    async fn enqueue(&self, payload: serde_json::Value) -> Result<()>;

    /// Replay every entry through `processor` in file order. Successes are
    /// removed; failures are kept with an incremented attempt counter unless
    /// the increment reaches `max_attempts`, in which case the entry is
    /// logged as permanently failed and dropped.
    async fn drain(
        &self,
        processor: &dyn QueueItemProcessor,
        max_attempts: u32,
    ) -> Result<DrainReport>;

    /// Number of lines currently in the queue file.
    async fn len(&self) -> Result<usize>;

    /// First `limit` parsable entries, without removing them.
    async fn peek(&self, limit: usize) -> Result<Vec<QueueEntry>>;

    /// Destructive reset.
    async fn clear(&self) -> Result<()>;
}

/// File-backed [`FallbackQueue`] guarded by a single whole-file lock.
pub struct FileFallbackQueue {
    path: PathBuf,
    lock: Mutex<()>,
    lock_timeout: Duration,
}

impl FileFallbackQueue {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        info!(queue_file = %path.display(), "FileFallbackQueue initialized");
        Self {
            path,
            lock: Mutex::new(()),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn acquire_lock(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        tokio::time::timeout(self.lock_timeout, self.lock.lock())
            .await
            .map_err(|_| {
                PipelineError::Queue(format!(
                    "timed out after {:?} waiting for queue lock on {}",
                    self.lock_timeout,
                    self.path.display()
                ))
            })
    }

    /// Parse every line of the queue file, counting (and logging) corrupt
    /// lines instead of failing the batch.
    fn parse_lines(&self, contents: &str) -> (Vec<QueueEntry>, usize) {
        let mut entries = Vec::new();
        let mut corrupt = 0;

        for (line_number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<QueueEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    corrupt += 1;
                    warn!(
                        queue_file = %self.path.display(),
                        line = line_number + 1,
                        error = %e,
                        "Corrupt queue entry skipped"
                    );
                }
            }
        }

        (entries, corrupt)
    }

    async fn read_contents(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::Queue(format!(
                "failed to read queue file {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn rewrite(&self, entries: &[QueueEntry]) -> Result<()> {
        let mut contents = String::new();
        for entry in entries {
            contents.push_str(&serde_json::to_string(entry)?);
            contents.push('\n');
        }
        tokio::fs::write(&self.path, contents).await.map_err(|e| {
            PipelineError::Queue(format!(
                "failed to rewrite queue file {}: {e}",
                self.path.display()
            ))
        })
    }
}

#[async_trait]
impl FallbackQueue for FileFallbackQueue {
    async fn enqueue(&self, payload: serde_json::Value) -> Result<()> {
        let _guard = self.acquire_lock().await?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    PipelineError::Queue(format!(
                        "failed to create queue directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let entry = QueueEntry::new(payload);
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                PipelineError::Queue(format!(
                    "failed to open queue file {}: {e}",
                    self.path.display()
                ))
            })?;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            PipelineError::Queue(format!("failed to append queue entry: {e}"))
        })?;
        file.flush()
            .await
            .map_err(|e| PipelineError::Queue(format!("failed to flush queue file: {e}")))?;

        logging::log_queue_operation(
            "enqueue",
            &self.path.display().to_string(),
            None,
            "queued",
            None,
        );
        Ok(())
    }

    async fn drain(
        &self,
        processor: &dyn QueueItemProcessor,
        max_attempts: u32,
    ) -> Result<DrainReport> {
        let _guard = self.acquire_lock().await?;

        let Some(contents) = self.read_contents().await? else {
            return Ok(DrainReport::default());
        };

        let (entries, corrupt) = self.parse_lines(&contents);
        let mut report = DrainReport {
            corrupt,
            ..DrainReport::default()
        };
        let mut retained = Vec::new();

        for mut entry in entries {
            match processor.process(entry.payload.clone()).await {
                Ok(()) => {
                    report.processed += 1;
                    info!(entry_id = %entry.id, "Processed queued entry");
                }
                Err(e) => {
                    entry.attempts += 1;
                    entry.last_error = Some(e.to_string());

                    if entry.attempts < max_attempts {
                        warn!(
                            entry_id = %entry.id,
                            attempts = entry.attempts,
                            error = %e,
                            "Failed to process queued entry, will retry on next drain"
                        );
                        report.retained += 1;
                        retained.push(entry);
                    } else {
                        // Attempt cap reached: dropped, not retained. The
                        // `dropped` counter is the hook a dead-letter sink
                        // would consume.
                        error!(
                            entry_id = %entry.id,
                            attempts = entry.attempts,
                            error = %e,
                            "Permanently failed to process queued entry, dropping"
                        );
                        report.dropped += 1;
                    }
                }
            }
        }

        self.rewrite(&retained).await?;

        logging::log_queue_operation(
            "drain",
            &self.path.display().to_string(),
            Some(report.retained),
            "complete",
            Some(&format!(
                "processed={} retained={} dropped={} corrupt={}",
                report.processed, report.retained, report.dropped, report.corrupt
            )),
        );
        Ok(report)
    }

    async fn len(&self) -> Result<usize> {
        let _guard = self.acquire_lock().await?;
        match self.read_contents().await? {
            Some(contents) => Ok(contents.lines().filter(|l| !l.trim().is_empty()).count()),
            None => Ok(0),
        }
    }

    async fn peek(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        let _guard = self.acquire_lock().await?;
        match self.read_contents().await? {
            Some(contents) => {
                let (mut entries, _corrupt) = self.parse_lines(&contents);
                entries.truncate(limit);
                Ok(entries)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.acquire_lock().await?;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(queue_file = %self.path.display(), "Queue cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::Queue(format!(
                "failed to clear queue file {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use serde_json::json;
    use std::sync::Arc;

    fn temp_queue(dir: &tempfile::TempDir) -> FileFallbackQueue {
        FileFallbackQueue::new(dir.path().join("queue.jsonl"), Duration::from_secs(5))
    }

    /// Records everything it sees; succeeds or fails per the flag.
    struct RecordingProcessor {
        seen: Arc<SyncMutex<Vec<serde_json::Value>>>,
        succeed: bool,
    }

    #[async_trait]
    impl QueueItemProcessor for RecordingProcessor {
        async fn process(&self, payload: serde_json::Value) -> Result<()> {
            self.seen.lock().push(payload);
            if self.succeed {
                Ok(())
            } else {
                Err(PipelineError::TransientStorage("still down".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_enqueue_then_len() {
        let dir = tempfile::tempdir().unwrap();
        let queue = temp_queue(&dir);

        for i in 0..5 {
            queue.enqueue(json!({ "n": i })).await.unwrap();
        }
        assert_eq!(queue.len().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_drain_success_empties_queue_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let queue = temp_queue(&dir);

        for i in 0..4 {
            queue.enqueue(json!({ "n": i })).await.unwrap();
        }

        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let processor = RecordingProcessor {
            seen: seen.clone(),
            succeed: true,
        };
        let report = queue.drain(&processor, 3).await.unwrap();

        assert_eq!(report.processed, 4);
        assert_eq!(report.retained, 0);
        assert_eq!(report.dropped, 0);
        assert_eq!(queue.len().await.unwrap(), 0);

        let observed: Vec<i64> = seen
            .lock()
            .iter()
            .map(|v| v["n"].as_i64().unwrap())
            .collect();
        assert_eq!(observed, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let queue = temp_queue(&dir);

        queue.enqueue(json!({ "n": 0 })).await.unwrap();
        // Inject garbage between two valid entries.
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(queue.path())
                .unwrap();
            writeln!(file, "{{this is not json").unwrap();
        }
        queue.enqueue(json!({ "n": 1 })).await.unwrap();

        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let processor = RecordingProcessor {
            seen: seen.clone(),
            succeed: true,
        };
        let report = queue.drain(&processor, 3).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.corrupt, 1);
        let observed: Vec<i64> = seen
            .lock()
            .iter()
            .map(|v| v["n"].as_i64().unwrap())
            .collect();
        assert_eq!(observed, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_failed_entries_retained_with_attempt_counts() {
        let dir = tempfile::tempdir().unwrap();
        let queue = temp_queue(&dir);
        queue.enqueue(json!({ "n": 0 })).await.unwrap();

        let processor = RecordingProcessor {
            seen: Arc::new(SyncMutex::new(Vec::new())),
            succeed: false,
        };
        let report = queue.drain(&processor, 3).await.unwrap();
        assert_eq!(report.retained, 1);
        assert_eq!(queue.len().await.unwrap(), 1);

        let entries = queue.peek(10).await.unwrap();
        assert_eq!(entries[0].attempts, 1);
        assert!(entries[0].last_error.as_deref().unwrap().contains("still down"));
    }

    #[tokio::test]
    async fn test_entry_dropped_at_attempt_cap() {
        let dir = tempfile::tempdir().unwrap();
        let queue = temp_queue(&dir);
        queue.enqueue(json!({ "n": 0 })).await.unwrap();

        let processor = RecordingProcessor {
            seen: Arc::new(SyncMutex::new(Vec::new())),
            succeed: false,
        };
        for expected_remaining in [1, 1, 0] {
            queue.drain(&processor, 3).await.unwrap();
            assert_eq!(queue.len().await.unwrap(), expected_remaining);
        }

        let final_report = queue.drain(&processor, 3).await.unwrap();
        assert_eq!(final_report, DrainReport::default());
    }

    #[tokio::test]
    async fn test_drain_on_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let queue = temp_queue(&dir);

        let processor = RecordingProcessor {
            seen: Arc::new(SyncMutex::new(Vec::new())),
            succeed: true,
        };
        let report = queue.drain(&processor, 3).await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let dir = tempfile::tempdir().unwrap();
        let queue = temp_queue(&dir);
        queue.enqueue(json!({ "n": 0 })).await.unwrap();
        queue.enqueue(json!({ "n": 1 })).await.unwrap();

        let peeked = queue.peek(1).await.unwrap();
        assert_eq!(peeked.len(), 1);
        assert_eq!(peeked[0].payload["n"], 0);
        assert_eq!(queue.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let queue = temp_queue(&dir);
        queue.enqueue(json!({ "n": 0 })).await.unwrap();
        queue.clear().await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
        // Clearing an already-empty queue is fine.
        queue.clear().await.unwrap();
    }
}
