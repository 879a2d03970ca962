//! File-based rendezvous between a leader and follower processes
//!
//! The leader publishes the encoded suite state (or an abort marker) into a
//! shared directory; followers poll for it. Each follower drops a completion
//! marker when its tests are done and the leader waits for all of them
//! before tearing down. Files are written to a temp file and persisted so a
//! reader never observes a partial write.
//!
//! A directory may be reused across runs. The leader resets it before setup
//! and retires the state after teardown; completion markers carry the run id
//! so a leftover marker never satisfies a later run's barrier.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::{NodeId, RunId};
use tempfile::NamedTempFile;
use tokio::time::{Instant, sleep};

use crate::error::{HarnessError, HarnessResult};

const STATE_FILE: &str = "suite-state.json";
const ABORT_FILE: &str = "suite-aborted";
const DONE_SUFFIX: &str = ".done";

/// Contents of a `worker_N.done` file
#[derive(Debug, Serialize, Deserialize)]
struct CompletionMarker {
    /// Run whose state the worker adopted; unknown when none arrived
    run_id: Option<RunId>,
    passed: bool,
}

#[derive(Debug, Clone)]
pub struct FileRendezvous {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FileRendezvous {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Publish the encoded state for followers to adopt
    pub async fn publish_state(&self, encoded: &[u8]) -> HarnessResult<()> {
        self.write_atomic(STATE_FILE, encoded.to_vec()).await?;
        tracing::info!("📤 Published suite state to {}", self.dir.display());
        Ok(())
    }

    /// Tell followers setup failed and no state is coming
    pub async fn publish_abort(&self, reason: &str) -> HarnessResult<()> {
        self.write_atomic(ABORT_FILE, reason.as_bytes().to_vec()).await?;
        tracing::warn!("📤 Published suite abort: {}", reason);
        Ok(())
    }

    /// Wait for the leader's state, failing fast on an abort marker
    pub async fn await_state(&self, timeout: Duration) -> HarnessResult<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let state_path = self.dir.join(STATE_FILE);
        let abort_path = self.dir.join(ABORT_FILE);

        loop {
            if let Some(reason) = read_if_present(&abort_path).await? {
                return Err(HarnessError::SetupFailure {
                    message: format!("leader aborted the run: {}", String::from_utf8_lossy(&reason)),
                });
            }
            if let Some(encoded) = read_if_present(&state_path).await? {
                return Ok(encoded);
            }
            if Instant::now() >= deadline {
                return Err(HarnessError::Timeout {
                    resource: state_path.display().to_string(),
                    last_state: "not published".to_string(),
                    elapsed: timeout,
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Remove state, abort and completion files left by an earlier run
    pub async fn reset(&self) -> HarnessResult<()> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name == STATE_FILE || name == ABORT_FILE || name.ends_with(DONE_SUFFIX) {
                remove_if_present(&entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("🧽 Cleared {} leftover rendezvous files from {}", removed, self.dir.display());
        }
        Ok(())
    }

    /// Withdraw published state once the resources it names are gone
    pub async fn retire_state(&self) -> HarnessResult<()> {
        remove_if_present(&self.dir.join(STATE_FILE)).await
    }

    /// Drop this worker's completion marker for `run_id`
    pub async fn signal_done(&self, worker: NodeId, run_id: Option<RunId>, passed: bool) -> HarnessResult<()> {
        let marker = serde_json::to_vec(&CompletionMarker { run_id, passed }).map_err(|e| {
            shared::SharedError::SerializationError {
                message: e.to_string(),
            }
        })?;
        self.write_atomic(&format!("{worker}{DONE_SUFFIX}"), marker).await
    }

    /// Completion markers for `run_id` present right now, as (worker, passed)
    ///
    /// Markers from other runs, or without a readable run id, are ignored.
    pub async fn completed(&self, run_id: RunId) -> HarnessResult<Vec<(NodeId, bool)>> {
        let mut done = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(done),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(node) = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(DONE_SUFFIX))
                .and_then(parse_worker)
            else {
                continue;
            };
            let Some(contents) = read_if_present(&entry.path()).await? else {
                continue;
            };
            match serde_json::from_slice::<CompletionMarker>(&contents) {
                Ok(marker) if marker.run_id == Some(run_id) => done.push((node, marker.passed)),
                Ok(marker) => {
                    tracing::debug!(worker = %node, "Ignoring completion marker for run {:?}", marker.run_id);
                }
                Err(e) => {
                    tracing::debug!(worker = %node, "Ignoring unreadable completion marker: {}", e);
                }
            }
        }

        done.sort_by_key(|(node, _)| match node {
            NodeId::Leader => 0,
            NodeId::Worker(n) => *n,
        });
        Ok(done)
    }

    /// Barrier: wait until followers `worker_1..=worker_{expected}` all reported for `run_id`
    pub async fn await_all_done(
        &self,
        run_id: RunId,
        expected: u32,
        timeout: Duration,
    ) -> HarnessResult<Vec<(NodeId, bool)>> {
        let deadline = Instant::now() + timeout;

        loop {
            let done = self.completed(run_id).await?;
            let missing: Vec<String> = (1..=expected)
                .map(NodeId::Worker)
                .filter(|node| !done.iter().any(|(d, _)| d == node))
                .map(|node| node.to_string())
                .collect();

            if missing.is_empty() {
                return Ok(done);
            }
            if Instant::now() >= deadline {
                return Err(HarnessError::Timeout {
                    resource: format!("completion markers for {}", missing.join(", ")),
                    last_state: format!("{} of {} workers done", expected as usize - missing.len(), expected),
                    elapsed: timeout,
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn write_atomic(&self, file_name: &str, contents: Vec<u8>) -> HarnessResult<()> {
        let dir = self.dir.clone();
        let target = self.dir.join(file_name);

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut file = NamedTempFile::new_in(&dir)?;
            file.write_all(&contents)?;
            file.as_file().sync_all()?;
            file.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| HarnessError::Io(std::io::Error::other(e)))??;

        Ok(())
    }
}

fn parse_worker(name: &str) -> Option<NodeId> {
    name.strip_prefix("worker_")?.parse().ok().map(NodeId::Worker)
}

async fn remove_if_present(path: &Path) -> HarnessResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn read_if_present(path: &Path) -> HarnessResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
