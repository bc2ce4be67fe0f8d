//! Reclamation of transient artifacts.
//!
//! Artifacts are released first (opened and closed, best effort), then
//! deleted. Deletion is retried with a fixed delay while the platform
//! reports the artifact as locked; other failures are not retried. Nothing
//! here fails the run: every artifact ends with a [`ReclaimOutcome`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use grid_dataset::check_store;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Filesystem operations used during reclamation.
pub trait ArtifactFs {
    /// Open and close the artifact so no handle of ours keeps it busy.
    fn release(&self, path: &Path) -> io::Result<()>;

    /// Delete the artifact.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Artifacts on the local filesystem, stored as Zarr directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl ArtifactFs for LocalFs {
    fn release(&self, path: &Path) -> io::Result<()> {
        if !path.exists() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "artifact not found"));
        }
        check_store(path).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }
}

impl<F: ArtifactFs + ?Sized> ArtifactFs for &F {
    fn release(&self, path: &Path) -> io::Result<()> {
        (**self).release(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        (**self).remove(path)
    }
}

/// Bounded retry for deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total deletion attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

/// How reclamation of one artifact ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimStatus {
    /// Deleted by us.
    Removed,
    /// Already gone.
    AlreadyGone,
    /// Still locked after every attempt.
    GaveUp,
    /// Failed with an error that retrying would not fix.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReclaimOutcome {
    pub path: PathBuf,
    pub status: ReclaimStatus,
    /// Deletion attempts made.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ReclaimOutcome {
    pub fn is_reclaimed(&self) -> bool {
        matches!(self.status, ReclaimStatus::Removed | ReclaimStatus::AlreadyGone)
    }

    /// Attempts that failed before the final one.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Releases and deletes transient artifacts.
pub struct LifecycleManager<F: ArtifactFs = LocalFs> {
    fs: F,
    policy: RetryPolicy,
}

impl LifecycleManager<LocalFs> {
    pub fn local(policy: RetryPolicy) -> Self {
        Self::new(LocalFs, policy)
    }
}

impl<F: ArtifactFs> LifecycleManager<F> {
    pub fn new(fs: F, policy: RetryPolicy) -> Self {
        Self { fs, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Release every artifact, then delete every artifact.
    pub fn reclaim(&self, paths: &[PathBuf]) -> Vec<ReclaimOutcome> {
        if paths.is_empty() {
            return Vec::new();
        }

        for path in paths {
            self.release(path);
        }

        let outcomes: Vec<ReclaimOutcome> = paths.iter().map(|p| self.delete(p)).collect();

        let reclaimed = outcomes.iter().filter(|o| o.is_reclaimed()).count();
        info!(
            artifacts = paths.len(),
            reclaimed,
            left_behind = paths.len() - reclaimed,
            "Reclaimed transient artifacts"
        );
        outcomes
    }

    fn release(&self, path: &Path) {
        match self.fs.release(path) {
            Ok(()) => debug!(artifact = %path.display(), "Released artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(artifact = %path.display(), "Artifact already gone before release")
            }
            Err(e) => warn!(artifact = %path.display(), error = %e, "Failed to release artifact"),
        }
    }

    /// Delete one artifact under the retry policy.
    pub fn delete(&self, path: &Path) -> ReclaimOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.fs.remove(path) {
                Ok(()) => {
                    debug!(artifact = %path.display(), attempt, "Deleted artifact");
                    return outcome(path, ReclaimStatus::Removed, attempt, None);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return outcome(path, ReclaimStatus::AlreadyGone, attempt, None);
                }
                Err(e) => e,
            };

            if !is_lock_error(&err) {
                warn!(
                    artifact = %path.display(),
                    attempt,
                    error = %err,
                    "Failed to delete artifact"
                );
                return outcome(path, ReclaimStatus::Failed, attempt, Some(err.to_string()));
            }

            if attempt >= max_attempts {
                warn!(
                    artifact = %path.display(),
                    attempts = attempt,
                    error = %err,
                    "Giving up on locked artifact"
                );
                return outcome(path, ReclaimStatus::GaveUp, attempt, Some(err.to_string()));
            }

            warn!(
                artifact = %path.display(),
                attempt,
                max_attempts,
                delay_ms = self.policy.delay.as_millis() as u64,
                error = %err,
                "Artifact is locked, retrying deletion"
            );
            if !self.policy.delay.is_zero() {
                thread::sleep(self.policy.delay);
            }
        }
    }
}

fn outcome(
    path: &Path,
    status: ReclaimStatus,
    attempts: u32,
    last_error: Option<String>,
) -> ReclaimOutcome {
    ReclaimOutcome {
        path: path.to_path_buf(),
        status,
        attempts,
        last_error,
    }
}

/// True for errors that mean another handle still holds the file.
pub fn is_lock_error(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    match err.raw_os_error() {
        // EBUSY, ETXTBSY
        Some(16) | Some(26) if cfg!(unix) => true,
        // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        Some(32) | Some(33) if cfg!(windows) => true,
        _ => false,
    }
}
