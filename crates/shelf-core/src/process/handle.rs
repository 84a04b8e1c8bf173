//! Handle to a live runtime process.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::{watch, Notify};

/// How a runtime process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when terminated by a signal or when waiting failed.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A runtime child started for one target file.
///
/// Shared as `Arc<RuntimeProcess>`; repeated runs for the same file while
/// it is alive hand out the same `Arc`.
#[derive(Debug)]
pub struct RuntimeProcess {
    file: PathBuf,
    version: String,
    executable: PathBuf,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    exit: watch::Receiver<Option<ProcessExit>>,
    kill: Notify,
}

impl RuntimeProcess {
    pub(crate) fn new(
        file: PathBuf,
        version: String,
        executable: PathBuf,
        pid: Option<u32>,
        exit: watch::Receiver<Option<ProcessExit>>,
    ) -> Self {
        Self {
            file,
            version,
            executable,
            pid,
            started_at: Utc::now(),
            exit,
            kill: Notify::new(),
        }
    }

    /// Target file the process was started for.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Version the process was started with.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_running(&self) -> bool {
        self.exit.borrow().is_none()
    }

    /// Exit information once the process has ended.
    pub fn exit(&self) -> Option<ProcessExit> {
        *self.exit.borrow()
    }

    /// Wait for the process to end.
    pub async fn wait(&self) -> ProcessExit {
        let mut exit = self.exit.clone();
        loop {
            if let Some(status) = *exit.borrow_and_update() {
                return status;
            }
            if exit.changed().await.is_err() {
                // Observer gone without reporting; treat as ended.
                return exit.borrow().unwrap_or(ProcessExit { code: None });
            }
        }
    }

    /// Ask the observer to terminate the process.
    pub fn kill(&self) {
        self.kill.notify_one();
    }

    pub(crate) async fn kill_requested(&self) {
        self.kill.notified().await
    }
}
