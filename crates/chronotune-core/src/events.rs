use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::OrganizerConfig;
use crate::organize::{FailureReason, SkipReason};
use crate::resolution::Resolution;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Scanning,
    Resolving,
    Organizing,
    Finished,
    Faulted(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    ScanFinished { files: usize },
    Resolved { path: PathBuf, resolution: Resolution },
    BackedUp { source: PathBuf, backup: PathBuf },
    Moved { source: PathBuf, destination: PathBuf },
    Skipped { path: PathBuf, reason: SkipReason },
    Failed { path: PathBuf, reason: FailureReason },
    Finished { moved: usize, skipped: usize, failed: usize },
}

/// Shared state of one organizing run: configuration, progress signal and abort switch.
#[derive(Debug)]
pub struct RunContext {
    pub config: Arc<OrganizerConfig>,
    pub signal: broadcast::Sender<RunEvent>,
    pub cancel: CancellationToken,
    status: RwLock<RunStatus>,
}

impl RunContext {
    pub fn new(config: OrganizerConfig) -> Self {
        let (signal, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config: Arc::new(config),
            signal,
            cancel: CancellationToken::new(),
            status: RwLock::new(RunStatus::Idle),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.signal.subscribe()
    }

    /// Nobody listening is fine; events are advisory.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.signal.send(event);
    }

    pub fn status(&self) -> RunStatus {
        self.status.read().clone()
    }

    pub(crate) fn set_status(&self, status: RunStatus) {
        *self.status.write() = status;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
