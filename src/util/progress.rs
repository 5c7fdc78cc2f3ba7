//! Progress reporting: local terminal progress bars plus a broadcast stream
//! of `{ jobId, task, phase, metrics }` events (§4.1, §10.7) that a future
//! control plane can subscribe to without the orchestrator depending on
//! HTTP at all.

use std::collections::HashMap;

use indicatif::ProgressBar;
use indicatif::ProgressStyle;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::task::TaskName;

/// Generates progress bars, hidden automatically when stdout is not a TTY.
#[derive(Debug, Clone)]
pub struct ProgressBars {
    hide: bool,
}

impl ProgressBars {
    pub fn setup(hide: bool) -> Self {
        ProgressBars {
            hide: hide || !atty::is(atty::Stream::Stdout),
        }
    }

    pub fn hide(&self) -> bool {
        self.hide
    }

    pub fn bar(&self) -> ProgressBar {
        let bar = if self.hide {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };

        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

/// One phase transition of one task within one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Started,
    Skipped,
    Succeeded,
    Failed,
    Retrying { attempt: u32 },
}

/// The observable side effect emitted for every task-phase transition
/// (§4.1 "Observable side effects").
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub task: TaskName,
    pub phase: String,
    pub metrics: HashMap<String, u64>,
}

impl ProgressEvent {
    pub fn new(job_id: Uuid, task: TaskName, phase: Phase, metrics: HashMap<String, u64>) -> Self {
        let phase = match phase {
            Phase::Started => "started".to_string(),
            Phase::Skipped => "skipped".to_string(),
            Phase::Succeeded => "succeeded".to_string(),
            Phase::Failed => "failed".to_string(),
            Phase::Retrying { attempt } => format!("retrying:{attempt}"),
        };
        ProgressEvent {
            job_id,
            task,
            phase,
            metrics,
        }
    }
}

/// Broadcasts [`ProgressEvent`]s to any number of subscribers. Cloning is
/// cheap; every clone shares the same channel.
#[derive(Clone)]
pub struct ProgressSink {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        ProgressSink { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Emitting is best-effort: a full channel with no subscribers is not
    /// an error for the orchestrator.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        ProgressSink::new(1024)
    }
}
