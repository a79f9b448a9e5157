//! State shared between a worker thread and its pool.

use gavel_protocol::RunnerReport;
use gavel_utils::cancel::CancelToken;

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopped,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Idle => "Idle",
            WorkerState::Running => "Running",
            WorkerState::Stopped => "Stopped",
        }
    }
}

/// Control messages consumed by a worker sitting in its select loop.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Control {
    Stop,
    Release,
}

pub(crate) struct WorkerShared {
    id: usize,
    snapshot: Mutex<Snapshot>,
    stop_requested: AtomicBool,
}

struct Snapshot {
    state: WorkerState,
    started_at: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl WorkerShared {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            snapshot: Mutex::new(Snapshot {
                state: WorkerState::Stopped,
                started_at: None,
                cancel: None,
            }),
            stop_requested: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_idle(&self) {
        let mut snap = self.lock();
        snap.state = WorkerState::Idle;
        snap.started_at = None;
        snap.cancel = None;
    }

    pub(crate) fn set_running(&self, cancel: CancelToken) {
        let mut snap = self.lock();
        snap.state = WorkerState::Running;
        snap.started_at = Some(Instant::now());
        snap.cancel = Some(cancel);
    }

    pub(crate) fn set_stopped(&self) {
        let mut snap = self.lock();
        snap.state = WorkerState::Stopped;
        snap.started_at = None;
        snap.cancel = None;
    }

    /// Cancel whatever is currently running; the worker returns to Idle once
    /// the task observes the cancellation.
    pub(crate) fn cancel_current(&self) {
        let snap = self.lock();
        if let Some(cancel) = &snap.cancel {
            cancel.cancel();
        }
    }

    /// Cancel the current task and make the worker shut down once it
    /// finishes.
    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Relaxed);
        self.cancel_current();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Relaxed)
    }

    pub(crate) fn report(&self) -> RunnerReport {
        let snap = self.lock();
        let time_used = match (snap.state, snap.started_at) {
            (WorkerState::Running, Some(at)) => at.elapsed().as_secs_f64(),
            _ => 0.0,
        };
        RunnerReport {
            id: self.id,
            status: snap.state.as_str().to_owned(),
            time_used,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
