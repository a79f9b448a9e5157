//! The run pool: a bounded queue of single-execution tasks and a fixed set
//! of worker threads consuming it.

use crate::worker::{panic_message, Control, WorkerShared};

use gavel_protocol::{RunPoolReport, RunnerReport, TestResult};
use gavel_utils::cancel::CancelToken;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::debug;

/// A single sandboxed execution under cancellation.
///
/// The concrete implementation is bound to its command, workdir, limits and
/// stdin at job-worker scope; the pool only sees this interface.
pub trait RunTask: Send {
    fn run(self: Box<Self>, token: &CancelToken) -> TestResult;
}

struct RunJob {
    task: Box<dyn RunTask>,
    token: CancelToken,
    reply: Sender<TestResult>,
}

struct Worker {
    shared: Arc<WorkerShared>,
    ctrl_tx: Sender<Control>,
}

pub struct RunPool {
    queue_tx: Sender<RunJob>,
    queue_cap: usize,
    workers: Vec<Worker>,
}

impl RunPool {
    pub fn new(pool_size: usize, queue_cap: usize) -> Self {
        let (queue_tx, queue_rx) = bounded(queue_cap);

        let workers = (0..pool_size)
            .map(|id| {
                let shared = Arc::new(WorkerShared::new(id));
                let (ctrl_tx, ctrl_rx) = unbounded();
                let thread_shared = shared.clone();
                let thread_queue = queue_rx.clone();
                thread::Builder::new()
                    .name(format!("gavel-run-{}", id))
                    .spawn(move || worker_loop(thread_shared, thread_queue, ctrl_rx))
                    .expect("failed to spawn run worker");
                Worker { shared, ctrl_tx }
            })
            .collect();

        Self {
            queue_tx,
            queue_cap,
            workers,
        }
    }

    /// Non-blocking enqueue. When the queue is full the reply channel
    /// already carries a synthetic InternalError result.
    pub fn submit(&self, task: Box<dyn RunTask>, token: CancelToken) -> Receiver<TestResult> {
        let (reply_tx, reply_rx) = bounded(1);
        let job = RunJob {
            task,
            token,
            reply: reply_tx,
        };
        if let Err(err) = self.queue_tx.try_send(job) {
            debug!("run queue rejected a job");
            let job = err.into_inner();
            let _ = job.reply.send(TestResult::internal_error("run queue is full"));
        }
        reply_rx
    }

    pub fn submit_and_wait(&self, task: Box<dyn RunTask>, token: CancelToken) -> TestResult {
        self.submit(task, token)
            .recv()
            .unwrap_or_else(|_| TestResult::internal_error("run reply channel closed"))
    }

    /// Cancel the worker's current task; it returns to Idle afterwards.
    pub fn release(&self, id: usize) {
        if let Some(worker) = self.workers.get(id) {
            worker.shared.cancel_current();
            let _ = worker.ctrl_tx.send(Control::Release);
        }
    }

    /// Cancel the worker's current task and shut it down.
    pub fn stop(&self, id: usize) {
        if let Some(worker) = self.workers.get(id) {
            worker.shared.request_stop();
            let _ = worker.ctrl_tx.send(Control::Stop);
        }
    }

    pub fn stop_all(&self) {
        for id in 0..self.workers.len() {
            self.stop(id);
        }
    }

    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    pub fn queue_cap(&self) -> usize {
        self.queue_cap
    }

    pub fn runner_reports(&self) -> Vec<RunnerReport> {
        self.workers.iter().map(|w| w.shared.report()).collect()
    }

    pub fn report(&self) -> RunPoolReport {
        RunPoolReport {
            run_queue_num: self.queue_cap,
            run_pool_num: self.workers.len(),
            runner_status: self.runner_reports(),
        }
    }
}

fn worker_loop(shared: Arc<WorkerShared>, queue_rx: Receiver<RunJob>, ctrl_rx: Receiver<Control>) {
    shared.set_idle();
    loop {
        select! {
            recv(queue_rx) -> msg => {
                let job = match msg {
                    Ok(job) => job,
                    Err(_) => break,
                };
                shared.set_running(job.token.clone());

                let task = job.task;
                let token = job.token;
                let result = panic::catch_unwind(AssertUnwindSafe(|| task.run(&token)))
                    .unwrap_or_else(|payload| {
                        TestResult::internal_error(format!(
                            "run worker panicked: {}",
                            panic_message(payload.as_ref())
                        ))
                    });
                let _ = job.reply.send(result);

                shared.set_idle();
                if shared.stop_requested() {
                    break;
                }
            }
            recv(ctrl_rx) -> msg => {
                match msg {
                    Ok(Control::Release) => {}
                    Ok(Control::Stop) | Err(_) => break,
                }
            }
        }
    }
    shared.set_stopped();
}
