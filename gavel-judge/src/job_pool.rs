//! The job pool: accepts whole submissions and drives each through the
//! judging pipeline on a fixed set of worker threads.

use crate::worker::{panic_message, Control, WorkerShared};

use gavel_protocol::{JobPoolReport, JudgeResult, RunnerReport, SubmitRequest};
use gavel_utils::cancel::CancelToken;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering::Relaxed};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::debug;

/// The full pipeline for one submission. The production implementation is
/// [`crate::pipeline::Pipeline`]; tests substitute stubs.
pub trait JudgeDriver: Send + Sync {
    fn judge(&self, request: &SubmitRequest, token: &CancelToken) -> JudgeResult;
}

struct Job {
    request: SubmitRequest,
    token: CancelToken,
    reply: Sender<JudgeResult>,
}

struct Worker {
    shared: Arc<WorkerShared>,
    ctrl_tx: Sender<Control>,
}

pub struct JobPool {
    queue_tx: Sender<Job>,
    queue_cap: usize,
    workers: Vec<Worker>,
    in_flight: Arc<AtomicI64>,
}

impl JobPool {
    pub fn new(pool_size: usize, queue_cap: usize, driver: Arc<dyn JudgeDriver>) -> Self {
        let (queue_tx, queue_rx) = bounded(queue_cap);
        let in_flight = Arc::new(AtomicI64::new(0));

        let workers = (0..pool_size)
            .map(|id| {
                let shared = Arc::new(WorkerShared::new(id));
                let (ctrl_tx, ctrl_rx) = unbounded();
                let thread_shared = shared.clone();
                let thread_queue = queue_rx.clone();
                let thread_driver = driver.clone();
                let thread_in_flight = in_flight.clone();
                thread::Builder::new()
                    .name(format!("gavel-job-{}", id))
                    .spawn(move || {
                        worker_loop(
                            thread_shared,
                            thread_queue,
                            ctrl_rx,
                            thread_driver,
                            thread_in_flight,
                        )
                    })
                    .expect("failed to spawn job worker");
                Worker { shared, ctrl_tx }
            })
            .collect();

        Self {
            queue_tx,
            queue_cap,
            workers,
            in_flight,
        }
    }

    /// Non-blocking enqueue. When the queue is full the reply channel
    /// already carries the rejection.
    pub fn submit(&self, request: SubmitRequest) -> Receiver<JudgeResult> {
        let (reply_tx, reply_rx) = bounded(1);
        let job = Job {
            request,
            token: CancelToken::new(),
            reply: reply_tx,
        };
        match self.queue_tx.try_send(job) {
            Ok(()) => {
                self.in_flight.fetch_add(1, Relaxed);
            }
            Err(err) => {
                debug!("job queue rejected a submission");
                let job = err.into_inner();
                let _ = job.reply.send(JudgeResult::internal_error(
                    "queue is full, please try again later",
                ));
            }
        }
        reply_rx
    }

    pub fn release(&self, id: usize) {
        if let Some(worker) = self.workers.get(id) {
            worker.shared.cancel_current();
            let _ = worker.ctrl_tx.send(Control::Release);
        }
    }

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

    pub fn runner_reports(&self) -> Vec<RunnerReport> {
        self.workers.iter().map(|w| w.shared.report()).collect()
    }

    pub fn report(&self) -> JobPoolReport {
        JobPoolReport {
            job_queue_num: self.queue_cap,
            job_pool_num: self.workers.len(),
            job_num: self.in_flight.load(Relaxed),
            runner_status: self.runner_reports(),
        }
    }
}

fn worker_loop(
    shared: Arc<WorkerShared>,
    queue_rx: Receiver<Job>,
    ctrl_rx: Receiver<Control>,
    driver: Arc<dyn JudgeDriver>,
    in_flight: Arc<AtomicI64>,
) {
    shared.set_idle();
    loop {
        select! {
            recv(queue_rx) -> msg => {
                let job = match msg {
                    Ok(job) => job,
                    Err(_) => break,
                };
                shared.set_running(job.token.clone());

                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    driver.judge(&job.request, &job.token)
                }))
                .unwrap_or_else(|payload| {
                    JudgeResult::internal_error(format!(
                        "job worker panicked: {}",
                        panic_message(payload.as_ref())
                    ))
                });

                let _ = job.reply.send(result);
                in_flight.fetch_sub(1, Relaxed);

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
