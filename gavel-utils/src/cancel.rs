use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Select, Sender, TryRecvError};

/// A message that is never sent; the channels below signal purely through
/// disconnection.
#[derive(Debug)]
pub enum Never {}

/// Hierarchical cancellation token for thread-based workers.
///
/// Cancellation is broadcast by dropping the sender half of a rendezvous
/// channel: every clone of the receiver observes the disconnect, which makes
/// the token selectable alongside ordinary channels. A child token carries
/// its ancestors' receivers, so cancelling a parent cancels the whole
/// subtree while cancelling a child leaves the parent untouched.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<Mutex<Option<Sender<Never>>>>,
    rxs: Vec<Receiver<Never>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            rxs: vec![rx],
        }
    }

    /// Derive a token that is cancelled when either itself or any ancestor
    /// is cancelled.
    pub fn child(&self) -> Self {
        let (tx, rx) = bounded(0);
        let mut rxs = self.rxs.clone();
        rxs.push(rx);
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            rxs,
        }
    }

    pub fn cancel(&self) {
        let mut guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        guard.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.rxs
            .iter()
            .any(|rx| matches!(rx.try_recv(), Err(TryRecvError::Disconnected)))
    }

    /// The receivers to register in a `Select` loop; any of them becoming
    /// ready means the token is cancelled.
    pub fn receivers(&self) -> &[Receiver<Never>] {
        &self.rxs
    }

    /// Block until cancelled or until `timeout` elapses. Returns whether the
    /// token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let mut sel = Select::new();
            for rx in &self.rxs {
                sel.recv(rx);
            }
            // Readiness can be spurious; the loop re-checks the flag.
            if sel.ready_timeout(remaining).is_err() {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn fresh_token_is_live() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(!token.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn cancel_is_observed_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn parent_cancels_child_but_not_vice_versa() {
        let parent = CancelToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn wait_timeout_wakes_on_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = thread::spawn(move || {
            let t0 = Instant::now();
            let cancelled = waiter.wait_timeout(Duration::from_secs(5));
            (cancelled, t0.elapsed())
        });

        thread::sleep(Duration::from_millis(30));
        token.cancel();

        let (cancelled, elapsed) = handle.join().unwrap();
        assert!(cancelled);
        assert!(elapsed < Duration::from_secs(5));
    }
}
