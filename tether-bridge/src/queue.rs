//! FIFO marshaling of closures onto the host thread.
//!
//! [`TaskQueue`] is the submitting half: any thread may enqueue a closure and
//! gets a [`PendingTask`] back immediately. [`TaskRunner`] is the draining
//! half, owned by the host thread, which runs at most one task per idle tick.
//! Tasks run in the order their sequence stamps were issued.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot};

use crate::error::BridgeError;

type TaskFn<A> = Box<dyn FnOnce(&mut A) + Send>;

struct Job<A> {
    seq: u64,
    run: TaskFn<A>,
}

/// Build a queue with room for `capacity` tasks that have not started yet.
pub fn task_queue<A>(capacity: usize) -> (TaskQueue<A>, TaskRunner<A>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let closed = Arc::new(AtomicBool::new(false));
    (
        TaskQueue {
            tx,
            next_seq: Arc::new(Mutex::new(1)),
            closed: closed.clone(),
            capacity: capacity.max(1),
        },
        TaskRunner { rx, closed },
    )
}

// ---------------------------------------------------------------------------
// 1. Submitting half
// ---------------------------------------------------------------------------

pub struct TaskQueue<A> {
    tx: mpsc::Sender<Job<A>>,
    next_seq: Arc<Mutex<u64>>,
    closed: Arc<AtomicBool>,
    capacity: usize,
}

impl<A> Clone for TaskQueue<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            next_seq: self.next_seq.clone(),
            closed: self.closed.clone(),
            capacity: self.capacity,
        }
    }
}

impl<A: 'static> TaskQueue<A> {
    /// Append `task` and return without waiting for it to run.
    pub fn enqueue<R, F>(&self, task: F) -> Result<PendingTask<R>, BridgeError>
    where
        F: FnOnce(&mut A) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_closed() {
            return Err(BridgeError::ChannelClosed("task queue"));
        }
        let (done_tx, done_rx) = oneshot::channel();
        let run: TaskFn<A> = Box::new(move |app| {
            let _ = done_tx.send(task(app));
        });

        // Stamp and send under one lock so stamp order is delivery order.
        let mut next = self.next_seq.lock();
        let seq = *next;
        match self.tx.try_send(Job { seq, run }) {
            Ok(()) => {
                *next += 1;
                tracing::debug!(seq, "task enqueued");
                Ok(PendingTask { seq, rx: done_rx })
            }
            Err(TrySendError::Full(_)) => Err(BridgeError::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Closed(_)) => Err(BridgeError::ChannelClosed("task queue")),
        }
    }

    /// Refuse new tasks; the runner reports `Closed` once the backlog drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// 2. Waiting
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub enum WaitOutcome<R> {
    Completed(R),
    /// The bound elapsed first. The task is still queued or running.
    TimedOut,
    /// The task was dropped without answering, e.g. it panicked.
    Abandoned,
}

/// Completion handle for one enqueued task.
pub struct PendingTask<R> {
    seq: u64,
    rx: oneshot::Receiver<R>,
}

impl<R> PendingTask<R> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wait at most `timeout` for the task's result.
    pub async fn wait(self, timeout: Duration) -> WaitOutcome<R> {
        let seq = self.seq;
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(value)) => WaitOutcome::Completed(value),
            Ok(Err(_)) => {
                tracing::warn!(seq, "host task dropped its result");
                WaitOutcome::Abandoned
            }
            Err(_) => {
                tracing::warn!(
                    seq,
                    timeout_ms = timeout.as_millis() as u64,
                    "host task still running; returning without its result"
                );
                WaitOutcome::TimedOut
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Draining half
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    Ran(u64),
    Idle,
    Closed,
}

pub struct TaskRunner<A> {
    rx: mpsc::Receiver<Job<A>>,
    closed: Arc<AtomicBool>,
}

impl<A> TaskRunner<A> {
    /// Run the oldest pending task against `app`, if there is one.
    ///
    /// A panicking task is contained here; its waiter observes
    /// [`WaitOutcome::Abandoned`].
    pub fn on_idle(&mut self, app: &mut A) -> IdleOutcome {
        match self.rx.try_recv() {
            Ok(Job { seq, run }) => {
                match catch_unwind(AssertUnwindSafe(move || run(app))) {
                    Ok(()) => tracing::debug!(seq, "host task finished"),
                    Err(_) => tracing::error!(seq, "host task panicked"),
                }
                IdleOutcome::Ran(seq)
            }
            Err(TryRecvError::Empty) if self.closed.load(Ordering::SeqCst) => IdleOutcome::Closed,
            Err(TryRecvError::Empty) => IdleOutcome::Idle,
            Err(TryRecvError::Disconnected) => IdleOutcome::Closed,
        }
    }

    /// Stop accepting tasks from every queue handle.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_in_stamp_order() {
        let (queue, mut runner) = task_queue::<Vec<u64>>(8);
        let a = queue.enqueue(|log: &mut Vec<u64>| log.push(1)).expect("a");
        let b = queue.enqueue(|log: &mut Vec<u64>| log.push(2)).expect("b");
        assert!(a.seq() < b.seq());

        let mut log = Vec::new();
        assert_eq!(runner.on_idle(&mut log), IdleOutcome::Ran(a.seq()));
        assert_eq!(runner.on_idle(&mut log), IdleOutcome::Ran(b.seq()));
        assert_eq!(runner.on_idle(&mut log), IdleOutcome::Idle);
        assert_eq!(log, vec![1, 2]);
    }

    #[test]
    fn full_queue_is_reported() {
        let (queue, _runner) = task_queue::<()>(1);
        queue.enqueue(|_: &mut ()| ()).expect("first");
        assert!(matches!(
            queue.enqueue(|_: &mut ()| ()),
            Err(BridgeError::QueueFull { capacity: 1 })
        ));
    }

    #[test]
    fn closed_queue_drains_then_reports_closed() {
        let (queue, mut runner) = task_queue::<u32>(4);
        queue.enqueue(|n: &mut u32| *n += 1).expect("enqueue");
        queue.close();
        assert!(matches!(
            queue.enqueue(|n: &mut u32| *n += 1),
            Err(BridgeError::ChannelClosed(_))
        ));

        let mut n = 0;
        assert!(matches!(runner.on_idle(&mut n), IdleOutcome::Ran(_)));
        assert_eq!(runner.on_idle(&mut n), IdleOutcome::Closed);
        assert_eq!(n, 1);
    }

    #[test]
    fn dropped_queue_reports_closed() {
        let (queue, mut runner) = task_queue::<()>(4);
        drop(queue);
        assert_eq!(runner.on_idle(&mut ()), IdleOutcome::Closed);
    }

    #[tokio::test]
    async fn panicking_task_is_abandoned_and_runner_survives() {
        let (queue, mut runner) = task_queue::<u32>(4);
        let bad = queue
            .enqueue(|_: &mut u32| -> u32 { panic!("boom") })
            .expect("bad");
        let good = queue.enqueue(|n: &mut u32| *n + 7).expect("good");

        let mut n = 1;
        runner.on_idle(&mut n);
        runner.on_idle(&mut n);

        assert_eq!(bad.wait(Duration::from_secs(1)).await, WaitOutcome::Abandoned);
        assert_eq!(
            good.wait(Duration::from_secs(1)).await,
            WaitOutcome::Completed(8)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_wait_times_out() {
        let (queue, _runner) = task_queue::<()>(4);
        let pending = queue.enqueue(|_: &mut ()| 1).expect("enqueue");
        assert_eq!(
            pending.wait(Duration::from_millis(200)).await,
            WaitOutcome::TimedOut
        );
    }
}
