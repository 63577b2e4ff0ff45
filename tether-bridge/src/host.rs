//! The dedicated host thread and the application state it owns.

use std::thread::JoinHandle;
use std::time::Duration;

use tether_host::HostDocument;
use tether_sync::{DecisionPrompt, Reconciler};

use crate::error::{io_err, BridgeError};
use crate::queue::{IdleOutcome, TaskRunner};

/// Everything a host-side task may touch. Lives only on the host thread.
pub struct HostApp<D> {
    pub document: D,
    pub prompt: Box<dyn DecisionPrompt>,
    pub reconciler: Reconciler,
}

impl<D: HostDocument> HostApp<D> {
    pub fn new(document: D, prompt: Box<dyn DecisionPrompt>, reconciler: Reconciler) -> Self {
        Self {
            document,
            prompt,
            reconciler,
        }
    }
}

/// Handle to a running host thread.
pub struct HostThread {
    handle: JoinHandle<u64>,
}

impl HostThread {
    /// Block until the thread exits; returns how many tasks it ran.
    pub fn join(self) -> Result<u64, BridgeError> {
        self.handle
            .join()
            .map_err(|_| BridgeError::Protocol("host thread panicked".to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Start the host thread and wait until `init` has built its state there.
///
/// The thread then drives `runner` on an `idle_interval` heartbeat and exits
/// once the queue is closed and drained.
pub fn spawn_host_thread<A, F>(
    mut runner: TaskRunner<A>,
    init: F,
    idle_interval: Duration,
) -> Result<HostThread, BridgeError>
where
    A: 'static,
    F: FnOnce() -> Result<A, BridgeError> + Send + 'static,
{
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), BridgeError>>();
    let handle = std::thread::Builder::new()
        .name("tether-host".to_string())
        .spawn(move || {
            let mut app = match init() {
                Ok(app) => app,
                Err(err) => {
                    runner.close();
                    let _ = ready_tx.send(Err(err));
                    return 0;
                }
            };
            let _ = ready_tx.send(Ok(()));
            tracing::info!("host thread ready");

            let mut ran = 0u64;
            loop {
                match runner.on_idle(&mut app) {
                    IdleOutcome::Ran(_) => ran += 1,
                    IdleOutcome::Idle => std::thread::sleep(idle_interval),
                    IdleOutcome::Closed => break,
                }
            }
            tracing::info!(tasks = ran, "host thread exiting");
            ran
        })
        .map_err(|e| io_err("tether-host thread", e))?;

    ready_rx
        .recv()
        .map_err(|_| BridgeError::ChannelClosed("host thread startup"))??;
    Ok(HostThread { handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{task_queue, WaitOutcome};

    #[tokio::test]
    async fn tasks_run_on_the_host_thread() {
        let (queue, runner) = task_queue::<()>(8);
        let host = spawn_host_thread(runner, || Ok(()), Duration::from_millis(1)).expect("spawn");

        let name = queue
            .enqueue(|_: &mut ()| std::thread::current().name().map(str::to_string))
            .expect("enqueue")
            .wait(Duration::from_secs(5))
            .await;
        assert_eq!(name, WaitOutcome::Completed(Some("tether-host".to_string())));

        queue.close();
        assert_eq!(host.join().expect("join"), 1);
    }

    #[test]
    fn failed_init_is_returned_and_closes_queue() {
        let (queue, runner) = task_queue::<()>(8);
        let result = spawn_host_thread(
            runner,
            || Err(BridgeError::Protocol("no model".into())),
            Duration::from_millis(1),
        );
        assert!(matches!(result, Err(BridgeError::Protocol(msg)) if msg == "no model"));
        assert!(queue.is_closed());
    }
}
