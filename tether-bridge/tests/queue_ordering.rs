//! Ordering and wait bounds of the task queue against a live host thread.

use std::time::{Duration, Instant};

use tether_bridge::{spawn_host_thread, task_queue, WaitOutcome};

/// Host state for these tests: counts the tasks it has run.
#[derive(Default)]
struct Counter {
    ran: u64,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enqueues_run_in_stamp_order() {
    let (queue, runner) = task_queue::<Counter>(16);
    // Hold the host thread so all three tasks are queued before any runs.
    let gate = queue
        .enqueue(|_: &mut Counter| std::thread::sleep(Duration::from_millis(100)))
        .expect("gate");
    let host = spawn_host_thread(runner, || Ok(Counter::default()), Duration::from_millis(1))
        .expect("host thread");

    let submitters: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let pending = queue
                    .enqueue(|c: &mut Counter| {
                        c.ran += 1;
                        c.ran
                    })
                    .expect("enqueue");
                let seq = pending.seq();
                match pending.wait(Duration::from_secs(5)).await {
                    WaitOutcome::Completed(observed) => (seq, observed),
                    other => panic!("task {seq} did not complete: {other:?}"),
                }
            })
        })
        .collect();

    let mut results = Vec::new();
    for submitter in submitters {
        results.push(submitter.await.expect("submitter"));
    }
    assert_eq!(
        gate.wait(Duration::from_secs(5)).await,
        WaitOutcome::Completed(())
    );

    results.sort_by_key(|(seq, _)| *seq);
    let observed: Vec<u64> = results.iter().map(|(_, observed)| *observed).collect();
    assert_eq!(observed, vec![1, 2, 3]);

    queue.close();
    assert_eq!(host.join().expect("join"), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiter_returns_within_the_bound_while_task_keeps_running() {
    let (queue, runner) = task_queue::<Counter>(4);
    let host = spawn_host_thread(runner, || Ok(Counter::default()), Duration::from_millis(1))
        .expect("host thread");

    let slow = queue
        .enqueue(|c: &mut Counter| {
            std::thread::sleep(Duration::from_millis(600));
            c.ran += 1;
            c.ran
        })
        .expect("slow");

    let bound = Duration::from_millis(100);
    let started = Instant::now();
    assert_eq!(slow.wait(bound).await, WaitOutcome::TimedOut);
    assert!(started.elapsed() < bound + Duration::from_millis(150));

    // The abandoned wait did not cancel the task; the next one sees its effect.
    let after = queue
        .enqueue(|c: &mut Counter| c.ran)
        .expect("after")
        .wait(Duration::from_secs(5))
        .await;
    assert_eq!(after, WaitOutcome::Completed(1));

    queue.close();
    assert_eq!(host.join().expect("join"), 2);
}

#[tokio::test]
async fn panicking_task_leaves_host_thread_running() {
    let (queue, runner) = task_queue::<Counter>(4);
    let host = spawn_host_thread(runner, || Ok(Counter::default()), Duration::from_millis(1))
        .expect("host thread");

    let bad = queue
        .enqueue(|_: &mut Counter| -> u64 { panic!("task failure") })
        .expect("bad");
    assert_eq!(bad.wait(Duration::from_secs(5)).await, WaitOutcome::Abandoned);

    let good = queue
        .enqueue(|c: &mut Counter| {
            c.ran += 1;
            c.ran
        })
        .expect("good")
        .wait(Duration::from_secs(5))
        .await;
    assert_eq!(good, WaitOutcome::Completed(1));

    queue.close();
    host.join().expect("join");
}
