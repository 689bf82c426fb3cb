use std::future::Future;
use std::pin::Pin;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::sync::StopToken;

type HostedTask = Pin<Box<dyn Future<Output = ()> + 'static>>;

/// The single-worker FIFO behind an execution host.
///
/// One worker owns the queue and drives every posted task cooperatively on
/// its own thread, so no two tasks posted to the same mailbox ever run in
/// parallel. Tasks need not be `Send`; consequently neither is the
/// [`Scheduler`] handle, which pins all posting to the host thread by
/// construction.
pub struct Mailbox {
    queue: mpsc::UnboundedReceiver<HostedTask>,
}

/// Posting handle for a [`Mailbox`]. Cheap to clone, not `Send`.
#[derive(Clone)]
pub struct Scheduler {
    queue: mpsc::UnboundedSender<HostedTask>,
}

impl Mailbox {
    pub fn new() -> (Scheduler, Mailbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Scheduler { queue: tx }, Mailbox { queue: rx })
    }

    /// Drives posted tasks until `stop` fires, or until every scheduler has
    /// been dropped and the queue has drained.
    pub async fn run(mut self, stop: StopToken) {
        let mut running: FuturesUnordered<HostedTask> = FuturesUnordered::new();
        let mut open = true;

        loop {
            if !open && running.is_empty() {
                break;
            }
            tokio::select! {
                () = stop.stopped() => break,
                posted = self.queue.recv(), if open => match posted {
                    Some(task) => running.push(task),
                    None => open = false,
                },
                _ = running.next(), if !running.is_empty() => {}
            }
        }
    }
}

impl Scheduler {
    /// Posts a task to the host's queue.
    pub fn post<F>(&self, task: F) -> Result<(), CoreError>
    where
        F: Future<Output = ()> + 'static,
    {
        self.queue
            .send(Box::pin(task))
            .map_err(|_| CoreError::HostStopped)
    }
}

/// Runs `scope`'s future with a live mailbox on the current task.
///
/// For callers (mostly tests and tools) that need a host context without
/// spinning up a dedicated strategy thread.
pub async fn with_scheduler<F, Fut>(scope: F) -> Fut::Output
where
    F: FnOnce(Scheduler) -> Fut,
    Fut: Future,
{
    let (scheduler, mailbox) = Mailbox::new();
    // Keep the queue open for the whole scope even if it drops its handle.
    let _keep = scheduler.clone();
    let main = scope(scheduler);
    tokio::pin!(main);

    tokio::select! {
        output = &mut main => output,
        () = mailbox.run(StopToken::never()) => {
            unreachable!("mailbox stopped while the scope was still running")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::sync::StopSource;

    #[tokio::test]
    async fn drains_posted_tasks_then_stops_when_closed() {
        let (scheduler, mailbox) = Mailbox::new();
        let hits = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let hits = hits.clone();
            scheduler
                .post(async move { hits.borrow_mut().push(i) })
                .unwrap();
        }
        drop(scheduler);

        mailbox.run(StopToken::never()).await;
        assert_eq!(*hits.borrow(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn stop_token_ends_the_run_loop() {
        let (scheduler, mailbox) = Mailbox::new();
        let stop = StopSource::new();

        scheduler.post(futures::future::pending()).unwrap();

        let ((), ()) = tokio::join!(mailbox.run(stop.token()), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stop.stop();
        });
    }

    #[tokio::test]
    async fn post_fails_once_the_mailbox_is_gone() {
        let (scheduler, mailbox) = Mailbox::new();
        drop(mailbox);
        let result = scheduler.post(async {});
        assert!(matches!(result, Err(CoreError::HostStopped)));
    }

    #[tokio::test]
    async fn with_scheduler_runs_posted_work() {
        let observed = with_scheduler(|scheduler| async move {
            let flag = Rc::new(RefCell::new(false));
            let seen = flag.clone();
            scheduler.post(async move { *seen.borrow_mut() = true }).unwrap();
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            let observed = *flag.borrow();
            observed
        })
        .await;
        assert!(observed);
    }
}
