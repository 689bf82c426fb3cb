use std::future::Future;

use futures::StreamExt;
use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::framework::Scheduler;
use crate::reactive::EventStream;
use crate::sync::{StopSource, StopToken};

/// Handle for a dispatch loop hosted on a [`Scheduler`].
pub struct Subscription {
    lifecycle: StopSource,
    completion: oneshot::Receiver<Result<(), CoreError>>,
}

impl Subscription {
    /// Asks the dispatch loop to wind down. Idempotent.
    pub fn stop(&self) {
        self.lifecycle.stop();
    }

    /// Waits for the loop to settle and returns its outcome.
    ///
    /// `Ok(())` when the source completed, [`CoreError::Canceled`] when the
    /// loop was stopped, [`CoreError::Handler`] or [`CoreError::Source`] on
    /// the first fault.
    pub async fn join(self) -> Result<(), CoreError> {
        self.completion.await.unwrap_or(Err(CoreError::HostStopped))
    }
}

fn subscribe_with<F, Fut>(scheduler: &Scheduler, run: F) -> Result<Subscription, CoreError>
where
    F: FnOnce(StopToken) -> Fut,
    Fut: Future<Output = Result<(), CoreError>> + 'static,
{
    let lifecycle = StopSource::new();
    let (tx, rx) = oneshot::channel();
    let body = run(lifecycle.token());
    scheduler.post(async move {
        let _ = tx.send(body.await);
    })?;
    Ok(Subscription {
        lifecycle,
        completion: rx,
    })
}

/// Dispatches every value of `stream` to `handler`, strictly one at a time.
///
/// The next value is not read from the source until the previous handler
/// invocation has settled, so no value is ever skipped and no two invocations
/// overlap. The loop ends on source completion, on the first handler or
/// source fault, or when `stop` (or [`Subscription::stop`]) fires.
pub fn subscribe_all<T, H, Fut>(
    scheduler: &Scheduler,
    stream: EventStream<T>,
    handler: H,
    stop: StopToken,
) -> Result<Subscription, CoreError>
where
    T: Send + 'static,
    H: FnMut(T) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    subscribe_with(scheduler, move |lifecycle| {
        run_all(stream, handler, stop, lifecycle)
    })
}

async fn run_all<T, H, Fut>(
    mut stream: EventStream<T>,
    mut handler: H,
    stop: StopToken,
    lifecycle: StopToken,
) -> Result<(), CoreError>
where
    H: FnMut(T) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    loop {
        let next = tokio::select! {
            () = stop.stopped() => return Err(CoreError::Canceled),
            () = lifecycle.stopped() => return Err(CoreError::Canceled),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(value)) => handler(value).await.map_err(CoreError::Handler)?,
            Some(Err(fault)) => return Err(CoreError::Source(fault)),
            None => return Ok(()),
        }
    }
}

/// Dispatches `stream` to `handler`, coalescing values that arrive while a
/// previous invocation is still running.
///
/// At most one value waits as next-to-run; a newer arrival replaces it
/// unobserved. Every invocation still runs to settlement before the next one
/// starts. A burst of n values during a slow invocation therefore costs one
/// follow-up invocation, with the burst's last value.
pub fn subscribe_latest<T, H, Fut>(
    scheduler: &Scheduler,
    stream: EventStream<T>,
    handler: H,
    stop: StopToken,
) -> Result<Subscription, CoreError>
where
    T: Send + 'static,
    H: FnMut(T) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    subscribe_with(scheduler, move |lifecycle| {
        run_latest(stream, handler, stop, lifecycle)
    })
}

async fn run_latest<T, H, Fut>(
    mut stream: EventStream<T>,
    mut handler: H,
    stop: StopToken,
    lifecycle: StopToken,
) -> Result<(), CoreError>
where
    H: FnMut(T) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    // The single next-to-run slot, plus the source's terminal outcome once
    // seen. The terminal is held back until the slot has been dispatched.
    let mut next_up: Option<T> = None;
    let mut terminal: Option<Result<(), CoreError>> = None;

    loop {
        if next_up.is_none() {
            if let Some(outcome) = terminal.take() {
                return outcome;
            }
            let next = tokio::select! {
                () = stop.stopped() => return Err(CoreError::Canceled),
                () = lifecycle.stopped() => return Err(CoreError::Canceled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(value)) => next_up = Some(value),
                Some(Err(fault)) => return Err(CoreError::Source(fault)),
                None => return Ok(()),
            }
        }

        while let Some(value) = next_up.take() {
            let invocation = handler(value);
            tokio::pin!(invocation);
            loop {
                tokio::select! {
                    outcome = &mut invocation => {
                        outcome.map_err(CoreError::Handler)?;
                        break;
                    }
                    next = stream.next(), if terminal.is_none() => match next {
                        // Supersedes whatever was queued before it.
                        Some(Ok(value)) => next_up = Some(value),
                        Some(Err(fault)) => {
                            terminal = Some(Err(CoreError::Source(fault)));
                        }
                        None => terminal = Some(Ok(())),
                    },
                    () = stop.stopped(), if terminal.is_none() => {
                        terminal = Some(Err(CoreError::Canceled));
                        next_up = None;
                    }
                    () = lifecycle.stopped(), if terminal.is_none() => {
                        terminal = Some(Err(CoreError::Canceled));
                        next_up = None;
                    }
                }
            }
        }
    }
}
