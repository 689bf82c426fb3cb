//! Binds a market-data source to a host-confined handler and lets strategy
//! logic block until the handled state satisfies a predicate.

use std::cell::RefCell;
use std::rc::Rc;

use futures::{FutureExt, StreamExt};
use log::{debug, warn};

use crate::error::CoreError;
use crate::framework::Scheduler;
use crate::model::Timestamped;
use crate::reactive::{zip_latest, EventStream};
use crate::sync::{MultiWakeEvent, StopSource, StopToken};

type SentinelHandler<T> = Box<dyn FnMut(Timestamped<T>) -> anyhow::Result<()> + 'static>;

#[derive(Default)]
struct WatchState {
    fault: Option<CoreError>,
    fault_seen: bool,
    completed: bool,
    canceled: bool,
}

#[derive(Default)]
struct Shared {
    batch_event: MultiWakeEvent,
    state: RefCell<WatchState>,
}

impl Shared {
    /// Records a fault for delivery to exactly one watcher. Only the first
    /// fault of a sentinel's lifetime is kept.
    fn capture_fault(&self, fault: CoreError) {
        let mut state = self.state.borrow_mut();
        if !state.fault_seen {
            state.fault_seen = true;
            state.fault = Some(fault);
        }
    }
}

/// A source bound to a handler, with predicate-based blocking wait.
///
/// The handler runs on the owning host's thread, one batch at a time, so it
/// may mutate strategy state without any locking. [`watch`](Sentinel::watch)
/// blocks until that state satisfies a caller predicate, re-evaluating after
/// every handled batch.
///
/// A sentinel is inert until [`start`](Sentinel::start); before that it can
/// be merged with another via [`combine`](Sentinel::combine).
pub struct Sentinel<T> {
    stream: Option<EventStream<T>>,
    handler: Option<SentinelHandler<T>>,
    scheduler: Scheduler,
    shared: Rc<Shared>,
    lifecycle: StopSource,
}

impl<T> Sentinel<T>
where
    T: Send + 'static,
{
    /// Binds `stream` to `handler` on the given host, without starting it.
    pub fn create<H>(scheduler: &Scheduler, stream: EventStream<T>, handler: H) -> Self
    where
        H: FnMut(Timestamped<T>) -> anyhow::Result<()> + 'static,
    {
        Self {
            stream: Some(stream),
            handler: Some(Box::new(handler)),
            scheduler: scheduler.clone(),
            shared: Rc::new(Shared::default()),
            lifecycle: StopSource::new(),
        }
    }

    /// Merges two unstarted sentinels into one over latest-value pairs.
    ///
    /// Each pair is split back into its sides and handed to the two bound
    /// handlers, this sentinel's first, both under one capture time. Watching
    /// the combined sentinel therefore observes both sides' state moving
    /// together. Fails with [`CoreError::AlreadyStarted`] if either input has
    /// already started.
    pub fn combine<U>(mut self, mut other: Sentinel<U>) -> Result<Sentinel<(T, U)>, CoreError>
    where
        U: Send + 'static,
    {
        let (Some(left_stream), Some(mut left_handler)) =
            (self.stream.take(), self.handler.take())
        else {
            return Err(CoreError::AlreadyStarted);
        };
        let (Some(right_stream), Some(mut right_handler)) =
            (other.stream.take(), other.handler.take())
        else {
            return Err(CoreError::AlreadyStarted);
        };

        let paired = zip_latest(left_stream, right_stream);
        let handler = move |pair: Timestamped<(T, U)>| -> anyhow::Result<()> {
            let timestamp = pair.timestamp;
            let (left, right) = pair.value;
            left_handler(Timestamped::new(timestamp, left))?;
            right_handler(Timestamped::new(timestamp, right))
        };
        Ok(Sentinel::create(&self.scheduler, paired, handler))
    }

    /// Posts the drain loop to the host. A sentinel starts at most once.
    pub fn start(&mut self) -> Result<(), CoreError> {
        let (Some(stream), Some(handler)) = (self.stream.take(), self.handler.take()) else {
            return Err(CoreError::AlreadyStarted);
        };
        debug!("starting sentinel drain loop");
        self.scheduler
            .post(drain_loop(stream, handler, self.shared.clone(), self.lifecycle.token()))
    }

    /// Blocks until `predicate` holds over the handler-maintained state.
    ///
    /// Returns `Ok(true)` when the predicate holds (checked immediately, then
    /// after every handled batch), `Ok(false)` if the source ends without it
    /// ever holding, and `Err` on cancellation or on the sentinel's first
    /// recorded fault. A given fault is surfaced to exactly one watcher;
    /// later watch calls behave as if the source simply completed.
    pub async fn watch<P>(&self, mut predicate: P, stop: &StopToken) -> Result<bool, CoreError>
    where
        P: FnMut() -> bool,
    {
        let disposed = self.lifecycle.token();
        loop {
            {
                let mut state = self.shared.state.borrow_mut();
                if let Some(fault) = state.fault.take() {
                    return Err(fault);
                }
                if state.canceled {
                    return Err(CoreError::Canceled);
                }
            }
            if predicate() {
                return Ok(true);
            }
            if self.shared.state.borrow().completed {
                return Ok(false);
            }
            tokio::select! {
                waited = self.shared.batch_event.wait(stop) => waited?,
                () = disposed.stopped() => return Err(CoreError::Canceled),
            }
        }
    }

    /// Stops the drain loop and wakes every pending watcher with
    /// cancellation. Idempotent; also runs on drop.
    pub fn dispose(&self) {
        if self.lifecycle.is_stopped() {
            return;
        }
        debug!("disposing sentinel");
        self.shared.state.borrow_mut().canceled = true;
        self.lifecycle.stop();
    }
}

impl<T> Drop for Sentinel<T> {
    fn drop(&mut self) {
        if !self.lifecycle.is_stopped() {
            self.shared.state.borrow_mut().canceled = true;
        }
        self.lifecycle.stop();
    }
}

/// Drains the source in batches on the host thread.
///
/// Each pass handles everything the source has ready and fires one batch
/// notification, so watchers re-evaluate once per batch rather than once per
/// value. Handler faults are recorded and do not stop the drain; a source
/// fault or completion ends it.
async fn drain_loop<T>(
    mut stream: EventStream<T>,
    mut handler: SentinelHandler<T>,
    shared: Rc<Shared>,
    stop: StopToken,
) where
    T: Send + 'static,
{
    loop {
        let mut item = tokio::select! {
            () = stop.stopped() => return,
            item = stream.next() => item,
        };
        let mut terminal = false;

        loop {
            match item {
                Some(Ok(value)) => {
                    if let Err(fault) = handler(Timestamped::now(value)) {
                        warn!("sentinel handler failed: {fault:#}");
                        shared.capture_fault(CoreError::Handler(fault));
                    }
                }
                Some(Err(fault)) => {
                    warn!("sentinel source failed: {fault:#}");
                    shared.capture_fault(CoreError::Source(fault));
                    shared.state.borrow_mut().completed = true;
                    terminal = true;
                }
                None => {
                    debug!("sentinel source completed");
                    shared.state.borrow_mut().completed = true;
                    terminal = true;
                }
            }
            if terminal {
                break;
            }
            match stream.next().now_or_never() {
                Some(more) => item = more,
                None => break,
            }
        }

        shared.batch_event.notify();
        if terminal {
            return;
        }
    }
}
