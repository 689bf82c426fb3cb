use std::future::Future;
use std::thread;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::framework::mailbox::{Mailbox, Scheduler};
use crate::model::Timestamped;
use crate::reactive::{subscribe_all, subscribe_latest, EventStream, Subscription};
use crate::sentinel::Sentinel;
use crate::sync::{StopSource, StopToken};

/// A trading strategy body.
///
/// [`start`] gives each instance its own dedicated host thread; everything the
/// body touches through its [`StrategyContext`] stays on that thread, so the
/// body can hold plain mutable state across awaits. `run` consumes the
/// instance, which is what makes a second run unrepresentable.
#[async_trait(?Send)]
pub trait Strategy: Send + Sized + 'static {
    async fn run(self, ctx: StrategyContext, stop: StopToken) -> Result<()>;
}

/// Capabilities handed to a running strategy body.
///
/// Clones are cheap and stay bound to the same host.
#[derive(Clone)]
pub struct StrategyContext {
    scheduler: Scheduler,
    stop: StopToken,
}

impl StrategyContext {
    fn new(scheduler: Scheduler, stop: StopToken) -> Self {
        Self { scheduler, stop }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Binds a source to a handler on this host, without starting it.
    pub fn bind<T, H>(&self, stream: EventStream<T>, handler: H) -> Sentinel<T>
    where
        T: Send + 'static,
        H: FnMut(Timestamped<T>) -> anyhow::Result<()> + 'static,
    {
        Sentinel::create(&self.scheduler, stream, handler)
    }

    /// Binds and immediately starts a sentinel.
    pub fn subscribe<T, H>(&self, stream: EventStream<T>, handler: H) -> Result<Sentinel<T>, CoreError>
    where
        T: Send + 'static,
        H: FnMut(Timestamped<T>) -> anyhow::Result<()> + 'static,
    {
        let mut sentinel = self.bind(stream, handler);
        sentinel.start()?;
        Ok(sentinel)
    }

    /// Starts a deliver-all dispatch loop tied to this strategy's stop token.
    pub fn subscribe_all<T, H, Fut>(
        &self,
        stream: EventStream<T>,
        handler: H,
    ) -> Result<Subscription, CoreError>
    where
        T: Send + 'static,
        H: FnMut(T) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        subscribe_all(&self.scheduler, stream, handler, self.stop.clone())
    }

    /// Starts a deliver-latest dispatch loop tied to this strategy's stop
    /// token.
    pub fn subscribe_latest<T, H, Fut>(
        &self,
        stream: EventStream<T>,
        handler: H,
    ) -> Result<Subscription, CoreError>
    where
        T: Send + 'static,
        H: FnMut(T) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        subscribe_latest(&self.scheduler, stream, handler, self.stop.clone())
    }
}

/// Completion handle for a launched strategy.
pub struct StrategyHandle {
    done: oneshot::Receiver<Result<()>>,
}

impl StrategyHandle {
    /// Waits for the strategy body to settle and returns its outcome.
    pub async fn join(self) -> Result<()> {
        self.done
            .await
            .unwrap_or_else(|_| Err(anyhow!("strategy host stopped before the body completed")))
    }
}

/// Launches `strategy` on its own dedicated host thread.
///
/// Resolves once the body has been accepted by the host's mailbox, i.e. once
/// the strategy is guaranteed to run; the returned handle observes the body's
/// completion. The host thread winds down as soon as the body settles,
/// dropping any dispatch loops still running on it.
pub async fn start<S: Strategy>(strategy: S, stop: StopToken) -> Result<StrategyHandle> {
    let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
    let (done_tx, done_rx) = oneshot::channel::<Result<()>>();

    thread::Builder::new()
        .name("strategy-host".into())
        .spawn(move || host_main(strategy, stop, ready_tx, done_tx))
        .context("failed to spawn the strategy host thread")?;

    ready_rx
        .await
        .map_err(|_| anyhow!("strategy host exited before signalling readiness"))??;
    Ok(StrategyHandle { done: done_rx })
}

fn host_main<S: Strategy>(
    strategy: S,
    stop: StopToken,
    ready_tx: oneshot::Sender<Result<()>>,
    done_tx: oneshot::Sender<Result<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready_tx.send(Err(err).context("failed to build the host runtime"));
            return;
        }
    };

    runtime.block_on(async move {
        let (scheduler, mailbox) = Mailbox::new();
        // Winds the mailbox down once the body settles, so the host thread
        // does not outlive the strategy.
        let winddown = StopSource::new();
        let winddown_token = winddown.token();
        let ctx = StrategyContext::new(scheduler.clone(), stop.clone());

        let posted = scheduler.post(async move {
            debug!("strategy body launched");
            let result = strategy.run(ctx, stop).await;
            if let Err(err) = &result {
                warn!("strategy body failed: {err:#}");
            }
            let _ = done_tx.send(result);
            winddown.stop();
        });
        if let Err(err) = posted {
            let _ = ready_tx.send(Err(err.into()));
            return;
        }
        let _ = ready_tx.send(Ok(()));

        drop(scheduler);
        mailbox.run(winddown_token).await;
        debug!("strategy host drained");
    });
}
