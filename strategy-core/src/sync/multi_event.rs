use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::sync::StopToken;

/// Error returned when a wait is abandoned because its stop token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait canceled")]
pub struct WaitCanceled;

impl From<WaitCanceled> for CoreError {
    fn from(_: WaitCanceled) -> Self {
        CoreError::Canceled
    }
}

/// An async auto-reset event that releases every registered waiter on a
/// single [`notify`](MultiWakeEvent::notify).
///
/// An ordinary auto-reset event releases one waiter per signal, which loses
/// wake-ups when several independent tasks all want to observe the next
/// event. This one swaps out the whole waiter list instead: every waiter
/// registered strictly before a `notify` is released by that `notify`, and
/// no waiter is released twice. When nobody is waiting, a `notify` parks a
/// single sticky grant that the next `wait` consumes immediately.
#[derive(Debug, Default)]
pub struct MultiWakeEvent {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    waiters: Vec<oneshot::Sender<()>>,
    signalled: bool,
}

impl MultiWakeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases every currently-registered waiter, or parks a single sticky
    /// grant when there are none.
    pub fn notify(&self) {
        let released = {
            let mut inner = self.locked();
            if inner.waiters.is_empty() {
                inner.signalled = true;
                Vec::new()
            } else {
                std::mem::take(&mut inner.waiters)
            }
        };

        // Release outside the lock so waking does not serialize with (or
        // block behind) concurrent registrations.
        for waiter in released {
            let _ = waiter.send(());
        }
    }

    /// Waits for the next [`notify`](Self::notify).
    ///
    /// Consumes the sticky grant and returns immediately if one is parked.
    /// Cancellation removes this caller from the waiter set without dropping
    /// a release meant for other waiters.
    pub async fn wait(&self, stop: &StopToken) -> Result<(), WaitCanceled> {
        if stop.is_stopped() {
            return Err(WaitCanceled);
        }

        let release = {
            let mut inner = self.locked();
            if inner.signalled {
                inner.signalled = false;
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            rx
        };

        let result = tokio::select! {
            released = release => released.map_err(|_| WaitCanceled),
            () = stop.stopped() => Err(WaitCanceled),
        };

        if result.is_err() {
            // Our receiver is gone; sweep the dead registration.
            self.locked().waiters.retain(|waiter| !waiter.is_closed());
        }

        result
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sync::StopSource;

    #[tokio::test]
    async fn notify_with_no_waiters_grants_the_next_wait() {
        let event = MultiWakeEvent::new();
        event.notify();
        event.wait(&StopToken::never()).await.unwrap();
    }

    #[tokio::test]
    async fn sticky_grant_is_single_shot() {
        let event = MultiWakeEvent::new();
        event.notify();
        event.notify();
        event.wait(&StopToken::never()).await.unwrap();

        // The grant was consumed; a second wait must block.
        let blocked =
            tokio::time::timeout(Duration::from_millis(20), event.wait(&StopToken::never())).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn notify_releases_every_registered_waiter() {
        let event = MultiWakeEvent::new();
        let never = StopToken::never();

        let (first, second, third, ()) = tokio::join!(
            event.wait(&never),
            event.wait(&never),
            event.wait(&never),
            async {
                // All three waits register on the first poll of join!.
                tokio::task::yield_now().await;
                event.notify();
            }
        );

        first.unwrap();
        second.unwrap();
        third.unwrap();
    }

    #[tokio::test]
    async fn event_resets_after_releasing_waiters() {
        let event = MultiWakeEvent::new();
        let never = StopToken::never();

        let (released, ()) = tokio::join!(event.wait(&never), async {
            tokio::task::yield_now().await;
            event.notify();
        });
        released.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), event.wait(&never)).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn canceled_wait_resolves_with_fault() {
        let event = MultiWakeEvent::new();
        let source = StopSource::new();
        let token = source.token();

        let (canceled, ()) = tokio::join!(event.wait(&token), async {
            tokio::task::yield_now().await;
            source.stop();
        });
        assert_eq!(canceled, Err(WaitCanceled));
    }

    #[tokio::test]
    async fn cancellation_does_not_steal_a_release() {
        let event = MultiWakeEvent::new();
        let source = StopSource::new();
        let token = source.token();

        // Register a waiter, cancel it, then notify with nobody waiting: the
        // sticky grant must still be available to the next wait.
        let (canceled, ()) = tokio::join!(event.wait(&token), async {
            tokio::task::yield_now().await;
            source.stop();
        });
        assert_eq!(canceled, Err(WaitCanceled));

        event.notify();
        event.wait(&StopToken::never()).await.unwrap();
    }

    #[tokio::test]
    async fn wait_with_prestopped_token_fails_fast() {
        let event = MultiWakeEvent::new();
        let source = StopSource::new();
        source.stop();
        assert_eq!(event.wait(&source.token()).await, Err(WaitCanceled));
    }
}
