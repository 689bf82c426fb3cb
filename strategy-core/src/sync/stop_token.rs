use std::sync::OnceLock;

use tokio::sync::watch;

/// Owning side of a cooperative cancellation signal.
///
/// Every blocking operation in the core accepts a [`StopToken`]; a
/// `StopSource` is what fires it. Built on a watch channel so tokens can be
/// cloned freely and observed from any thread.
#[derive(Debug)]
pub struct StopSource {
    signal: watch::Sender<bool>,
}

/// Observer side of a [`StopSource`].
#[derive(Debug, Clone)]
pub struct StopToken {
    signal: watch::Receiver<bool>,
}

impl StopSource {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self { signal }
    }

    pub fn token(&self) -> StopToken {
        StopToken {
            signal: self.signal.subscribe(),
        }
    }

    /// Fires the signal. Idempotent, and effective even while no token
    /// exists yet.
    pub fn stop(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.signal.borrow()
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    /// A token that never fires, for call sites without caller cancellation.
    pub fn never() -> Self {
        static NEVER: OnceLock<watch::Sender<bool>> = OnceLock::new();
        let signal = NEVER.get_or_init(|| watch::channel(false).0);
        Self {
            signal: signal.subscribe(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once the owning source stops.
    ///
    /// Never resolves if the source is dropped without stopping.
    pub async fn stopped(&self) {
        let mut signal = self.signal.clone();
        if signal.wait_for(|stopped| *stopped).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
