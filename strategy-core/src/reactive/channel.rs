use futures::stream;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::reactive::EventStream;

enum PushEvent<T> {
    Item(T),
    Fault(anyhow::Error),
    Complete,
}

/// Producer half of [`push_stream`].
///
/// Cloneable and thread-safe: exchange adapters (or tests) push values from
/// whatever thread delivers them, and the paired [`EventStream`] replays them
/// in order to whoever polls it.
pub struct PushHandle<T> {
    tx: mpsc::UnboundedSender<PushEvent<T>>,
}

impl<T> Clone for PushHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> PushHandle<T> {
    /// Pushes a value. Returns false once the consumer is gone.
    pub fn push(&self, value: T) -> bool {
        self.tx.send(PushEvent::Item(value)).is_ok()
    }

    /// Ends the stream with a terminal fault.
    pub fn error(&self, fault: anyhow::Error) -> bool {
        self.tx.send(PushEvent::Fault(fault)).is_ok()
    }

    /// Ends the stream normally.
    pub fn complete(&self) -> bool {
        self.tx.send(PushEvent::Complete).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Builds a channel-backed source: a [`PushHandle`] for the producer side
/// and an [`EventStream`] for the core.
pub fn push_stream<T: Send + 'static>() -> (PushHandle<T>, EventStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = stream::unfold((rx, false), |(mut rx, terminated)| async move {
        if terminated {
            return None;
        }
        match rx.recv().await {
            Some(PushEvent::Item(value)) => Some((Ok(value), (rx, false))),
            Some(PushEvent::Fault(fault)) => Some((Err(fault), (rx, true))),
            Some(PushEvent::Complete) | None => None,
        }
    })
    .boxed();

    (PushHandle { tx }, stream)
}
