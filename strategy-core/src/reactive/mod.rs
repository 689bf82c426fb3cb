pub mod channel;
pub mod subscribe;
pub mod zip_latest;

pub use channel::{push_stream, PushHandle};
pub use subscribe::{subscribe_all, subscribe_latest, Subscription};
pub use zip_latest::{zip_latest, ZipLatest};

/// An asynchronous push sequence of typed values.
///
/// The core's view of any market-data source: an `Err` item is a terminal
/// source fault, end-of-stream is terminal completion. Sources are owned and
/// driven by external collaborators; the core only polls.
pub type EventStream<T> = futures::stream::BoxStream<'static, anyhow::Result<T>>;
