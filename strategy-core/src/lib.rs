//! # Strategy Core
//!
//! The concurrency layer for event-driven trading strategies: deterministic,
//! race-free state mutation over multiple concurrent market-data feeds.
//!
//! ## Modules
//! - `sync`: wait/notify and cancellation primitives (`MultiWakeEvent`,
//!   `StopSource`/`StopToken`).
//! - `reactive`: stream plumbing: latest-value pairing (`zip_latest`),
//!   coalescing dispatch (`subscribe_all`/`subscribe_latest`), and the
//!   producer-side bridge (`push_stream`).
//! - `sentinel`: binds a source to a host-confined handler and exposes
//!   predicate-based blocking wait.
//! - `framework`: the execution host, one dedicated worker thread and task
//!   mailbox per strategy instance.
//! - `model`: common data types (`Timestamped`).

pub mod error;
pub mod framework;
pub mod model;
pub mod reactive;
pub mod sentinel;
pub mod sync;

pub use error::CoreError;
pub use framework::{start, with_scheduler, Mailbox, Scheduler, Strategy, StrategyContext, StrategyHandle};
pub use model::Timestamped;
pub use reactive::{
    push_stream, subscribe_all, subscribe_latest, zip_latest, EventStream, PushHandle,
    Subscription, ZipLatest,
};
pub use sentinel::Sentinel;
pub use sync::{MultiWakeEvent, StopSource, StopToken, WaitCanceled};
