pub mod mailbox;
pub mod strategy;

pub use mailbox::{with_scheduler, Mailbox, Scheduler};
pub use strategy::{start, Strategy, StrategyContext, StrategyHandle};
