pub mod multi_event;
pub mod stop_token;

pub use multi_event::{MultiWakeEvent, WaitCanceled};
pub use stop_token::{StopSource, StopToken};
