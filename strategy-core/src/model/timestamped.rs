use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A value paired with its UTC capture time.
///
/// Produced when a raw source value is admitted into the core, i.e. when the
/// owning host's thread dequeues it for handling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timestamped<T> {
    pub timestamp: DateTime<Utc>,
    pub value: T,
}

impl<T> Timestamped<T> {
    pub fn new(timestamp: DateTime<Utc>, value: T) -> Self {
        Self { timestamp, value }
    }

    /// Stamps `value` with the current UTC time.
    pub fn now(value: T) -> Self {
        Self::new(Utc::now(), value)
    }

    /// Maps the value while keeping the capture time.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Timestamped<U> {
        Timestamped::new(self.timestamp, f(self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_the_capture_time() {
        let stamped = Timestamped::now(21);
        let mapped = stamped.map(|v| v * 2);
        assert_eq!(mapped.timestamp, stamped.timestamp);
        assert_eq!(mapped.value, 42);
    }
}
