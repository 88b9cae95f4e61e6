use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Last-fired timestamps per pattern
///
/// Owned by the engine; written only after a pattern wins a trade.
#[derive(Debug, Default)]
pub struct CooldownState {
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while `pattern` is inside its window at `now`
    ///
    /// A timestamp earlier than the recorded fire counts as cooling.
    pub fn is_cooling(&self, pattern: &str, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_fired.lock().get(pattern) {
            Some(&fired) => now < fired || now - fired < window,
            None => false,
        }
    }

    pub fn record(&self, pattern: &str, at: DateTime<Utc>) {
        self.last_fired.lock().insert(pattern.to_string(), at);
    }

    pub fn last_fired(&self, pattern: &str) -> Option<DateTime<Utc>> {
        self.last_fired.lock().get(pattern).copied()
    }
}
