//! One-shot diagnostic logging
//!
//! Probe messages are logged the first time they occur and suppressed after
//! that, so a host that probes repeatedly does not flood its log. The state
//! lives in a value owned by one probe rather than in statics.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Diagnostics {
    logged: HashSet<&'static str>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `log` only the first time `key` is seen.
    pub fn once(&mut self, key: &'static str, log: impl FnOnce()) {
        if self.logged.insert(key) {
            log();
        }
    }

    pub fn has_logged(&self, key: &str) -> bool {
        self.logged.contains(key)
    }

    pub fn reset(&mut self) {
        self.logged.clear();
    }
}
