//! Administrative kill switch for acceleration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-scoped override that refuses acceleration unconditionally.
///
/// Clones share the same flag. Nothing is persisted: a new process always
/// starts with the switch off.
#[derive(Debug, Clone, Default)]
pub struct ForceDisable(Arc<AtomicBool>);

impl ForceDisable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, disabled: bool) {
        self.0.store(disabled, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
