//! Crash guard
//!
//! Brackets a step that may take the whole process down. The bracket is a
//! durable marker: written before the step, removed after it. If the process
//! dies in between, the marker outlives it and the next run sees it.
//!
//! Storage failures never block detection. A marker that cannot be written
//! simply means a crash will go unremembered.

use accel_store::DurableMarker;

/// Byte written into the sentinel. Only its existence matters.
const SENTINEL: &[u8] = b"1";

#[derive(Debug)]
pub struct CrashGuard<M> {
    marker: M,
}

impl<M: DurableMarker> CrashGuard<M> {
    pub fn new(marker: M) -> Self {
        Self { marker }
    }

    /// Opens the bracket. Overwrites a sentinel left by an earlier run.
    pub fn begin(&self) {
        if let Err(err) = self.marker.write(SENTINEL) {
            tracing::debug!("Crash guard: could not open bracket: {err}");
        }
    }

    /// Closes the bracket. Closing twice is harmless.
    pub fn end(&self) {
        if let Err(err) = self.marker.remove() {
            tracing::debug!("Crash guard: could not close bracket: {err}");
        }
    }

    /// Whether an earlier bracket was never closed.
    ///
    /// Only meaningful before this run calls [`begin`](Self::begin).
    pub fn previous_run_crashed(&self) -> bool {
        self.marker.exists()
    }

    /// Opens the bracket and closes it when the returned scope is dropped,
    /// including on early return and unwinding.
    pub fn bracket(&self) -> CrashBracket<'_, M> {
        self.begin();
        CrashBracket { guard: self }
    }

    pub fn marker(&self) -> &M {
        &self.marker
    }
}

/// Open crash bracket; closes on drop.
#[must_use = "the bracket closes as soon as it is dropped"]
#[derive(Debug)]
pub struct CrashBracket<'a, M: DurableMarker> {
    guard: &'a CrashGuard<M>,
}

impl<M: DurableMarker> Drop for CrashBracket<'_, M> {
    fn drop(&mut self) {
        self.guard.end();
    }
}
