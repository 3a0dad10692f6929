//! Single-flight lazy load

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;

/// Guards a cache that is filled from the store on first use.
///
/// The fast path is one atomic load. During the cold start every caller
/// queues on the in-flight mutex, so exactly one of them runs the loader
/// and the rest observe its result. A failed load leaves the gate closed
/// and the next caller retries.
#[derive(Debug, Default)]
pub struct LoadGate {
    loaded: AtomicBool,
    inflight: Mutex<()>,
}

impl LoadGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Run `load` once, unless it already succeeded
    pub fn ensure(&self, load: impl FnOnce() -> Result<()>) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        let _inflight = self.inflight.lock();
        if self.is_loaded() {
            return Ok(());
        }

        load()?;
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    /// Force the next `ensure` to reload
    pub fn invalidate(&self) {
        let _inflight = self.inflight.lock();
        self.loaded.store(false, Ordering::Release);
    }
}
