//! RAII release of engine handles

use super::InferenceEngine;
use std::ops::{Deref, DerefMut};

/// Owns an engine handle and releases it exactly once
///
/// Release happens either explicitly through [`RuntimeGuard::finish`] or on
/// drop, so early returns from load/init/invoke failures cannot leak the
/// device context.
pub struct RuntimeGuard {
    engine: Box<dyn InferenceEngine>,
    released: bool,
}

impl RuntimeGuard {
    /// Take ownership of a freshly created engine
    #[must_use]
    pub fn new(engine: Box<dyn InferenceEngine>) -> Self {
        Self {
            engine,
            released: false,
        }
    }

    /// Release the handle now
    pub fn finish(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if !self.released {
            self.released = true;
            tracing::debug!(backend = %self.engine.backend(), "releasing engine handle");
            self.engine.release();
        }
    }
}

impl Deref for RuntimeGuard {
    type Target = dyn InferenceEngine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

impl DerefMut for RuntimeGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine.as_mut()
    }
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for RuntimeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeGuard")
            .field("backend", &self.engine.backend())
            .field("released", &self.released)
            .finish()
    }
}
