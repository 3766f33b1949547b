//! Progress reporting
//!
//! Chunked operations report through a [`Progress`] sink. The sink is a
//! passive observer: it cannot stop or alter the operation.

/// Observer for long-running transfers
pub trait Progress {
    /// Called once before the first chunk
    fn start(&mut self, total_bytes: u64);

    /// Called after each completed chunk
    fn update(&mut self, delta_bytes: u64);

    /// Called once after the last chunk succeeded
    fn stop(&mut self);
}

/// A no-op progress reporter
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&mut self, _total_bytes: u64) {}
    fn update(&mut self, _delta_bytes: u64) {}
    fn stop(&mut self) {}
}

impl<P: Progress + ?Sized> Progress for &mut P {
    fn start(&mut self, total_bytes: u64) {
        (**self).start(total_bytes)
    }

    fn update(&mut self, delta_bytes: u64) {
        (**self).update(delta_bytes)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}
