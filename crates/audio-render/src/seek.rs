//! Pending seek bookkeeping.
//!
//! The control thread records a request with [`SeekRequest::request`]; the render callback
//! picks it up with [`consume_pending`] before it touches any further pre-seek data.

use crate::cursor::BufferCursor;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeekRequest {
    pending: bool,
    target_us: i64,
}

impl SeekRequest {
    pub fn request(&mut self, target_us: i64) {
        self.pending = true;
        self.target_us = target_us;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn target_if_pending(&self) -> Option<i64> {
        self.pending.then_some(self.target_us)
    }

    /// Clear the request and return its target.
    pub fn take(&mut self) -> Option<i64> {
        let target = self.target_if_pending();
        self.pending = false;
        target
    }

    pub fn clear(&mut self) {
        self.pending = false;
    }
}

/// If a seek is pending, drop every buffered byte from before it and return the target the
/// next read must ask for.
pub fn consume_pending(request: &mut SeekRequest, cursor: &mut BufferCursor) -> Option<i64> {
    let target = request.take()?;
    cursor.discard_all();
    tracing::debug!(target_us = target, "seek observed by render callback");
    Some(target)
}
