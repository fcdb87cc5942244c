//! Upstream source contract and the teardown handshake around it.
//!
//! The player owns its source through a [`SourceSlot`]. The render thread clones a strong
//! handle for the duration of each blocking read, so `reset` has to wait until every such
//! handle is gone before the source can be considered torn down.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::error::RenderResult;
use crate::format::MediaFormat;

const TEARDOWN_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Per-read options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Reposition to this media time before producing the next buffer.
    pub seek_to_us: Option<i64>,
}

impl ReadOptions {
    pub fn seek_to(target_us: i64) -> Self {
        Self {
            seek_to_us: Some(target_us),
        }
    }
}

/// A chunk of source output with a consumable byte range.
///
/// Dropping the buffer hands it back to the source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaBuffer {
    data: Vec<u8>,
    offset: usize,
    length: usize,
    time_us: Option<i64>,
}

impl MediaBuffer {
    /// Buffer covering all of `data`, stamped with the media time of its first frame.
    pub fn new(data: Vec<u8>, time_us: i64) -> Self {
        let length = data.len();
        Self {
            data,
            offset: 0,
            length,
            time_us: Some(time_us),
        }
    }

    /// Zero-length buffer without a timestamp.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn time_us(&self) -> Option<i64> {
        self.time_us
    }

    pub fn range_offset(&self) -> usize {
        self.offset
    }

    pub fn range_length(&self) -> usize {
        self.length
    }

    /// Narrow the consumable range. Panics if the range falls outside the data.
    pub fn set_range(&mut self, offset: usize, length: usize) {
        assert!(
            offset + length <= self.data.len(),
            "buffer range {offset}+{length} exceeds {} bytes",
            self.data.len()
        );
        self.offset = offset;
        self.length = length;
    }

    /// Bytes in the current range.
    pub fn data(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.length]
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Pull-based producer of audio buffers.
///
/// `read` may block. It returns [`RenderError::FormatChanged`](crate::RenderError::FormatChanged)
/// when the caller should re-read [`format`](Self::format), and a terminal error (usually
/// [`RenderError::EndOfStream`](crate::RenderError::EndOfStream)) once nothing more can be
/// produced.
pub trait MediaSource: Send + Sync {
    fn start(&self) -> RenderResult<()>;
    fn stop(&self) -> RenderResult<()>;
    fn format(&self) -> MediaFormat;
    fn read(&self, options: &ReadOptions) -> RenderResult<MediaBuffer>;
}

#[derive(Default)]
struct TeardownLatch {
    released: Mutex<bool>,
    signal: Condvar,
}

impl TeardownLatch {
    fn mark_released(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        *released = true;
        self.signal.notify_all();
    }

    fn wait(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        let mut waited = Duration::ZERO;
        while !*released {
            let (guard, timeout) = self
                .signal
                .wait_timeout(released, TEARDOWN_WARN_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner);
            released = guard;
            if timeout.timed_out() && !*released {
                waited += TEARDOWN_WARN_INTERVAL;
                tracing::warn!(
                    waited_secs = waited.as_secs(),
                    "still waiting for source to be released"
                );
            }
        }
    }
}

/// Strong reference to the attached source. The last one to drop opens the latch.
pub(crate) struct SourceHandle {
    source: Box<dyn MediaSource>,
    latch: Arc<TeardownLatch>,
}

impl std::ops::Deref for SourceHandle {
    type Target = dyn MediaSource;

    fn deref(&self) -> &Self::Target {
        self.source.as_ref()
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.latch.mark_released();
    }
}

/// The player's ownership slot for its source.
pub(crate) struct SourceSlot {
    handle: Arc<SourceHandle>,
    latch: Arc<TeardownLatch>,
}

impl SourceSlot {
    pub(crate) fn new(source: Box<dyn MediaSource>) -> Self {
        let latch = Arc::new(TeardownLatch::default());
        Self {
            handle: Arc::new(SourceHandle {
                source,
                latch: latch.clone(),
            }),
            latch,
        }
    }

    /// A strong handle for use outside the session lock.
    pub(crate) fn handle(&self) -> Arc<SourceHandle> {
        self.handle.clone()
    }

    /// Drop the slot's reference and block until every other handle has been dropped too.
    pub(crate) fn release_and_wait(self) {
        let Self { handle, latch } = self;
        drop(handle);
        latch.wait();
        tracing::debug!("source released");
    }
}
