use crate::error::RenderResult;
use crate::source::MediaBuffer;

/// The buffer currently being drained into the output, plus the result of the read made at
/// start.
///
/// Holds at most one source buffer at a time; a buffer is dropped before its replacement is
/// requested.
#[derive(Debug, Default)]
pub struct BufferCursor {
    current: Option<MediaBuffer>,
    first: Option<RenderResult<MediaBuffer>>,
}

impl BufferCursor {
    /// Stash the result of the read made during start. Handed out by the first fill.
    pub fn prime(&mut self, first: RenderResult<MediaBuffer>) {
        self.first = Some(first);
    }

    pub fn take_first(&mut self) -> Option<RenderResult<MediaBuffer>> {
        self.first.take()
    }

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    pub fn adopt(&mut self, buffer: MediaBuffer) {
        debug_assert!(self.current.is_none(), "adopting over a held buffer");
        self.current = Some(buffer);
    }

    /// Bytes left in the current buffer (0 without one).
    pub fn remaining(&self) -> usize {
        self.current.as_ref().map_or(0, MediaBuffer::range_length)
    }

    pub fn release(&mut self) {
        self.current = None;
    }

    /// Drop both the current buffer and any unconsumed first-read result.
    pub fn discard_all(&mut self) {
        self.current = None;
        self.first = None;
    }

    /// Copy as much of the current buffer as fits into `dst` and advance its range.
    pub fn copy_into(&mut self, dst: &mut [u8]) -> usize {
        let Some(buffer) = self.current.as_mut() else {
            return 0;
        };
        let copy = dst.len().min(buffer.range_length());
        dst[..copy].copy_from_slice(&buffer.data()[..copy]);
        let offset = buffer.range_offset() + copy;
        let length = buffer.range_length() - copy;
        buffer.set_range(offset, length);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;

    #[test]
    fn copy_advances_through_buffer() {
        let mut cursor = BufferCursor::default();
        cursor.adopt(MediaBuffer::new((0u8..10).collect(), 0));

        let mut dst = [0u8; 4];
        assert_eq!(cursor.copy_into(&mut dst), 4);
        assert_eq!(dst, [0, 1, 2, 3]);
        assert_eq!(cursor.remaining(), 6);

        let mut dst = [0u8; 16];
        assert_eq!(cursor.copy_into(&mut dst), 6);
        assert_eq!(&dst[..6], &[4, 5, 6, 7, 8, 9]);
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.has_current());

        cursor.release();
        assert!(!cursor.has_current());
        assert_eq!(cursor.copy_into(&mut dst), 0);
    }

    #[test]
    fn first_result_is_handed_out_once() {
        let mut cursor = BufferCursor::default();
        cursor.prime(Err(RenderError::EndOfStream));
        assert_eq!(cursor.take_first(), Some(Err(RenderError::EndOfStream)));
        assert_eq!(cursor.take_first(), None);
    }

    #[test]
    fn discard_all_drops_first_and_current() {
        let mut cursor = BufferCursor::default();
        cursor.prime(Ok(MediaBuffer::new(vec![0; 8], 0)));
        cursor.adopt(MediaBuffer::new(vec![0; 8], 0));
        cursor.discard_all();
        assert_eq!(cursor.take_first(), None);
        assert!(!cursor.has_current());
    }
}
