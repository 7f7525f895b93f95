//! The pushback (unget) buffer.

use crate::ChannelError;

/// A bounded LIFO of bytes returned to the stream.
///
/// The storage is supplied by the caller and handed back by
/// [`Pushback::into_inner`]. `len` is the fill index: the number of bytes
/// currently held. Popping does not erase bytes, so bytes popped since the
/// last push (the *retired* bytes) can be made available again with
/// [`Pushback::rewind`].
#[derive(Debug)]
pub struct Pushback<S> {
    storage: S,
    len: usize,
    retired: usize,
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> Pushback<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            len: 0,
            retired: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.as_ref().len()
    }

    /// Number of bytes held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free space left.
    pub fn available(&self) -> usize {
        self.capacity() - self.len
    }

    /// Number of bytes popped since the last push.
    pub fn retired(&self) -> usize {
        self.retired
    }

    /// Push bytes back so that the next pops return them in order.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        if bytes.len() > self.available() {
            return Err(ChannelError::PushbackOverflow {
                requested: bytes.len(),
                available: self.available(),
            });
        }

        let storage = self.storage.as_mut();
        for &byte in bytes.iter().rev() {
            storage[self.len] = byte;
            self.len += 1;
        }
        self.retired = 0;
        Ok(())
    }

    /// Pop held bytes into `buf`, returning how many were copied.
    pub fn pop_into(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.len);
        let storage = self.storage.as_ref();
        for slot in buf.iter_mut().take(count) {
            self.len -= 1;
            *slot = storage[self.len];
        }
        self.retired += count;
        count
    }

    /// Make `count` retired bytes available again.
    pub fn rewind(&mut self, count: usize) {
        debug_assert!(count <= self.retired, "rewind past retired bytes");
        let count = count.min(self.retired);
        self.len += count;
        self.retired -= count;
    }

    /// Drop `count` held bytes without reading them. They become retired.
    pub fn skip(&mut self, count: usize) {
        debug_assert!(count <= self.len, "skip past held bytes");
        let count = count.min(self.len);
        self.len -= count;
        self.retired += count;
    }

    /// Retired bytes no longer sit just before the position, so they can
    /// not be rewound.
    pub fn forget_retired(&mut self) {
        self.retired = 0;
    }

    /// Empty the buffer.
    pub fn clear(&mut self) {
        self.len = 0;
        self.retired = 0;
    }

    pub fn into_inner(self) -> S {
        self.storage
    }
}
