//! Backends over a fixed-size block of memory.

use std::io::SeekFrom;

use channelfs_core::{Backend, ChannelError, Property, Reposition, Transfer, Whence};

/// A contiguous block of bytes with a fixed length.
///
/// Implementors own whatever OS resource backs the bytes. They are released
/// exactly once through [`Region::release`]; a region that is dropped
/// without being released is deliberately leaked, which is how a channel
/// opened with `NOT_CLOSE` leaves a mapping alive.
///
/// # Object Safety
///
/// This trait is object-safe, so `Memory<Box<dyn Region>>` works.
pub trait Region: Send {
    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];

    /// Give the bytes back to the OS. `position` is the channel's final
    /// position, for regions that trim their backing object to it.
    fn release(&mut self, _position: u64) -> Result<(), ChannelError> {
        Ok(())
    }
}

impl Region for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

// Blanket implementations for boxed regions

impl<R: Region + ?Sized> Region for Box<R> {
    fn bytes(&self) -> &[u8] {
        (**self).bytes()
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        (**self).bytes_mut()
    }

    fn release(&mut self, position: u64) -> Result<(), ChannelError> {
        (**self).release(position)
    }
}

/// Bounds-checked reads and writes over a [`Region`].
///
/// Transfers that run past the end are clamped and raise EOF. Seeks are
/// range-checked against `[0, len]`.
#[derive(Debug)]
pub struct Memory<R: Region> {
    region: Option<R>,
    position: usize,
    writable: bool,
}

impl Memory<Vec<u8>> {
    /// A zero-filled in-process buffer.
    pub fn zeroed(size: usize) -> Self {
        Memory::new(vec![0u8; size], true)
    }
}

impl<R: Region> Memory<R> {
    pub fn new(region: R, writable: bool) -> Self {
        Self {
            region: Some(region),
            position: 0,
            writable,
        }
    }

    pub fn len(&self) -> usize {
        self.region.as_ref().map_or(0, |r| r.bytes().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// The region, until it has been released.
    pub fn region(&self) -> Option<&R> {
        self.region.as_ref()
    }

    fn released() -> ChannelError {
        ChannelError::Unsupported {
            operation: "access after release",
            scheme: "Memory",
        }
    }

    fn release(&mut self) -> Result<(), ChannelError> {
        match self.region.take() {
            Some(mut region) => region.release(self.position as u64),
            None => Ok(()),
        }
    }
}

impl<R: Region> Backend for Memory<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        let bytes = self.region.as_ref().ok_or_else(Self::released)?.bytes();
        let start = self.position.min(bytes.len());
        let count = (bytes.len() - start).min(buf.len());
        buf[..count].copy_from_slice(&bytes[start..start + count]);
        self.position = start + count;
        Ok(Transfer {
            bytes: count,
            eof: count < buf.len(),
        })
    }

    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError> {
        if !self.writable {
            return Err(ChannelError::AccessViolation {
                operation: "writing",
            });
        }
        let bytes = self.region.as_mut().ok_or_else(Self::released)?.bytes_mut();
        let start = self.position.min(bytes.len());
        let count = (bytes.len() - start).min(buf.len());
        bytes[start..start + count].copy_from_slice(&buf[..count]);
        self.position = start + count;
        Ok(Transfer {
            bytes: count,
            eof: count < buf.len(),
        })
    }

    fn repositioner(&mut self) -> Option<&mut dyn Reposition> {
        Some(self)
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.release()
    }

    fn detach(&mut self) {
        if let Some(region) = self.region.take() {
            log::debug!("leaving {} bytes of memory attached", region.bytes().len());
        }
    }

    fn property(&self, name: &str) -> Option<Property> {
        let region = self.region.as_ref()?;
        match name {
            "MemPointer" => Some(Property::Address(region.bytes().as_ptr() as usize)),
            "Size" => Some(Property::Size(region.bytes().len() as u64)),
            _ => None,
        }
    }
}

impl<R: Region> Reposition for Memory<R> {
    fn reposition(&mut self, to: SeekFrom) -> Result<u64, ChannelError> {
        let len = self.len() as i64;
        let (offset, whence) = Whence::from_seek_from(to)?;
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.position as i64,
            Whence::End => len,
        };
        let target = base
            .checked_add(offset)
            .filter(|t| (0..=len).contains(t))
            .ok_or(ChannelError::SeekOutOfRange { offset, whence })?;
        self.position = target as usize;
        Ok(target as u64)
    }
}

impl<R: Region> Drop for Memory<R> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("releasing memory region failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn clamps_at_the_end() {
        let mut memory = Memory::new(b"0123456789".to_vec(), true);
        memory.reposition(SeekFrom::Start(7)).unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(memory.read(&mut buf).unwrap(), Transfer { bytes: 3, eof: true });
        assert_eq!(&buf[..3], b"789");
        assert_eq!(memory.read(&mut buf).unwrap(), Transfer { bytes: 0, eof: true });

        memory.reposition(SeekFrom::Start(8)).unwrap();
        assert_eq!(memory.write(b"abcd").unwrap(), Transfer { bytes: 2, eof: true });
        assert_eq!(memory.region().unwrap().as_slice(), b"01234567ab");
    }

    #[test]
    fn seek_is_range_checked() {
        let mut memory = Memory::zeroed(10);
        assert_eq!(memory.reposition(SeekFrom::Start(10)).unwrap(), 10);
        assert_eq!(memory.reposition(SeekFrom::End(-4)).unwrap(), 6);

        let err = memory.reposition(SeekFrom::Start(11)).unwrap_err();
        assert!(matches!(err, ChannelError::SeekOutOfRange { offset: 11, .. }));
        assert_eq!(memory.position(), 6);
        assert!(memory.reposition(SeekFrom::Current(-7)).is_err());
        assert_eq!(memory.position(), 6);
    }

    #[test]
    fn read_only_memory_refuses_writes() {
        let mut memory = Memory::new(vec![1u8; 4], false);
        let err = memory.write(b"x").unwrap_err();
        assert!(matches!(err, ChannelError::AccessViolation { .. }));
    }

    #[test]
    fn properties_work() {
        let memory = Memory::zeroed(32);
        assert_eq!(memory.property("Size"), Some(Property::Size(32)));
        assert!(matches!(memory.property("MemPointer"), Some(Property::Address(a)) if a != 0));
        assert_eq!(memory.property("Fd"), None);
    }

    struct Counted {
        bytes: Vec<u8>,
        released: Arc<AtomicUsize>,
        trimmed_to: Arc<AtomicUsize>,
    }

    impl Region for Counted {
        fn bytes(&self) -> &[u8] {
            &self.bytes
        }

        fn bytes_mut(&mut self) -> &mut [u8] {
            &mut self.bytes
        }

        fn release(&mut self, position: u64) -> Result<(), ChannelError> {
            self.released.fetch_add(1, Ordering::SeqCst);
            self.trimmed_to.store(position as usize, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn release_happens_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let trimmed_to = Arc::new(AtomicUsize::new(0));
        let mut memory = Memory::new(
            Counted {
                bytes: vec![0u8; 8],
                released: released.clone(),
                trimmed_to: trimmed_to.clone(),
            },
            true,
        );
        memory.write(b"abc").unwrap();
        memory.close().unwrap();
        memory.close().unwrap();
        drop(memory);

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(trimmed_to.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn detach_skips_release() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut memory = Memory::new(
            Counted {
                bytes: vec![0u8; 8],
                released: released.clone(),
                trimmed_to: Arc::new(AtomicUsize::new(0)),
            },
            true,
        );
        memory.detach();
        drop(memory);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }
}
