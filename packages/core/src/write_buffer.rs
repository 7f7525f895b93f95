//! Optional write-coalescing buffer.

use serde::{Deserialize, Serialize};

/// Settings for write coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBufferConfig {
    /// Initial capacity in bytes.
    pub capacity: usize,
    /// Grow instead of draining when a write does not fit.
    #[serde(default)]
    pub auto_resize: bool,
}

impl Default for WriteBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            auto_resize: false,
        }
    }
}

/// Bytes accepted by `write` but not yet handed to the backend.
#[derive(Debug)]
pub struct WriteBuffer {
    data: Vec<u8>,
    capacity: usize,
    auto_resize: bool,
}

impl WriteBuffer {
    pub fn new(config: WriteBufferConfig) -> Self {
        Self {
            data: Vec::with_capacity(config.capacity),
            capacity: config.capacity,
            auto_resize: config.auto_resize,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn auto_resize(&self) -> bool {
        self.auto_resize
    }

    /// Whether `count` more bytes fit without growing.
    pub fn fits(&self, count: usize) -> bool {
        self.data.len() + count <= self.capacity
    }

    /// Append bytes, growing to twice the needed size when auto-resizing.
    ///
    /// Returns `false`, leaving the buffer untouched, when the bytes do not
    /// fit and the buffer may not grow.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if !self.fits(bytes.len()) {
            if !self.auto_resize {
                return false;
            }
            self.capacity = (self.data.len() + bytes.len()) * 2;
            self.data.reserve(self.capacity - self.data.len());
        }
        self.data.extend_from_slice(bytes);
        true
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Forget the first `count` bytes after they reached the backend.
    pub fn consume(&mut self, count: usize) {
        self.data.drain(..count.min(self.data.len()));
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_within_capacity_works() {
        let mut buffer = WriteBuffer::new(WriteBufferConfig {
            capacity: 8,
            auto_resize: false,
        });
        assert!(buffer.append(b"abcd"));
        assert!(buffer.append(b"efgh"));
        assert_eq!(buffer.as_slice(), b"abcdefgh");
        assert!(!buffer.append(b"i"));
        assert_eq!(buffer.len(), 8);
    }

    #[test]
    fn auto_resize_doubles_needed_size() {
        let mut buffer = WriteBuffer::new(WriteBufferConfig {
            capacity: 4,
            auto_resize: true,
        });
        assert!(buffer.append(b"abc"));
        assert!(buffer.append(b"defg"));
        assert_eq!(buffer.capacity(), 14);
        assert_eq!(buffer.as_slice(), b"abcdefg");
    }

    #[test]
    fn consume_drops_front() {
        let mut buffer = WriteBuffer::new(WriteBufferConfig::default());
        buffer.append(b"hello world");
        buffer.consume(6);
        assert_eq!(buffer.as_slice(), b"world");
        buffer.consume(100);
        assert!(buffer.is_empty());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: WriteBufferConfig = serde_json::from_str(r#"{"capacity": 64}"#).unwrap();
        assert_eq!(config.capacity, 64);
        assert!(!config.auto_resize);
    }
}
