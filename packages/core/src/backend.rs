//! The backend contract implemented once per medium.

use std::io::SeekFrom;
use std::net::SocketAddr;

use crate::ChannelError;

/// Outcome of a single backend transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transfer {
    /// Bytes moved.
    pub bytes: usize,
    /// The medium reached its end during this transfer.
    pub eof: bool,
}

impl Transfer {
    pub fn new(bytes: usize) -> Self {
        Self { bytes, eof: false }
    }

    pub fn eof(bytes: usize) -> Self {
        Self { bytes, eof: true }
    }
}

/// A named property value exposed by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// An OS descriptor.
    Fd(i32),
    /// A memory address, such as the base of a mapping.
    Address(usize),
    /// A size in bytes.
    Size(u64),
    /// A socket address.
    Socket(SocketAddr),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl Property {
    pub fn as_fd(&self) -> Option<i32> {
        match self {
            Property::Fd(fd) => Some(*fd),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Property::Int(v) => Some(*v),
            Property::Fd(fd) => Some(i64::from(*fd)),
            Property::Size(size) => i64::try_from(*size).ok(),
            _ => None,
        }
    }

    pub fn as_socket(&self) -> Option<SocketAddr> {
        match self {
            Property::Socket(addr) => Some(*addr),
            _ => None,
        }
    }
}

/// The ability to truly move a medium's cursor.
///
/// Backends that can reposition hand one out through
/// [`Backend::repositioner`]; the channel's seek algorithm uses it and
/// falls back to the pushback buffer alone when there is none.
pub trait Reposition {
    /// Move the cursor, returning the new absolute offset.
    fn reposition(&mut self, to: SeekFrom) -> Result<u64, ChannelError>;
}

/// A medium a channel can be bound to.
///
/// Backends never touch the channel's pushback buffer or position; the
/// channel keeps both consistent around these primitives.
///
/// # Object Safety
///
/// This trait is object-safe: channels hold a `Box<dyn Backend>`.
pub trait Backend: Send {
    /// Read into `buf` (never empty).
    fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError>;

    /// Write from `buf` (never empty).
    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError>;

    /// Push buffered bytes to the medium.
    fn flush(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// The repositioning capability, if the medium has one.
    fn repositioner(&mut self) -> Option<&mut dyn Reposition> {
        None
    }

    /// Release OS resources.
    fn close(&mut self) -> Result<(), ChannelError>;

    /// Give up OS resources without releasing them.
    fn detach(&mut self) {}

    /// Look up a named property.
    fn property(&self, _name: &str) -> Option<Property> {
        None
    }

    /// Set a named property, returning whether it was accepted.
    fn set_property(&mut self, _name: &str, _value: Property) -> bool {
        false
    }
}

// Blanket implementation for boxes

impl<T: Backend + ?Sized> Backend for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        (**self).flush()
    }

    fn repositioner(&mut self) -> Option<&mut dyn Reposition> {
        (**self).repositioner()
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        (**self).close()
    }

    fn detach(&mut self) {
        (**self).detach()
    }

    fn property(&self, name: &str) -> Option<Property> {
        (**self).property(name)
    }

    fn set_property(&mut self, name: &str, value: Property) -> bool {
        (**self).set_property(name, value)
    }
}
