//! Backends over OS file descriptors.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

use channelfs_core::{Backend, ChannelError, Property, Reposition, Transfer};

/// Whether a descriptor is still usable.
pub fn is_valid_fd(fd: RawFd) -> bool {
    fd >= 0 && unsafe { libc::fcntl(fd, libc::F_GETFD) } != -1
}

fn is_regular(file: &File) -> bool {
    file.metadata().map(|m| m.is_file()).unwrap_or(false)
}

/// Close `fd`, reporting the OS error instead of swallowing it.
pub(crate) fn close_fd(fd: RawFd) -> Result<(), ChannelError> {
    if unsafe { libc::close(fd) } == -1 {
        return Err(ChannelError::io("close")(io::Error::last_os_error()));
    }
    Ok(())
}

/// A raw descriptor: files, pipes, terminals.
///
/// Reads and writes go straight to the OS. A short read raises EOF. Only
/// regular files can reposition; on anything else the channel falls back to
/// pushback-only seeking.
///
/// A borrowed descriptor (the standard streams, or one the caller still
/// owns) is never closed, not even on drop.
#[derive(Debug)]
pub struct Descriptor {
    file: Option<File>,
    owned: bool,
    regular: bool,
}

impl Descriptor {
    /// Take ownership of an open file.
    pub fn new(file: File) -> Self {
        let regular = is_regular(&file);
        Self {
            file: Some(file),
            owned: true,
            regular,
        }
    }

    /// Wrap a descriptor number. Fails with `EBADF` when it is not open.
    ///
    /// With `owned` set the descriptor is closed together with the channel.
    pub fn from_raw_fd(fd: RawFd, owned: bool) -> Result<Self, ChannelError> {
        if !is_valid_fd(fd) {
            return Err(ChannelError::io("fcntl")(io::Error::from_raw_os_error(
                libc::EBADF,
            )));
        }
        // SAFETY: fd is open, and a borrowed fd is never closed through this File.
        let file = unsafe { File::from_raw_fd(fd) };
        let regular = is_regular(&file);
        Ok(Self {
            file: Some(file),
            owned,
            regular,
        })
    }

    pub fn is_regular(&self) -> bool {
        self.regular
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn file(&mut self) -> Result<&mut File, ChannelError> {
        self.file.as_mut().ok_or_else(|| {
            ChannelError::io("descriptor")(io::Error::from_raw_os_error(libc::EBADF))
        })
    }
}

impl Backend for Descriptor {
    fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        let file = self.file()?;
        let n = loop {
            match file.read(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChannelError::io("read")(e)),
            }
        };
        Ok(Transfer {
            bytes: n,
            eof: n < buf.len(),
        })
    }

    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError> {
        let file = self.file()?;
        let n = loop {
            match file.write(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChannelError::io("write")(e)),
            }
        };
        if n == 0 {
            return Err(ChannelError::ShortWrite {
                written: 0,
                requested: buf.len(),
            });
        }
        Ok(Transfer::new(n))
    }

    fn repositioner(&mut self) -> Option<&mut dyn Reposition> {
        if self.regular {
            Some(self)
        } else {
            None
        }
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        match self.file.take() {
            Some(file) if self.owned => close_fd(file.into_raw_fd()),
            Some(file) => {
                let _ = file.into_raw_fd();
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn detach(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.into_raw_fd();
        }
    }

    fn property(&self, name: &str) -> Option<Property> {
        match name {
            "Fd" => self.fd().map(Property::Fd),
            _ => None,
        }
    }
}

impl Reposition for Descriptor {
    fn reposition(&mut self, to: SeekFrom) -> Result<u64, ChannelError> {
        self.file()?.seek(to).map_err(ChannelError::Seek)
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        if !self.owned {
            self.detach();
        }
    }
}
