//! Stdio-style buffered descriptors.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

use channelfs_core::{Backend, ChannelError, Property, Reposition, Transfer};

use crate::descriptor::{close_fd, is_valid_fd};

/// Which side of the file currently holds a buffer.
#[derive(Debug)]
enum Stream {
    Reading(BufReader<File>),
    Writing(BufWriter<File>),
}

/// A descriptor with user-space read and write buffers.
///
/// Only one buffer is live at a time. Switching from reading to writing
/// moves the OS offset back over unread buffered bytes; switching from
/// writing to reading flushes. The position reported to the channel comes
/// from the buffered stream's own position query, so it always accounts for
/// the buffered bytes.
#[derive(Debug)]
pub struct BufferedDescriptor {
    stream: Option<Stream>,
    owned: bool,
    regular: bool,
    fd: RawFd,
}

impl BufferedDescriptor {
    pub fn new(file: File, owned: bool) -> Self {
        let regular = file.metadata().map(|m| m.is_file()).unwrap_or(false);
        let fd = file.as_raw_fd();
        Self {
            stream: Some(Stream::Reading(BufReader::new(file))),
            owned,
            regular,
            fd,
        }
    }

    /// Wrap a descriptor number. Fails with `EBADF` when it is not open.
    pub fn from_raw_fd(fd: RawFd, owned: bool) -> Result<Self, ChannelError> {
        if !is_valid_fd(fd) {
            return Err(ChannelError::io("fcntl")(io::Error::from_raw_os_error(
                libc::EBADF,
            )));
        }
        // SAFETY: fd is open, and a borrowed fd is never closed through this File.
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(Self::new(file, owned))
    }

    fn missing() -> ChannelError {
        ChannelError::io("buffered stream")(io::Error::from_raw_os_error(libc::EBADF))
    }

    fn reader(&mut self) -> Result<&mut BufReader<File>, ChannelError> {
        if let Some(Stream::Writing(_)) = self.stream {
            let Some(Stream::Writing(writer)) = self.stream.take() else {
                return Err(Self::missing());
            };
            let file = writer
                .into_inner()
                .map_err(|e| ChannelError::io("flush")(e.into_error()))?;
            self.stream = Some(Stream::Reading(BufReader::new(file)));
        }
        match self.stream.as_mut() {
            Some(Stream::Reading(reader)) => Ok(reader),
            _ => Err(Self::missing()),
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, ChannelError> {
        if let Some(Stream::Reading(reader)) = self.stream.as_mut() {
            let unread = reader.buffer().len();
            if unread > 0 {
                if self.regular {
                    reader
                        .seek(SeekFrom::Current(0))
                        .map_err(ChannelError::Seek)?;
                } else {
                    log::debug!("dropping {} buffered bytes on a non-seekable stream", unread);
                }
            }
            let Some(Stream::Reading(reader)) = self.stream.take() else {
                return Err(Self::missing());
            };
            self.stream = Some(Stream::Writing(BufWriter::new(reader.into_inner())));
        }
        match self.stream.as_mut() {
            Some(Stream::Writing(writer)) => Ok(writer),
            _ => Err(Self::missing()),
        }
    }

    fn into_file(stream: Stream) -> Result<File, ChannelError> {
        match stream {
            Stream::Reading(reader) => Ok(reader.into_inner()),
            Stream::Writing(writer) => writer
                .into_inner()
                .map_err(|e| ChannelError::io("flush")(e.into_error())),
        }
    }
}

impl Backend for BufferedDescriptor {
    fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        let reader = self.reader()?;
        let mut total = 0;
        while total < buf.len() {
            match reader.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChannelError::io("read")(e)),
            }
        }
        Ok(Transfer {
            bytes: total,
            eof: total < buf.len(),
        })
    }

    fn write(&mut self, buf: &[u8]) -> Result<Transfer, ChannelError> {
        let writer = self.writer()?;
        writer.write_all(buf).map_err(ChannelError::io("write"))?;
        Ok(Transfer::new(buf.len()))
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        match self.stream.as_mut() {
            Some(Stream::Writing(writer)) => writer.flush().map_err(ChannelError::io("flush")),
            _ => Ok(()),
        }
    }

    fn repositioner(&mut self) -> Option<&mut dyn Reposition> {
        if self.regular {
            Some(self)
        } else {
            None
        }
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let file = Self::into_file(stream)?;
        if self.owned {
            close_fd(file.into_raw_fd())
        } else {
            let _ = file.into_raw_fd();
            Ok(())
        }
    }

    fn detach(&mut self) {
        if let Some(stream) = self.stream.take() {
            match Self::into_file(stream) {
                Ok(file) => {
                    let _ = file.into_raw_fd();
                }
                Err(e) => log::warn!("detaching buffered stream lost data: {}", e),
            }
        }
    }

    fn property(&self, name: &str) -> Option<Property> {
        match name {
            "Fd" if self.stream.is_some() => Some(Property::Fd(self.fd)),
            _ => None,
        }
    }
}

impl Reposition for BufferedDescriptor {
    fn reposition(&mut self, to: SeekFrom) -> Result<u64, ChannelError> {
        let moved = match self.stream.as_mut() {
            Some(Stream::Reading(reader)) => reader.seek(to),
            Some(Stream::Writing(writer)) => writer.seek(to),
            None => return Err(Self::missing()),
        };
        moved.map_err(ChannelError::Seek)
    }
}

impl Drop for BufferedDescriptor {
    fn drop(&mut self) {
        if !self.owned {
            self.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back_works() {
        let tmp = tempfile::tempfile().unwrap();
        let mut stream = BufferedDescriptor::new(tmp, true);
        stream.write(b"hello ").unwrap();
        stream.write(b"world").unwrap();

        let medium = stream.repositioner().unwrap();
        assert_eq!(medium.reposition(SeekFrom::Start(6)).unwrap(), 6);

        let mut buf = [0u8; 16];
        let transfer = stream.read(&mut buf).unwrap();
        assert_eq!(&buf[..transfer.bytes], b"world");
        assert!(transfer.eof);
        stream.close().unwrap();
    }

    #[test]
    fn switching_to_write_respects_logical_position() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.seek(SeekFrom::Start(0)).unwrap();

        let mut stream = BufferedDescriptor::new(tmp, true);
        let mut buf = [0u8; 3];
        stream.read(&mut buf).unwrap();
        // the reader buffered the whole file; the write must land at 3
        stream.write(b"X").unwrap();
        let position = stream
            .repositioner()
            .unwrap()
            .reposition(SeekFrom::Current(0))
            .unwrap();
        assert_eq!(position, 4);

        stream.repositioner().unwrap().reposition(SeekFrom::Start(0)).unwrap();
        let mut all = [0u8; 10];
        stream.read(&mut all).unwrap();
        assert_eq!(&all, b"012X456789");
    }

    #[test]
    fn borrowed_fd_is_flushed_not_closed() {
        let tmp = tempfile::tempfile().unwrap();
        let fd = tmp.as_raw_fd();

        let mut stream = BufferedDescriptor::from_raw_fd(fd, false).unwrap();
        assert_eq!(stream.property("Fd"), Some(Property::Fd(fd)));
        stream.write(b"kept").unwrap();
        stream.close().unwrap();

        assert!(is_valid_fd(fd));
        assert_eq!(tmp.metadata().unwrap().len(), 4);
    }
}
