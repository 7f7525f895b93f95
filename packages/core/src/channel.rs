//! The channel handle.

use std::fmt;
use std::io::{self, SeekFrom};

use channelfs_locator::Options;

use crate::seek::{self, Cursor};
use crate::{
    Backend, ChannelConfig, ChannelError, ErrorKind, Mode, Opened, Permissions, Property,
    Pushback, Registry, Transfer, Whence, WriteBuffer, WriteBufferConfig,
};

/// Lifecycle phase of a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Fresh or cleared: only `open*` calls are valid.
    Constructed,
    /// Bound to a backend: data operations are valid.
    Opened,
    /// Closed: only `clear` is valid.
    Closed,
}

/// Everything that exists only while a backend is bound.
struct Session {
    scheme: &'static str,
    backend: Box<dyn Backend>,
    write_buffer: Option<WriteBuffer>,
    keep_open: bool,
    finished: bool,
}

impl Session {
    /// Hand buffered writes to the backend.
    fn drain(&mut self) -> Result<(), ChannelError> {
        let Some(buffer) = self.write_buffer.as_mut() else {
            return Ok(());
        };
        while !buffer.is_empty() {
            let transfer = self.backend.write(buffer.as_slice())?;
            if transfer.bytes == 0 {
                return Err(ChannelError::ShortWrite {
                    written: 0,
                    requested: buffer.len(),
                });
            }
            buffer.consume(transfer.bytes);
        }
        Ok(())
    }

    /// Drain, flush and release the backend. Runs at most once.
    fn finish(&mut self) -> Result<(), ChannelError> {
        self.finished = true;
        let drained = self.drain();
        let flushed = self.backend.flush();
        let released = if self.keep_open {
            self.backend.detach();
            log::debug!("detached {} channel, medium left open", self.scheme);
            Ok(())
        } else {
            self.backend.close()
        };
        drained.and(flushed).and(released)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                log::warn!("closing {} channel on drop failed: {}", self.scheme, e);
            }
        }
    }
}

fn session_of(slot: &mut Option<Session>) -> &mut Session {
    match slot {
        Some(session) => session,
        None => unreachable!("an opened channel always has a session"),
    }
}

/// A polymorphic byte stream bound to one backend at a time.
///
/// A channel moves through three phases: [`Phase::Constructed`] until one
/// of the `open*` calls succeeds, [`Phase::Opened`] until [`Channel::close`],
/// then [`Phase::Closed`] until [`Channel::clear`] makes it reusable. Calling
/// an operation in the wrong phase, or passing an empty buffer, is a
/// programming error and panics. Every other failure is returned as a
/// [`ChannelError`] and also recorded as the channel's last error; the
/// channel stays usable afterwards.
///
/// Bytes handed back with [`Channel::unget`] live in a caller-supplied
/// pushback buffer and are read before anything from the backend. Relative
/// seeks are served from that buffer when they can be, so even stream media
/// support small backward and forward seeks.
///
/// A channel is not synchronized. Share it between threads only behind
/// external locking.
///
/// # Example
///
/// ```rust,ignore
/// use channelfs_core::{Channel, Mode, Permissions, Registry};
///
/// let mut channel = Channel::new();
/// channel.open(&registry, "File:///tmp/x", Mode::READ_ONLY, Permissions::empty())?;
/// let mut buf = [0u8; 16];
/// let n = channel.read(&mut buf)?;
/// channel.unget(&buf[..n])?;
/// channel.close()?;
/// ```
pub struct Channel<S = Vec<u8>> {
    phase: Phase,
    session: Option<Session>,
    mode: Mode,
    permissions: Permissions,
    pushback: Pushback<S>,
    cursor: Cursor,
    write_config: Option<WriteBufferConfig>,
    eof: bool,
    last_error: Option<ErrorKind>,
    bytes_read: u64,
    bytes_written: u64,
}

impl Channel<Vec<u8>> {
    /// A channel with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&ChannelConfig::default())
    }

    /// A channel whose pushback buffer and write buffering follow `config`.
    pub fn with_config(config: &ChannelConfig) -> Self {
        let mut channel = Channel::with_pushback(vec![0u8; config.pushback_capacity]);
        channel.write_config = config.write_buffer;
        channel
    }
}

impl Default for Channel<Vec<u8>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> Channel<S> {
    /// A channel that keeps its pushback bytes in `storage`.
    ///
    /// The channel never touches bytes beyond `storage`'s length. Get the
    /// storage back with [`Channel::into_pushback`].
    pub fn with_pushback(storage: S) -> Self {
        Self {
            phase: Phase::Constructed,
            session: None,
            mode: Mode::empty(),
            permissions: Permissions::empty(),
            pushback: Pushback::new(storage),
            cursor: Cursor::default(),
            write_config: None,
            eof: false,
            last_error: None,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Give back the pushback storage, closing the channel if it is open.
    pub fn into_pushback(mut self) -> S {
        if let Some(mut session) = self.session.take() {
            if !session.finished {
                if let Err(e) = session.finish() {
                    log::warn!("closing {} channel failed: {}", session.scheme, e);
                }
            }
        }
        self.pushback.into_inner()
    }

    fn require(&self, phase: Phase, operation: &str) {
        assert!(
            self.phase == phase,
            "channel {} requires phase {:?}, but the channel is {:?}",
            operation,
            phase,
            self.phase
        );
    }

    fn track<T>(&mut self, result: Result<T, ChannelError>) -> Result<T, ChannelError> {
        if let Err(e) = &result {
            self.last_error = Some(e.kind());
        }
        result
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Opened
    }

    // Opening

    /// Open `Scheme://payload [reference = value ...]` through `registry`.
    ///
    /// An empty `mode` falls back to the plugin's default access mode.
    pub fn open(
        &mut self,
        registry: &Registry,
        locator: &str,
        mode: Mode,
        permissions: Permissions,
    ) -> Result<(), ChannelError> {
        self.require(Phase::Constructed, "open");
        let opened = registry.open_locator(locator, mode, permissions);
        self.bind(opened)
    }

    /// Open from an option string such as `stream=File name=/tmp/x mode=READ_ONLY`.
    pub fn open_from_string(
        &mut self,
        registry: &Registry,
        description: &str,
    ) -> Result<(), ChannelError> {
        self.require(Phase::Constructed, "open_from_string");
        match Options::parse(description) {
            Ok(options) => self.open_from_options(registry, &options),
            Err(e) => self.track(Err(e.into())),
        }
    }

    /// Open from parsed options. `stream` names the scheme, `mode` and
    /// `perm` are flag expressions.
    pub fn open_from_options(
        &mut self,
        registry: &Registry,
        options: &Options,
    ) -> Result<(), ChannelError> {
        self.require(Phase::Constructed, "open_from_options");
        let opened = Self::options_mode(options)
            .and_then(|(mode, permissions)| registry.open_options(options, mode, permissions));
        self.bind(opened)
    }

    /// Bind an already opened backend.
    pub fn open_backend(
        &mut self,
        scheme: &'static str,
        backend: Box<dyn Backend>,
        mode: Mode,
    ) -> Result<(), ChannelError> {
        self.require(Phase::Constructed, "open_backend");
        let opened = mode.validate().map(|_| Opened {
            scheme,
            backend,
            mode,
            permissions: Permissions::empty(),
        });
        self.bind(opened)
    }

    fn options_mode(options: &Options) -> Result<(Mode, Permissions), ChannelError> {
        let mode = match options.get("mode") {
            Some(expression) => Mode::from_expression(expression)?,
            None => Mode::empty(),
        };
        let permissions = match options.get("perm") {
            Some(expression) => Permissions::from_expression(expression)?,
            None => Permissions::empty(),
        };
        Ok((mode, permissions))
    }

    fn bind(&mut self, opened: Result<Opened, ChannelError>) -> Result<(), ChannelError> {
        let Opened {
            scheme,
            mut backend,
            mode,
            permissions,
        } = self.track(opened)?;

        self.pushback.clear();
        self.cursor = Cursor::default();
        if let Some(medium) = backend.repositioner() {
            match medium.reposition(SeekFrom::Current(0)) {
                Ok(offset) => self.cursor.offset = offset,
                Err(e) => log::debug!("{} channel did not report its offset: {}", scheme, e),
            }
        }

        self.session = Some(Session {
            scheme,
            backend,
            write_buffer: self.write_config.map(WriteBuffer::new),
            keep_open: mode.keeps_open(),
            finished: false,
        });
        self.mode = mode;
        self.permissions = permissions;
        self.eof = false;
        self.phase = Phase::Opened;
        Ok(())
    }

    // Reading

    /// Read up to `buf.len()` bytes, pushback first.
    ///
    /// Returns the number of bytes read; fewer than requested means the
    /// backend had no more right now (check [`Channel::eof`]).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        self.require(Phase::Opened, "read");
        assert!(!buf.is_empty(), "read needs a non-empty buffer");
        let result = self.read_once(buf);
        self.track(result)
    }

    fn read_once(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        if !self.mode.can_read() {
            return Err(ChannelError::AccessViolation {
                operation: "reading",
            });
        }

        let session = session_of(&mut self.session);
        if self.mode.can_write() {
            session.drain()?;
        }

        let popped = self.pushback.pop_into(buf);
        let mut total = popped;
        if total < buf.len() {
            match session.backend.read(&mut buf[total..]) {
                Ok(Transfer { bytes, eof }) => {
                    if bytes > 0 {
                        self.pushback.forget_retired();
                    }
                    total += bytes;
                    self.cursor.offset += bytes as u64;
                    self.eof = eof;
                }
                Err(e) => {
                    self.pushback.rewind(popped);
                    return Err(e);
                }
            }
        }

        self.cursor.read_since_write += total as u64;
        self.bytes_read += total as u64;
        Ok(total)
    }

    /// Read until `buf` is full or the medium runs dry.
    pub fn read_block(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        self.require(Phase::Opened, "read_block");
        assert!(!buf.is_empty(), "read_block needs a non-empty buffer");
        let mut total = 0;
        while total < buf.len() {
            let result = self.read_once(&mut buf[total..]);
            let n = self.track(result)?;
            total += n;
            if n == 0 || self.eof() {
                break;
            }
        }
        Ok(total)
    }

    /// Read one byte, `None` at end of stream.
    pub fn getc(&mut self) -> Result<Option<u8>, ChannelError> {
        let mut byte = [0u8];
        let n = self.read(&mut byte)?;
        Ok((n == 1).then_some(byte[0]))
    }

    /// Read a line of at most `max` bytes, keeping the trailing `\n`.
    ///
    /// Returns an empty vector at end of stream.
    pub fn gets(&mut self, max: usize) -> Result<Vec<u8>, ChannelError> {
        assert!(max > 0, "gets needs a positive length");
        let mut line = Vec::new();
        while line.len() < max {
            match self.getc()? {
                Some(byte) => {
                    line.push(byte);
                    if byte == b'\n' {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(line)
    }

    /// Hand bytes back to the stream; the next reads return them in order.
    ///
    /// At most the number of bytes read since the last write or absolute
    /// seek can be returned, and never more than the free pushback space.
    pub fn unget(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.require(Phase::Opened, "unget");
        assert!(!bytes.is_empty(), "unget needs a non-empty buffer");
        let result = self.unget_once(bytes);
        self.track(result)
    }

    fn unget_once(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let requested = bytes.len();
        if requested as u64 > self.cursor.read_since_write {
            return Err(ChannelError::UngetBeyondRead {
                requested,
                readable: self.cursor.read_since_write,
            });
        }
        self.pushback.push(bytes)?;
        self.cursor.read_since_write -= requested as u64;
        Ok(())
    }

    /// True once the backend reported end of stream and no pushback is left.
    pub fn eof(&self) -> bool {
        self.eof && self.pushback.is_empty()
    }

    // Writing

    /// Write up to `buf.len()` bytes, returning how many were accepted.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        self.require(Phase::Opened, "write");
        assert!(!buf.is_empty(), "write needs a non-empty buffer");
        let result = self.write_once(buf);
        self.track(result)
    }

    fn write_once(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        if !self.mode.can_write() {
            return Err(ChannelError::AccessViolation {
                operation: "writing",
            });
        }
        self.discard_pushback()?;

        let session = session_of(&mut self.session);
        if session
            .write_buffer
            .as_ref()
            .is_some_and(|b| !b.auto_resize() && !b.fits(buf.len()))
        {
            session.drain()?;
        }

        let buffered = session
            .write_buffer
            .as_mut()
            .is_some_and(|b| b.append(buf));
        let Transfer { bytes, eof } = if buffered {
            Transfer::new(buf.len())
        } else {
            session.backend.write(buf)?
        };

        self.cursor.offset += bytes as u64;
        self.cursor.read_since_write = 0;
        if eof {
            self.eof = true;
        }
        self.bytes_written += bytes as u64;
        Ok(bytes)
    }

    /// Pushback bytes sit before the medium's offset; writing must land at
    /// the caller-visible position instead.
    fn discard_pushback(&mut self) -> Result<(), ChannelError> {
        let held = self.pushback.len();
        if held == 0 {
            self.pushback.forget_retired();
            return Ok(());
        }
        let session = session_of(&mut self.session);
        match session.backend.repositioner() {
            Some(medium) => {
                self.cursor.offset = medium.reposition(SeekFrom::Current(-(held as i64)))?;
            }
            None => self.cursor.offset -= held as u64,
        }
        self.pushback.clear();
        Ok(())
    }

    /// Write all of `buf`, failing with [`ChannelError::ShortWrite`] if the
    /// medium stops accepting bytes. A memory medium that fills up ends the
    /// write early and sets EOF instead.
    pub fn write_block(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        self.require(Phase::Opened, "write_block");
        assert!(!buf.is_empty(), "write_block needs a non-empty buffer");
        let mut total = 0;
        while total < buf.len() {
            let result = self.write_once(&buf[total..]);
            let n = self.track(result)?;
            if n == 0 {
                if self.eof {
                    break;
                }
                let short = Err(ChannelError::ShortWrite {
                    written: total,
                    requested: buf.len(),
                });
                return self.track(short);
            }
            total += n;
        }
        Ok(total)
    }

    pub fn putc(&mut self, byte: u8) -> Result<(), ChannelError> {
        self.write_block(&[byte]).map(|_| ())
    }

    /// Write a string, returning the number of bytes written.
    pub fn puts(&mut self, text: &str) -> Result<usize, ChannelError> {
        self.require(Phase::Opened, "puts");
        if text.is_empty() {
            return Ok(0);
        }
        self.write_block(text.as_bytes())
    }

    /// Hand buffered writes to the medium and flush it.
    pub fn flush(&mut self) -> Result<(), ChannelError> {
        self.require(Phase::Opened, "flush");
        let session = session_of(&mut self.session);
        let result = session.drain().and_then(|()| session.backend.flush());
        self.track(result)
    }

    /// Turn write coalescing on or off, draining what is buffered first.
    pub fn set_write_buffering(
        &mut self,
        config: Option<WriteBufferConfig>,
    ) -> Result<(), ChannelError> {
        if self.phase == Phase::Opened {
            let session = session_of(&mut self.session);
            let drained = session.drain();
            self.track(drained)?;
            let session = session_of(&mut self.session);
            session.write_buffer = config.map(WriteBuffer::new);
        }
        self.write_config = config;
        Ok(())
    }

    /// Bytes accepted by `write` but not yet handed to the medium.
    pub fn buffered(&self) -> usize {
        self.session
            .as_ref()
            .and_then(|s| s.write_buffer.as_ref())
            .map_or(0, WriteBuffer::len)
    }

    // Positioning

    /// Move the caller-visible position. Returns the new position.
    ///
    /// On failure the position is unchanged.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, ChannelError> {
        self.require(Phase::Opened, "seek");
        let result = self.seek_once(offset, whence);
        self.track(result)
    }

    fn seek_once(&mut self, offset: i64, whence: Whence) -> Result<u64, ChannelError> {
        if whence == Whence::Current && offset == 0 {
            return Ok(self.cursor.position(&self.pushback));
        }
        let session = session_of(&mut self.session);
        session.drain()?;
        let position = seek::seek(
            &mut self.pushback,
            &mut self.cursor,
            &mut *session.backend,
            offset,
            whence,
        )?;
        self.eof = false;
        Ok(position)
    }

    /// The caller-visible position. Never calls the backend.
    pub fn tell(&mut self) -> Result<u64, ChannelError> {
        self.seek(0, Whence::Current)
    }

    pub fn rewind(&mut self) -> Result<u64, ChannelError> {
        self.seek(0, Whence::Start)
    }

    // Closing

    /// Release the backend, or detach from it when opened with `NOT_CLOSE`.
    ///
    /// The channel is closed even when releasing reports an error.
    pub fn close(&mut self) -> Result<(), ChannelError> {
        self.require(Phase::Opened, "close");
        let synced = if self.mode.can_write() {
            self.discard_pushback()
        } else {
            Ok(())
        };
        let finished = session_of(&mut self.session).finish();
        self.phase = Phase::Closed;
        let result = synced.and(finished);
        self.track(result)
    }

    /// Reset a closed or never-opened channel so it can be opened again.
    pub fn clear(&mut self) {
        assert!(
            self.phase != Phase::Opened,
            "channel clear requires a closed channel"
        );
        self.session = None;
        self.mode = Mode::empty();
        self.permissions = Permissions::empty();
        self.pushback.clear();
        self.cursor = Cursor::default();
        self.eof = false;
        self.last_error = None;
        self.bytes_read = 0;
        self.bytes_written = 0;
        self.phase = Phase::Constructed;
    }

    // Properties and bookkeeping

    /// A backend property such as `Fd` or `Size`. Unknown names are `None`.
    pub fn get_property(&self, name: &str) -> Option<Property> {
        self.require(Phase::Opened, "get_property");
        let session = self.session.as_ref()?;
        let value = session.backend.property(name);
        if value.is_none() {
            log::warn!("property '{}' is not set for {} channels", name, session.scheme);
        }
        value
    }

    /// Set a backend property, returning whether the backend accepted it.
    pub fn set_property(&mut self, name: &str, value: Property) -> bool {
        self.require(Phase::Opened, "set_property");
        session_of(&mut self.session)
            .backend
            .set_property(name, value)
    }

    pub fn scheme(&self) -> Option<&'static str> {
        self.session.as_ref().map(|s| s.scheme)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Kind of the most recent failure, kept until [`Channel::clear_error`].
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn reset_counters(&mut self) {
        self.bytes_read = 0;
        self.bytes_written = 0;
    }

    /// Bytes currently held in the pushback buffer.
    pub fn pushback_len(&self) -> usize {
        self.pushback.len()
    }

    pub fn pushback_capacity(&self) -> usize {
        self.pushback.capacity()
    }
}

impl<S> fmt::Debug for Channel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("phase", &self.phase)
            .field("scheme", &self.session.as_ref().map(|s| s.scheme))
            .field("mode", &self.mode)
            .field("cursor", &self.cursor)
            .field("eof", &self.eof)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

// std::io adapters so channels plug into io::copy, BufReader and friends.

impl<S: AsRef<[u8]> + AsMut<[u8]>> io::Read for Channel<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        Channel::read(self, buf).map_err(io::Error::from)
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> io::Write for Channel<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        Channel::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Channel::flush(self).map_err(io::Error::from)
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> io::Seek for Channel<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let split = Whence::from_seek_from(pos);
        let (offset, whence) = self.track(split)?;
        Channel::seek(self, offset, whence).map_err(io::Error::from)
    }
}
