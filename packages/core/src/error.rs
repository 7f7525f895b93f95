//! Error types for channels.

use std::io;

use channelfs_locator::LocatorError;

use crate::Whence;

/// Errors raised by channel operations.
///
/// Every variant is recoverable: the channel stays open after a failed
/// read, write or seek. Contract violations (wrong lifecycle phase, empty
/// buffers) are not represented here; they panic.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The locator or option list could not be parsed.
    #[error("bad locator string: {0}")]
    Locator(#[from] LocatorError),

    /// No plugin is registered for the scheme.
    #[error("no plugin registered for scheme '{scheme}'")]
    UnknownScheme { scheme: String },

    /// No access mode was given and the plugin has no default.
    #[error("access mode is not defined")]
    UndefinedMode,

    /// More than one access mode, or an access mode the plugin refuses.
    #[error("bad access mode: {message}")]
    BadMode { message: String },

    /// Flags that cannot be combined.
    #[error("bad flag combination: {message}")]
    BadFlags { message: String },

    /// A required option is absent.
    #[error("missing required option '{option}'")]
    MissingOption { option: &'static str },

    /// An argument is outside its allowed range.
    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: String },

    /// Reading from a write-only channel or writing to a read-only one.
    #[error("access violation: channel is not open for {operation}")]
    AccessViolation { operation: &'static str },

    /// An OS-level failure.
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// A socket read failed with an error outside the peer-gone catalogue.
    #[error("socket read failed: {0}")]
    SocketRead(#[source] io::Error),

    /// A socket write failed with an error outside the peer-gone catalogue.
    #[error("socket write failed: {0}")]
    SocketWrite(#[source] io::Error),

    /// The medium accepted fewer bytes than requested and cannot take more.
    #[error("short write: {written} of {requested} bytes written")]
    ShortWrite { written: usize, requested: usize },

    /// A bounded wait expired.
    #[error("timed out while {operation}")]
    Timeout { operation: &'static str },

    /// The medium refused to reposition.
    #[error("seek failed: {0}")]
    Seek(#[source] io::Error),

    /// The seek target lies outside what the medium or pushback can reach.
    #[error("seek of {offset} from {whence} is out of range")]
    SeekOutOfRange { offset: i64, whence: Whence },

    /// `unget` would exceed the pushback capacity.
    #[error("pushback overflow: {requested} bytes requested, {available} available")]
    PushbackOverflow { requested: usize, available: usize },

    /// `unget` of more bytes than were read since the last write.
    #[error("cannot unget {requested} bytes, only {readable} read since the last write")]
    UngetBeyondRead { requested: usize, readable: u64 },

    /// The medium does not support the operation.
    #[error("{operation} is not supported by {scheme} channels")]
    Unsupported {
        operation: &'static str,
        scheme: &'static str,
    },
}

/// A copyable classification of [`ChannelError`], kept as the channel's
/// last error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Locator,
    UnknownScheme,
    Mode,
    Flags,
    MissingOption,
    OutOfRange,
    Access,
    Io,
    Socket,
    ShortWrite,
    Timeout,
    Seek,
    Pushback,
    Unsupported,
}

impl ChannelError {
    /// Build a mapper for `map_err` that tags an OS error with the failing
    /// primitive.
    ///
    /// ```rust
    /// use channelfs_core::ChannelError;
    ///
    /// let result: Result<std::fs::File, ChannelError> =
    ///     std::fs::File::open("/definitely/not/here").map_err(ChannelError::io("open"));
    /// assert!(result.unwrap_err().to_string().starts_with("open failed"));
    /// ```
    pub fn io(operation: &'static str) -> impl FnOnce(io::Error) -> ChannelError {
        move |source| ChannelError::Io { operation, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::Locator(_) => ErrorKind::Locator,
            ChannelError::UnknownScheme { .. } => ErrorKind::UnknownScheme,
            ChannelError::UndefinedMode | ChannelError::BadMode { .. } => ErrorKind::Mode,
            ChannelError::BadFlags { .. } => ErrorKind::Flags,
            ChannelError::MissingOption { .. } => ErrorKind::MissingOption,
            ChannelError::OutOfRange { .. } => ErrorKind::OutOfRange,
            ChannelError::AccessViolation { .. } => ErrorKind::Access,
            ChannelError::Io { .. } => ErrorKind::Io,
            ChannelError::SocketRead(_) | ChannelError::SocketWrite(_) => ErrorKind::Socket,
            ChannelError::ShortWrite { .. } => ErrorKind::ShortWrite,
            ChannelError::Timeout { .. } => ErrorKind::Timeout,
            ChannelError::Seek(_) | ChannelError::SeekOutOfRange { .. } => ErrorKind::Seek,
            ChannelError::PushbackOverflow { .. } | ChannelError::UngetBeyondRead { .. } => {
                ErrorKind::Pushback
            }
            ChannelError::Unsupported { .. } => ErrorKind::Unsupported,
        }
    }

    /// The OS error code, when the failure came from the OS.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ChannelError::Io { source, .. }
            | ChannelError::SocketRead(source)
            | ChannelError::SocketWrite(source)
            | ChannelError::Seek(source) => source.raw_os_error(),
            _ => None,
        }
    }
}

impl From<ChannelError> for io::Error {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Io { source, .. }
            | ChannelError::SocketRead(source)
            | ChannelError::SocketWrite(source)
            | ChannelError::Seek(source) => source,
            other => {
                let kind = match other.kind() {
                    ErrorKind::Timeout => io::ErrorKind::TimedOut,
                    ErrorKind::Unsupported => io::ErrorKind::Unsupported,
                    ErrorKind::Access => io::ErrorKind::PermissionDenied,
                    ErrorKind::ShortWrite => io::ErrorKind::WriteZero,
                    ErrorKind::Seek | ErrorKind::OutOfRange | ErrorKind::Locator => {
                        io::ErrorKind::InvalidInput
                    }
                    _ => io::ErrorKind::Other,
                };
                io::Error::new(kind, other)
            }
        }
    }
}
