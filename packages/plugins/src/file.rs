//! Schemes over OS descriptors: `File`, `BufFile`, `Fd` and the standard
//! streams.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::RawFd;

use channelfs_core::{
    Access, Backend, ChannelError, Mode, OpenRequest, Options, Permissions, Plugin,
};
use channelfs_generic::{BufferedDescriptor, Descriptor};

use crate::args;

/// Permissions of files created without explicit ones.
const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;

fn name_option(payload: &str) -> Options {
    let mut options = Options::new();
    if !payload.is_empty() {
        options.push("name", payload);
    }
    options
}

fn fd_option(payload: &str) -> Options {
    let mut options = Options::new();
    if !payload.is_empty() {
        options.push("fd", payload);
    }
    options
}

/// Open `path` with OS flags matching the channel mode.
pub(crate) fn open_file(
    path: &str,
    mode: Mode,
    permissions: Permissions,
) -> Result<File, ChannelError> {
    let access = mode.access()?;
    if mode.contains(Mode::CREATE) && access == Access::Read {
        return Err(ChannelError::BadFlags {
            message: "CREATE needs write access".to_string(),
        });
    }

    let mut flags = OpenOptions::new();
    flags
        .read(access != Access::Write)
        .write(access != Access::Read)
        .create(mode.contains(Mode::CREATE))
        .truncate(mode.contains(Mode::TRUNCATE))
        .append(mode.contains(Mode::APPEND))
        .mode(
            permissions
                .or(Permissions::from_bits_truncate(DEFAULT_FILE_PERMISSIONS))
                .bits(),
        );

    let mut file = flags.open(path).map_err(|e| {
        log::debug!("opening '{}' with {:?} failed: {}", path, mode, e);
        ChannelError::io("open")(e)
    })?;

    // appended bytes land at the end, so the position starts there too
    if mode.contains(Mode::APPEND) {
        file.seek(SeekFrom::End(0)).map_err(ChannelError::Seek)?;
    }
    Ok(file)
}

fn fd_number(options: &Options) -> Result<RawFd, ChannelError> {
    let fd = args::required_number(options, "fd")?;
    RawFd::try_from(fd)
        .ok()
        .filter(|&fd| fd >= 0)
        .ok_or_else(|| ChannelError::io("fcntl")(std::io::Error::from_raw_os_error(libc::EBADF)))
}

/// `File://path`: an unbuffered file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilePlugin;

impl Plugin for FilePlugin {
    fn scheme(&self) -> &'static str {
        "File"
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        Ok(name_option(payload))
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        let path = args::required(request.options, "name")?;
        let file = open_file(path, request.mode, request.permissions)?;
        Ok(Box::new(Descriptor::new(file)))
    }
}

/// `BufFile://path` or `BufFile:// fd = N`: a file with user-space buffers.
///
/// A descriptor given with `fd` belongs to the caller and is only flushed,
/// never closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufFilePlugin;

impl Plugin for BufFilePlugin {
    fn scheme(&self) -> &'static str {
        "BufFile"
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        Ok(name_option(payload))
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        let options = request.options;
        match (options.get("name"), options.contains("fd")) {
            (Some(_), true) => Err(ChannelError::BadFlags {
                message: "name and fd are mutually exclusive".to_string(),
            }),
            (Some(path), false) => {
                let file = open_file(path, request.mode, request.permissions)?;
                Ok(Box::new(BufferedDescriptor::new(file, true)))
            }
            (None, true) => {
                let fd = fd_number(options)?;
                Ok(Box::new(BufferedDescriptor::from_raw_fd(fd, false)?))
            }
            (None, false) => Err(ChannelError::MissingOption { option: "name" }),
        }
    }
}

/// `Fd://N`: an already open descriptor, closed with the channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct FdPlugin;

impl Plugin for FdPlugin {
    fn scheme(&self) -> &'static str {
        "Fd"
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        Ok(fd_option(payload))
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        let fd = fd_number(request.options)?;
        Ok(Box::new(Descriptor::from_raw_fd(fd, true)?))
    }
}

/// `StdIn://`, `StdOut://` and `StdErr://`: the process's standard streams.
///
/// Each allows only its natural access mode and is never closed.
#[derive(Debug, Clone, Copy)]
pub struct StdStreamPlugin {
    scheme: &'static str,
    fd: RawFd,
    access: Mode,
}

impl StdStreamPlugin {
    pub fn stdin() -> Self {
        Self {
            scheme: "StdIn",
            fd: libc::STDIN_FILENO,
            access: Mode::READ_ONLY,
        }
    }

    pub fn stdout() -> Self {
        Self {
            scheme: "StdOut",
            fd: libc::STDOUT_FILENO,
            access: Mode::WRITE_ONLY,
        }
    }

    pub fn stderr() -> Self {
        Self {
            scheme: "StdErr",
            fd: libc::STDERR_FILENO,
            access: Mode::WRITE_ONLY,
        }
    }
}

impl Plugin for StdStreamPlugin {
    fn scheme(&self) -> &'static str {
        self.scheme
    }

    fn default_mode(&self) -> Option<Mode> {
        Some(self.access)
    }

    fn payload_options(&self, _payload: &str) -> Result<Options, ChannelError> {
        Ok(Options::new())
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        if request.mode & Mode::ACCESS_MASK != self.access {
            return Err(ChannelError::BadMode {
                message: format!("{} only opens as {:?}", self.scheme, self.access),
            });
        }
        Ok(Box::new(Descriptor::from_raw_fd(self.fd, false)?))
    }
}
