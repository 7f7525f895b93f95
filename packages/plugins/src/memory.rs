//! Memory schemes: `Mem`, `MemMapFd` and `Shm`.

use std::os::unix::io::RawFd;

use channelfs_core::{
    Backend, ChannelError, Mode, OpenRequest, Options, Permissions, Plugin,
};
use channelfs_generic::{map_named, Mapping, Memory, SysvSegment};

use crate::args;

/// `Mem://size`: a zeroed buffer owned by the channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemPlugin;

impl Plugin for MemPlugin {
    fn scheme(&self) -> &'static str {
        "Mem"
    }

    fn default_mode(&self) -> Option<Mode> {
        Some(Mode::READ_WRITE)
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        let mut options = Options::new();
        if !payload.is_empty() {
            options.push("size", payload);
        }
        Ok(options)
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        let size = args::positive(request.options, "size")?;
        let size = usize::try_from(size).map_err(|_| ChannelError::OutOfRange {
            what: "size",
            value: size.to_string(),
        })?;
        Ok(Box::new(Memory::new(
            vec![0u8; size],
            request.mode.can_write(),
        )))
    }
}

/// `MemMapFd://fd:size`: map an open descriptor.
///
/// Needs an explicit access mode and permissions. With `CREATE` or
/// `TRUNCATE` the object is emptied and grown to `size` first; closing a
/// writable mapping trims the object to the final position.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemMapFdPlugin;

impl Plugin for MemMapFdPlugin {
    fn scheme(&self) -> &'static str {
        "MemMapFd"
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        let mut options = Options::new();
        if !payload.is_empty() {
            let (fd, size) = args::split_pair(payload, "fd:size payload")?;
            options.push("fd", fd);
            options.push("size", size);
        }
        Ok(options)
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        let options = request.options;
        let fd = args::required_number(options, "fd")?;
        let fd = RawFd::try_from(fd).unwrap_or(-1);
        let size = args::positive(options, "size")?;
        if request.permissions.is_empty() && !options.contains("perm") {
            log::warn!("no access permissions were given for the mapping");
            return Err(ChannelError::MissingOption { option: "perm" });
        }

        let mapping = Mapping::map(fd, size, request.mode)?;
        Ok(Box::new(Memory::new(mapping, request.mode.can_write())))
    }
}

/// `Shm://name:size` or `Shm://key:size`: shared memory.
///
/// A numeric first part is a System V key, anything else a POSIX object
/// name. `key` and `name` options are mutually exclusive. Permissions
/// default to [`Permissions::ALL`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ShmPlugin;

impl Plugin for ShmPlugin {
    fn scheme(&self) -> &'static str {
        "Shm"
    }

    fn default_mode(&self) -> Option<Mode> {
        Some(Mode::READ_WRITE)
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        let mut options = Options::new();
        if !payload.is_empty() {
            let (id, size) = args::split_pair(payload, "name:size payload")?;
            let reference = if args::is_number(id) { "key" } else { "name" };
            options.push(reference, id);
            options.push("size", size);
        }
        Ok(options)
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        let options = request.options;
        let size = args::positive(options, "size")?;
        let permissions = request.permissions.or(Permissions::ALL);
        let writable = request.mode.can_write();

        match (options.get("name"), options.get_number("key")?) {
            (Some(_), Some(_)) => {
                log::warn!("found both a name and a key for shared memory");
                Err(ChannelError::BadFlags {
                    message: "key and name are mutually exclusive".to_string(),
                })
            }
            (Some(name), None) => {
                let mapping = map_named(name, size, request.mode, permissions)?;
                Ok(Box::new(Memory::new(mapping, writable)))
            }
            (None, Some(key)) => {
                let segment = SysvSegment::attach(key, size, request.mode, permissions)?;
                Ok(Box::new(Memory::new(segment, writable)))
            }
            (None, None) => Err(ChannelError::MissingOption { option: "name" }),
        }
    }
}
