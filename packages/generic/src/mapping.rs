//! Memory regions backed by the OS: descriptor mappings and shared memory.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::ptr::{self, NonNull};

use channelfs_core::{ChannelError, Mode, Permissions};

use crate::descriptor::close_fd;
use crate::memory::Region;

fn os_error(operation: &'static str) -> ChannelError {
    ChannelError::io(operation)(io::Error::last_os_error())
}

fn positive_size(size: i64) -> Result<usize, ChannelError> {
    usize::try_from(size)
        .ok()
        .filter(|&s| s > 0)
        .ok_or_else(|| ChannelError::OutOfRange {
            what: "mapping size",
            value: size.to_string(),
        })
}

/// `mmap` of a descriptor, shared with every other mapping of it.
///
/// Opening with `CREATE` or `TRUNCATE` empties the object and grows it to
/// the mapped length first. Releasing a writable mapping trims the object
/// to the channel's final position, then unmaps.
#[derive(Debug)]
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
    fd: RawFd,
    writable: bool,
    close_fd: bool,
}

// SAFETY: the mapping is exclusively owned and only reached through &self/&mut self.
unsafe impl Send for Mapping {}

impl Mapping {
    /// Map `size` bytes of `fd`. The descriptor stays open after release.
    pub fn map(fd: RawFd, size: i64, mode: Mode) -> Result<Self, ChannelError> {
        if fd < 0 {
            return Err(ChannelError::io("mmap")(io::Error::from_raw_os_error(
                libc::EBADF,
            )));
        }
        let len = positive_size(size)?;
        let access = mode.access()?;
        let writable = mode.can_write();

        if mode.intersects(Mode::CREATE | Mode::TRUNCATE) {
            if !writable {
                return Err(ChannelError::BadFlags {
                    message: format!("cannot create or truncate a read-only mapping ({:?})", access),
                });
            }
            Self::grow(fd, len)?;
        }

        let mut protection = libc::PROT_READ;
        if writable {
            protection |= libc::PROT_WRITE;
        }
        // SAFETY: fresh mapping; the kernel validates fd and length.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                protection,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(os_error("mmap"));
        }
        let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| os_error("mmap"))?;

        Ok(Self {
            ptr,
            len,
            fd,
            writable,
            close_fd: false,
        })
    }

    /// Close the descriptor too when the mapping is released.
    pub fn closing_fd(mut self) -> Self {
        self.close_fd = true;
        self
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Empty the object, then make it exactly `len` bytes long.
    fn grow(fd: RawFd, len: usize) -> Result<(), ChannelError> {
        // SAFETY: plain syscalls on a caller-supplied descriptor.
        unsafe {
            if libc::ftruncate(fd, 0) == -1 {
                return Err(os_error("ftruncate"));
            }
            if libc::lseek(fd, (len - 1) as libc::off_t, libc::SEEK_SET) == -1 {
                return Err(os_error("lseek"));
            }
            if libc::write(fd, b"\0".as_ptr().cast(), 1) == -1 {
                return Err(os_error("write"));
            }
        }
        Ok(())
    }
}

impl Region for Mapping {
    fn bytes(&self) -> &[u8] {
        // SAFETY: ptr maps len bytes until release.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; Memory only writes when the mapping is writable.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn release(&mut self, position: u64) -> Result<(), ChannelError> {
        let trimmed = if self.writable {
            // SAFETY: fd was valid at map time; failure is reported.
            match unsafe { libc::ftruncate(self.fd, position as libc::off_t) } {
                -1 => Err(os_error("ftruncate")),
                _ => Ok(()),
            }
        } else {
            Ok(())
        };
        // SAFETY: ptr/len come from a successful mmap and are unmapped once.
        let unmapped = match unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } {
            -1 => Err(os_error("munmap")),
            _ => Ok(()),
        };
        let closed = if self.close_fd {
            close_fd(self.fd)
        } else {
            Ok(())
        };
        trimmed.and(unmapped).and(closed)
    }
}

/// A System V shared-memory segment attached with `shmat`.
#[derive(Debug)]
pub struct SysvSegment {
    ptr: NonNull<u8>,
    len: usize,
    id: libc::c_int,
}

// SAFETY: see Mapping.
unsafe impl Send for SysvSegment {}

impl SysvSegment {
    /// Attach the segment for `key`, creating it with `CREATE` or `TRUNCATE`.
    pub fn attach(
        key: i64,
        size: i64,
        mode: Mode,
        permissions: Permissions,
    ) -> Result<Self, ChannelError> {
        let len = positive_size(size)?;
        mode.access()?;

        let mut flags = permissions.bits() as libc::c_int;
        if mode.intersects(Mode::CREATE | Mode::TRUNCATE) {
            flags |= libc::IPC_CREAT;
        }
        // SAFETY: plain syscall.
        let id = unsafe { libc::shmget(key as libc::key_t, len, flags) };
        if id == -1 {
            return Err(os_error("shmget"));
        }

        // write-only is emulated with a read-write attachment
        let at_flags = if mode.can_write() { 0 } else { libc::SHM_RDONLY };
        // SAFETY: id names an existing segment.
        let addr = unsafe { libc::shmat(id, ptr::null(), at_flags) };
        if addr as isize == -1 {
            return Err(os_error("shmat"));
        }
        let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| os_error("shmat"))?;
        Ok(Self { ptr, len, id })
    }

    pub fn id(&self) -> libc::c_int {
        self.id
    }
}

impl Region for SysvSegment {
    fn bytes(&self) -> &[u8] {
        // SAFETY: the segment stays attached until release.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn release(&mut self, _position: u64) -> Result<(), ChannelError> {
        // SAFETY: ptr comes from shmat and is detached once.
        if unsafe { libc::shmdt(self.ptr.as_ptr().cast()) } == -1 {
            return Err(os_error("shmdt"));
        }
        Ok(())
    }
}

/// Open a POSIX named shared-memory object and map it.
///
/// A leading `/` is added to `name` when missing. The object's descriptor is
/// closed when the mapping is released.
pub fn map_named(
    name: &str,
    size: i64,
    mode: Mode,
    permissions: Permissions,
) -> Result<Mapping, ChannelError> {
    let name = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    };
    let c_name = CString::new(name.as_str()).map_err(|_| ChannelError::OutOfRange {
        what: "shared memory name",
        value: name.clone(),
    })?;

    let mut flags = if mode.can_write() {
        libc::O_RDWR
    } else {
        libc::O_RDONLY
    };
    if mode.contains(Mode::CREATE) {
        flags |= libc::O_CREAT;
    }
    if mode.contains(Mode::TRUNCATE) {
        flags |= libc::O_TRUNC;
    }

    // SAFETY: c_name is NUL-terminated.
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, permissions.bits() as libc::c_uint) };
    if fd == -1 {
        log::warn!(
            "shared memory object '{}' does not exist or mode/permissions are wrong",
            name
        );
        return Err(os_error("shm_open"));
    }

    match Mapping::map(fd, size, mode) {
        Ok(mapping) => Ok(mapping.closing_fd()),
        Err(e) => {
            let _ = close_fd(fd);
            Err(e)
        }
    }
}

/// Remove a POSIX named shared-memory object.
pub fn unlink_named(name: &str) -> Result<(), ChannelError> {
    let name = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    };
    let c_name = CString::new(name.as_str()).map_err(|_| ChannelError::OutOfRange {
        what: "shared memory name",
        value: name.clone(),
    })?;
    // SAFETY: c_name is NUL-terminated.
    if unsafe { libc::shm_unlink(c_name.as_ptr()) } == -1 {
        return Err(os_error("shm_unlink"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use channelfs_core::{Backend, Reposition};
    use std::io::{Read, Seek, SeekFrom};
    use std::os::unix::io::AsRawFd;

    #[test]
    fn create_grows_then_release_trims() {
        let mut file = tempfile::tempfile().unwrap();
        let mapping = Mapping::map(
            file.as_raw_fd(),
            64,
            Mode::READ_WRITE | Mode::CREATE,
        )
        .unwrap();
        assert_eq!(file.metadata().unwrap().len(), 64);

        let mut memory = Memory::new(mapping, true);
        memory.write(b"mapped").unwrap();
        memory.close().unwrap();

        assert_eq!(file.metadata().unwrap().len(), 6);
        let mut text = String::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_string(&mut text).unwrap();
        assert_eq!(text, "mapped");
    }

    #[test]
    fn read_only_mapping_keeps_length() {
        let file = tempfile::tempfile().unwrap();
        file.set_len(16).unwrap();
        let mapping = Mapping::map(file.as_raw_fd(), 16, Mode::READ_ONLY).unwrap();

        let mut memory = Memory::new(mapping, false);
        memory.reposition(SeekFrom::End(-1)).unwrap();
        memory.close().unwrap();
        assert_eq!(file.metadata().unwrap().len(), 16);
    }

    #[test]
    fn bad_arguments_fail() {
        let file = tempfile::tempfile().unwrap();
        let err = Mapping::map(-1, 8, Mode::READ_ONLY).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));

        let err = Mapping::map(file.as_raw_fd(), 0, Mode::READ_WRITE).unwrap_err();
        assert!(matches!(err, ChannelError::OutOfRange { .. }));

        let err = Mapping::map(file.as_raw_fd(), 8, Mode::READ_ONLY | Mode::CREATE).unwrap_err();
        assert!(matches!(err, ChannelError::BadFlags { .. }));
    }

    #[test]
    fn named_shared_memory_round_trip() {
        let name = format!("channelfs-test-{}", std::process::id());
        let writer = map_named(
            &name,
            32,
            Mode::READ_WRITE | Mode::CREATE,
            Permissions::USER_READ | Permissions::USER_WRITE,
        )
        .unwrap();
        let mut writer = Memory::new(writer, true);
        writer.write(b"shared").unwrap();

        let reader = map_named(&name, 32, Mode::READ_ONLY, Permissions::empty()).unwrap();
        let mut reader = Memory::new(reader, false);
        let mut buf = [0u8; 6];
        reader.read(&mut buf).unwrap();
        assert_eq!(&buf, b"shared");

        reader.close().unwrap();
        writer.close().unwrap();
        unlink_named(&name).unwrap();
    }
}
