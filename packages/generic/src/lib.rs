//! Backends shared by channelfs plugins.
//!
//! Three families cover every medium the plugins open:
//!
//! - **Descriptors**: [`Descriptor`] reads and writes an OS descriptor
//!   directly; [`BufferedDescriptor`] adds stdio-style buffers. Only regular
//!   files can reposition.
//! - **Memory**: [`Memory`] does bounds-checked transfers over any
//!   [`Region`]: an owned `Vec<u8>`, a descriptor [`Mapping`], a POSIX named
//!   shared-memory object ([`map_named`]) or a System V segment
//!   ([`SysvSegment`]). Regions are released exactly once.
//! - **Sockets**: [`SocketStream`] over any [`SocketIo`]. Errors in the
//!   peer-gone catalogue ([`is_peer_gone`]) end the stream instead of
//!   failing it. [`connect`] opens client sockets and [`serve`] runs a
//!   one-shot server that waits for a single client.
//!
//! # Example
//!
//! ```rust
//! use channelfs_core::{Channel, Mode, Whence};
//! use channelfs_generic::Memory;
//!
//! let mut channel = Channel::new();
//! channel
//!     .open_backend("Mem", Box::new(Memory::zeroed(8)), Mode::READ_WRITE)
//!     .unwrap();
//!
//! assert_eq!(channel.write(b"0123456789").unwrap(), 8);
//! assert_eq!(channel.seek(2, Whence::Start).unwrap(), 2);
//!
//! let mut buf = [0u8; 3];
//! channel.read(&mut buf).unwrap();
//! assert_eq!(&buf, b"234");
//! ```

mod buffered;
mod descriptor;
mod mapping;
mod memory;
mod net;
mod socket;

pub use buffered::BufferedDescriptor;
pub use descriptor::{is_valid_fd, Descriptor};
pub use mapping::{map_named, unlink_named, Mapping, SysvSegment};
pub use memory::{Memory, Region};
pub use net::{
    bind, connect, resolve, serve, set_linger, wait_readable, ConnectOptions, ServeOptions,
    SocketKind,
};
pub use socket::{is_peer_gone, micros, SocketIo, SocketStream, UdpPeer};
