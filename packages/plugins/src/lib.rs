//! # channelfs-plugins
//!
//! The schemes a channel can open, and [`default_registry`] holding all
//! of them.
//!
//! ## Schemes
//!
//! ```text
//! File://path              unbuffered file
//! BufFile://path           buffered file (or `fd = N`)
//! Fd://N                   existing descriptor
//! StdIn:// StdOut:// StdErr://
//! Null://                  discards writes, reads hit EOF
//! Calc://                  counts writes, keeps nothing
//! PipeCmd://command        a shell command's stdout or stdin
//! Mem://size               zeroed in-process buffer
//! MemMapFd://fd:size       mapping of an open descriptor
//! Shm://name:size          POSIX named shared memory
//! Shm://key:size           System V shared memory
//! Rand://Integers          random text tokens
//! Tcp://host:port          TCP client
//! Udp://host:port          UDP client
//! ServerTcp://port         one-shot TCP server
//! ServerUdp://port         one-shot UDP server
//! ```
//!
//! ## Example
//!
//! ```rust
//! use channelfs_core::{Channel, Mode, Permissions};
//!
//! let registry = channelfs_plugins::default_registry();
//! let mut channel = Channel::new();
//! channel
//!     .open(&registry, "Mem://16", Mode::empty(), Permissions::empty())
//!     .unwrap();
//! channel.puts("hello").unwrap();
//! channel.rewind().unwrap();
//! assert_eq!(channel.getc().unwrap(), Some(b'h'));
//! ```

mod args;
pub mod calc;
pub mod file;
pub mod memory;
pub mod net;
pub mod null;
pub mod pipe;
pub mod random;

use channelfs_core::Registry;

pub use calc::{CalcPlugin, WriteStats};
pub use file::{BufFilePlugin, FdPlugin, FilePlugin, StdStreamPlugin};
pub use memory::{MemMapFdPlugin, MemPlugin, ShmPlugin};
pub use net::{ClientPlugin, ServerPlugin};
pub use null::NullPlugin;
pub use pipe::{PipeCmdPlugin, PipeCommand};
pub use random::{RandKind, RandPlugin, RandStream};

/// A registry with every scheme of this crate.
pub fn default_registry() -> Registry {
    Registry::new()
        .with(FilePlugin)
        .with(BufFilePlugin)
        .with(FdPlugin)
        .with(StdStreamPlugin::stdin())
        .with(StdStreamPlugin::stdout())
        .with(StdStreamPlugin::stderr())
        .with(NullPlugin)
        .with(CalcPlugin)
        .with(PipeCmdPlugin)
        .with(MemPlugin)
        .with(MemMapFdPlugin)
        .with(ShmPlugin)
        .with(RandPlugin)
        .with(ClientPlugin::tcp())
        .with(ClientPlugin::udp())
        .with(ServerPlugin::tcp())
        .with(ServerPlugin::udp())
}
