//! channelfs: one read/write/seek interface over files, memory, shared
//! memory and sockets.
//!
//! A [`Channel`] is opened from a locator such as `File:///tmp/x`,
//! `Shm://frames:4096` or `ServerTcp://5000 reuseAddr = 1`. The scheme picks
//! a plugin from the [`Registry`]; everything after it tells the plugin what
//! to open.
//!
//! # Example
//!
//! ```rust
//! use channelfs::{Mode, Permissions, Whence};
//!
//! let mut channel = channelfs::open("Mem://32", Mode::empty(), Permissions::empty()).unwrap();
//! channel.puts("peek").unwrap();
//! channel.seek(0, Whence::Start).unwrap();
//!
//! let first = channel.getc().unwrap().unwrap();
//! channel.unget(&[first]).unwrap();
//! assert_eq!(channel.gets(4).unwrap(), b"peek");
//! ```

use std::sync::OnceLock;

pub use channelfs_core::{
    Access, Backend, Channel, ChannelConfig, ChannelError, ErrorKind, Locator, LocatorError, Mode,
    OpenRequest, Opened, Options, Permissions, Phase, Plugin, Property, Registry, Reposition,
    Transfer, Whence, WriteBufferConfig,
};
pub use channelfs_plugins::default_registry;

/// Backends for building custom plugins.
pub mod generic {
    pub use channelfs_generic::*;
}

/// The built-in schemes.
pub mod plugins {
    pub use channelfs_plugins::*;
}

/// The process-wide registry with every built-in scheme.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(default_registry)
}

/// Open a locator with the built-in schemes.
///
/// The channel takes its configuration from the environment (see
/// [`ChannelConfig::from_env`]).
pub fn open(locator: &str, mode: Mode, permissions: Permissions) -> Result<Channel, ChannelError> {
    let mut channel = Channel::with_config(&ChannelConfig::from_env());
    channel.open(registry(), locator, mode, permissions)?;
    Ok(channel)
}

/// Open an option string such as `stream = File name = /tmp/x mode = READ_ONLY`
/// with the built-in schemes.
pub fn open_from_string(description: &str) -> Result<Channel, ChannelError> {
    let mut channel = Channel::with_config(&ChannelConfig::from_env());
    channel.open_from_string(registry(), description)?;
    Ok(channel)
}
