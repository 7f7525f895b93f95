//! Core of channelfs: the [`Channel`] handle and the [`Backend`] contract.
//!
//! A channel is one read/write/seek/close surface over very different media.
//! Each medium is a [`Backend`]; each locator scheme is a [`Plugin`] that
//! opens backends, found through a [`Registry`]. The channel owns what is
//! common to every medium:
//!
//! - the lifecycle ([`Phase`]) and access mode ([`Mode`])
//! - a caller-supplied pushback buffer for `unget`
//! - the single seek algorithm, which serves relative seeks from the
//!   pushback buffer and only asks the backend to reposition when it can
//! - optional write coalescing ([`WriteBuffer`])
//! - the last error and the byte counters
//!
//! # Example
//!
//! ```rust
//! use channelfs_core::{Backend, Channel, ChannelError, Mode, Transfer};
//!
//! struct Zeros;
//!
//! impl Backend for Zeros {
//!     fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError> {
//!         buf.fill(0);
//!         Ok(Transfer::new(buf.len()))
//!     }
//!     fn write(&mut self, _buf: &[u8]) -> Result<Transfer, ChannelError> {
//!         Ok(Transfer::new(0))
//!     }
//!     fn close(&mut self) -> Result<(), ChannelError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut channel = Channel::new();
//! channel.open_backend("Zeros", Box::new(Zeros), Mode::READ_ONLY).unwrap();
//!
//! let mut buf = [1u8; 4];
//! assert_eq!(channel.read(&mut buf).unwrap(), 4);
//! channel.unget(&buf[2..]).unwrap();
//! assert_eq!(channel.tell().unwrap(), 2);
//! channel.close().unwrap();
//! ```

mod backend;
mod channel;
mod config;
mod error;
mod mode;
mod plugin;
mod pushback;
mod seek;
mod write_buffer;

#[cfg(test)]
mod testing;

pub use backend::{Backend, Property, Reposition, Transfer};
pub use channel::{Channel, Phase};
pub use config::ChannelConfig;
pub use error::{ChannelError, ErrorKind};
pub use mode::{Access, Mode, Permissions};
pub use plugin::{OpenRequest, Opened, Plugin, Registry};
pub use pushback::Pushback;
pub use seek::Whence;
pub use write_buffer::{WriteBuffer, WriteBufferConfig};

pub use channelfs_locator::{Locator, LocatorError, Options};
