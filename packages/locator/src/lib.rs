//! Locator strings and option lists for channelfs.
//!
//! A channel is addressed by a locator such as `File:///tmp/data`,
//! `Udp://localhost:5000` or `ServerTcp://5000 reuseAddr = 1`. This crate
//! splits locators into scheme, payload and options, parses
//! `reference = value` option lists and evaluates the symbolic flag
//! expressions used for access modes and permissions.
//!
//! # Example
//!
//! ```rust
//! use channelfs_locator::{evaluate_flags, Locator, Options};
//!
//! let locator = Locator::parse("Shm://frames:4096 perm = 0600").unwrap();
//! assert_eq!(locator.scheme(), "Shm");
//! assert_eq!(locator.options().get_number("perm").unwrap(), Some(0o600));
//!
//! let options = Options::parse("stream = Rand name = Integers").unwrap();
//! assert_eq!(options.get("STREAM"), Some("Rand"));
//!
//! let bits = evaluate_flags("1 | 2 & 2", |_| None).unwrap();
//! assert_eq!(bits, 2);
//! ```

mod error;
mod flags;
mod locator;
mod options;

pub use error::LocatorError;
pub use flags::{evaluate_flags, parse_number};
pub use locator::Locator;
pub use options::Options;
