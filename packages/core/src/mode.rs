//! Access modes and creation permissions.

use bitflags::bitflags;
use channelfs_locator::{evaluate_flags, LocatorError};

use crate::ChannelError;

bitflags! {
    /// How a channel is opened.
    ///
    /// Exactly one of `READ_ONLY`, `WRITE_ONLY` and `READ_WRITE` must be set
    /// once a channel is open. The remaining bits are independent flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mode: u32 {
        const READ_ONLY = 1 << 0;
        const WRITE_ONLY = 1 << 1;
        const READ_WRITE = 1 << 2;
        const CREATE = 1 << 3;
        const TRUNCATE = 1 << 4;
        const APPEND = 1 << 5;
        /// Release OS resources on close (the default behaviour).
        const CLOSE = 1 << 30;
        /// Leave OS resources alive on close.
        const NOT_CLOSE = 1 << 31;
    }
}

bitflags! {
    /// Creation permissions, using Unix permission bit values.
    ///
    /// Only meaningful for media with an access-control concept such as
    /// files and named shared memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        const USER_READ = 0o400;
        const USER_WRITE = 0o200;
        const USER_EXEC = 0o100;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC = 0o010;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC = 0o001;
        const ALL = 0o777;
    }
}

/// The single access mode of an open channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Mode {
    /// All access-mode bits.
    pub const ACCESS_MASK: Mode = Mode::READ_ONLY
        .union(Mode::WRITE_ONLY)
        .union(Mode::READ_WRITE);

    /// Evaluate a flag expression such as `'WRITE_ONLY | CREATE | TRUNCATE'`.
    ///
    /// Symbols are the flag names of this type; numeric literals are raw
    /// bits. Operators apply strictly left to right.
    pub fn from_expression(expression: &str) -> Result<Mode, LocatorError> {
        let bits = evaluate_flags(expression, |name| {
            Mode::from_name(name).map(|m| u64::from(m.bits()))
        })?;
        Ok(Mode::from_bits_truncate(bits as u32))
    }

    /// Whether any access-mode bit is set.
    pub fn is_defined(self) -> bool {
        self.intersects(Self::ACCESS_MASK)
    }

    /// The access mode, if exactly one is set.
    pub fn access(self) -> Result<Access, ChannelError> {
        let access = self & Self::ACCESS_MASK;
        if access == Mode::READ_ONLY {
            Ok(Access::Read)
        } else if access == Mode::WRITE_ONLY {
            Ok(Access::Write)
        } else if access == Mode::READ_WRITE {
            Ok(Access::ReadWrite)
        } else if access.is_empty() {
            Err(ChannelError::UndefinedMode)
        } else {
            Err(ChannelError::BadMode {
                message: format!("more than one access mode in {:?}", access),
            })
        }
    }

    /// Check that the mode is usable for an open channel.
    pub fn validate(self) -> Result<Access, ChannelError> {
        let access = self.access()?;
        if self.contains(Mode::CLOSE | Mode::NOT_CLOSE) {
            return Err(ChannelError::BadFlags {
                message: "CLOSE and NOT_CLOSE are mutually exclusive".to_string(),
            });
        }
        if access == Access::Read && self.intersects(Mode::TRUNCATE | Mode::APPEND) {
            return Err(ChannelError::BadFlags {
                message: "TRUNCATE and APPEND need write access".to_string(),
            });
        }
        Ok(access)
    }

    pub fn can_read(self) -> bool {
        self.intersects(Mode::READ_ONLY | Mode::READ_WRITE)
    }

    pub fn can_write(self) -> bool {
        self.intersects(Mode::WRITE_ONLY | Mode::READ_WRITE)
    }

    /// Whether closing should leave OS resources alive.
    pub fn keeps_open(self) -> bool {
        self.contains(Mode::NOT_CLOSE)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::empty()
    }
}

impl Permissions {
    /// Evaluate a flag expression such as `'USER_READ | USER_WRITE'` or `0644`.
    pub fn from_expression(expression: &str) -> Result<Permissions, LocatorError> {
        let bits = evaluate_flags(expression, |name| {
            Permissions::from_name(name).map(|p| u64::from(p.bits()))
        })?;
        Ok(Permissions::from_bits_truncate(bits as u32))
    }

    /// The permissions, or `fallback` when none were given.
    pub fn or(self, fallback: Permissions) -> Permissions {
        if self.is_empty() {
            fallback
        } else {
            self
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_works() {
        assert_eq!(Mode::READ_ONLY.access().unwrap(), Access::Read);
        assert_eq!(
            (Mode::WRITE_ONLY | Mode::CREATE).access().unwrap(),
            Access::Write
        );
        assert_eq!(Mode::READ_WRITE.access().unwrap(), Access::ReadWrite);
        assert!(matches!(
            Mode::CREATE.access(),
            Err(ChannelError::UndefinedMode)
        ));
        assert!(matches!(
            (Mode::READ_ONLY | Mode::WRITE_ONLY).access(),
            Err(ChannelError::BadMode { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_flags() {
        assert!(matches!(
            (Mode::READ_WRITE | Mode::CLOSE | Mode::NOT_CLOSE).validate(),
            Err(ChannelError::BadFlags { .. })
        ));
        assert!(matches!(
            (Mode::READ_ONLY | Mode::TRUNCATE).validate(),
            Err(ChannelError::BadFlags { .. })
        ));
        assert!((Mode::READ_ONLY | Mode::NOT_CLOSE).validate().is_ok());
    }

    #[test]
    fn mode_expression_works() {
        let mode = Mode::from_expression("WRITE_ONLY | CREATE | TRUNCATE").unwrap();
        assert_eq!(mode, Mode::WRITE_ONLY | Mode::CREATE | Mode::TRUNCATE);
        assert!(mode.can_write());
        assert!(!mode.can_read());
        assert!(Mode::from_expression("WRITE_ONLY | SOMETIMES").is_err());
    }

    #[test]
    fn mode_expression_is_left_to_right() {
        // (READ_WRITE | CREATE) & CREATE
        let mode = Mode::from_expression("READ_WRITE | CREATE & CREATE").unwrap();
        assert_eq!(mode, Mode::CREATE);
    }

    #[test]
    fn permission_expression_works() {
        assert_eq!(
            Permissions::from_expression("USER_READ | USER_WRITE").unwrap().bits(),
            0o600
        );
        assert_eq!(Permissions::from_expression("0644").unwrap().bits(), 0o644);
        assert_eq!(
            Permissions::from_expression("ALL ^ OTHER_WRITE").unwrap().bits(),
            0o775
        );
    }

    #[test]
    fn permissions_or_falls_back() {
        assert_eq!(Permissions::empty().or(Permissions::ALL), Permissions::ALL);
        assert_eq!(
            Permissions::USER_READ.or(Permissions::ALL),
            Permissions::USER_READ
        );
    }
}
