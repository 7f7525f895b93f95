//! Option lookups shared by the plugins.

use std::time::Duration;

use channelfs_core::{ChannelError, Options};
use channelfs_locator::parse_number;

/// Split `left:right` at the last colon.
pub(crate) fn split_pair<'a>(
    payload: &'a str,
    what: &'static str,
) -> Result<(&'a str, &'a str), ChannelError> {
    payload
        .rsplit_once(':')
        .filter(|(left, right)| !left.is_empty() && !right.is_empty())
        .ok_or_else(|| ChannelError::OutOfRange {
            what,
            value: payload.to_string(),
        })
}

/// Whether `text` is a numeric literal.
pub(crate) fn is_number(text: &str) -> bool {
    parse_number(text).is_ok()
}

pub(crate) fn required<'a>(
    options: &'a Options,
    option: &'static str,
) -> Result<&'a str, ChannelError> {
    options
        .get(option)
        .ok_or(ChannelError::MissingOption { option })
}

pub(crate) fn required_number(options: &Options, option: &'static str) -> Result<i64, ChannelError> {
    options
        .get_number(option)?
        .ok_or(ChannelError::MissingOption { option })
}

pub(crate) fn positive(options: &Options, option: &'static str) -> Result<i64, ChannelError> {
    let value = required_number(options, option)?;
    if value <= 0 {
        return Err(ChannelError::OutOfRange {
            what: option,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// A port in `1..=65535`.
pub(crate) fn port(options: &Options, option: &'static str) -> Result<u16, ChannelError> {
    let value = required_number(options, option)?;
    u16::try_from(value)
        .ok()
        .filter(|&port| port != 0)
        .ok_or_else(|| ChannelError::OutOfRange {
            what: "port",
            value: value.to_string(),
        })
}

/// An optional local port; absent or 0 lets the OS choose.
pub(crate) fn local_port(options: &Options, option: &'static str) -> Result<u16, ChannelError> {
    match options.get_number(option)? {
        None => Ok(0),
        Some(value) => u16::try_from(value).map_err(|_| ChannelError::OutOfRange {
            what: "port",
            value: value.to_string(),
        }),
    }
}

/// A microsecond timeout. Absent gives `default`; 0 means no timeout.
pub(crate) fn micros_or(
    options: &Options,
    option: &'static str,
    default: Option<Duration>,
) -> Result<Option<Duration>, ChannelError> {
    match options.get_number(option)? {
        None => Ok(default),
        Some(us) if us < 0 => Err(ChannelError::OutOfRange {
            what: option,
            value: us.to_string(),
        }),
        Some(us) => Ok(channelfs_generic::micros(us)),
    }
}

/// Linger time in seconds, if given.
pub(crate) fn linger(options: &Options, option: &'static str) -> Result<Option<i32>, ChannelError> {
    match options.get_number(option)? {
        None => Ok(None),
        Some(seconds) => i32::try_from(seconds)
            .ok()
            .filter(|&s| s >= 0)
            .map(Some)
            .ok_or_else(|| ChannelError::OutOfRange {
                what: option,
                value: seconds.to_string(),
            }),
    }
}

pub(crate) fn flag(options: &Options, option: &'static str) -> Result<bool, ChannelError> {
    Ok(options.get_bool(option)?.unwrap_or(false))
}
