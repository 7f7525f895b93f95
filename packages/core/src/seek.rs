//! The pushback-aware seek algorithm.
//!
//! There is exactly one implementation for every medium. The only thing that
//! differs between media is whether [`Backend::repositioner`] hands out a
//! [`Reposition`] capability:
//!
//! - `Start`/`End`: repositioning media move there and drop the pushback;
//!   stream media accept the request as a no-op that drops the pushback.
//! - `Current` with offset 0: a pure position query, no backend call.
//! - `Current` backwards: served from retired pushback bytes when possible,
//!   otherwise the reduced offset goes to the medium.
//! - `Current` forwards: served by skipping held pushback bytes when
//!   possible, otherwise the remainder goes to the medium.
//!
//! Failures leave the position untouched.

use std::fmt;
use std::io::SeekFrom;

use crate::{Backend, ChannelError, Pushback};

/// Reference point of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    /// Split a [`SeekFrom`] into an offset and a reference point.
    ///
    /// Start offsets beyond `i64::MAX` are out of range.
    pub fn from_seek_from(pos: SeekFrom) -> Result<(i64, Whence), ChannelError> {
        match pos {
            SeekFrom::Start(offset) => i64::try_from(offset)
                .map(|offset| (offset, Whence::Start))
                .map_err(|_| ChannelError::OutOfRange {
                    what: "seek offset",
                    value: offset.to_string(),
                }),
            SeekFrom::Current(offset) => Ok((offset, Whence::Current)),
            SeekFrom::End(offset) => Ok((offset, Whence::End)),
        }
    }
}

impl fmt::Display for Whence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Whence::Start => write!(f, "start"),
            Whence::Current => write!(f, "current position"),
            Whence::End => write!(f, "end"),
        }
    }
}

/// Backend-side bookkeeping of a channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    /// Bytes consumed from (or committed to) the medium.
    pub(crate) offset: u64,
    /// Bytes handed to the caller since the last write or absolute seek.
    pub(crate) read_since_write: u64,
}

impl Cursor {
    /// The caller-visible position.
    pub(crate) fn position<S: AsRef<[u8]> + AsMut<[u8]>>(&self, pushback: &Pushback<S>) -> u64 {
        self.offset.saturating_sub(pushback.len() as u64)
    }
}

/// Seek a channel, returning the new caller-visible position.
pub(crate) fn seek<S: AsRef<[u8]> + AsMut<[u8]>>(
    pushback: &mut Pushback<S>,
    cursor: &mut Cursor,
    backend: &mut dyn Backend,
    offset: i64,
    whence: Whence,
) -> Result<u64, ChannelError> {
    let out_of_range = || ChannelError::SeekOutOfRange { offset, whence };

    match whence {
        Whence::Start | Whence::End => {
            let target = match whence {
                Whence::Start if offset < 0 => return Err(out_of_range()),
                Whence::Start => SeekFrom::Start(offset as u64),
                _ => SeekFrom::End(offset),
            };

            match backend.repositioner() {
                Some(medium) => {
                    cursor.offset = medium.reposition(target)?;
                }
                None => {
                    log::debug!(
                        "seek of {} from {} on a stream medium only drops the pushback",
                        offset,
                        whence
                    );
                }
            }
            pushback.clear();
            cursor.read_since_write = 0;
        }

        Whence::Current if offset == 0 => {}

        Whence::Current if offset < 0 => {
            let back = offset.unsigned_abs();
            if back <= pushback.retired() as u64 {
                pushback.rewind(back as usize);
                cursor.read_since_write = cursor.read_since_write.saturating_sub(back);
            } else if let Some(medium) = backend.repositioner() {
                let reduced = offset
                    .checked_sub(pushback.len() as i64)
                    .ok_or_else(out_of_range)?;
                cursor.offset = medium.reposition(SeekFrom::Current(reduced))?;
                pushback.clear();
            } else {
                return Err(out_of_range());
            }
        }

        Whence::Current => {
            let forward = offset as u64;
            let held = pushback.len() as u64;
            if forward < held {
                pushback.skip(forward as usize);
                cursor.read_since_write += forward;
            } else {
                let remainder = forward - held;
                if remainder == 0 {
                    pushback.clear();
                } else if let Some(medium) = backend.repositioner() {
                    cursor.offset = medium.reposition(SeekFrom::Current(remainder as i64))?;
                    pushback.clear();
                } else {
                    return Err(out_of_range());
                }
            }
        }
    }

    let position = cursor.position(pushback);
    cursor.read_since_write = cursor.read_since_write.min(position);
    Ok(position)
}
