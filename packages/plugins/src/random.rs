//! `Rand://kind`: an endless read-only stream of random text tokens.
//!
//! Kinds:
//!
//! - `Integers` - non-negative 31-bit integers
//! - `Floats` - the same digits with one of them replaced by `.`
//! - `Chars` - byte values `0..255` in decimal
//! - `Printables` - single printable ASCII characters
//!
//! Tokens are separated by spaces. `seed = N` makes the stream repeatable.

use std::str::FromStr;

use channelfs_core::{Access, Backend, ChannelError, Mode, OpenRequest, Options, Plugin, Transfer};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bytes generated per refill.
const BUFFER_SIZE: usize = 120;
/// Widest token including its separator.
const TOKEN_WIDTH: usize = 11;

/// What the generator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandKind {
    Integers,
    Floats,
    Chars,
    Printables,
}

impl FromStr for RandKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        [
            ("integers", RandKind::Integers),
            ("floats", RandKind::Floats),
            ("chars", RandKind::Chars),
            ("printables", RandKind::Printables),
        ]
        .into_iter()
        .find(|(name, _)| lower.starts_with(name))
        .map(|(_, kind)| kind)
        .ok_or_else(|| ChannelError::OutOfRange {
            what: "random kind (Integers, Floats, Chars, Printables)",
            value: s.to_string(),
        })
    }
}

/// The generator behind a `Rand` channel.
pub struct RandStream {
    kind: RandKind,
    rng: StdRng,
    buffer: [u8; BUFFER_SIZE],
    index: usize,
}

impl RandStream {
    pub fn new(kind: RandKind, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            kind,
            rng,
            buffer: [b' '; BUFFER_SIZE],
            index: BUFFER_SIZE,
        }
    }

    fn token(&mut self) -> String {
        match self.kind {
            RandKind::Integers => self.rng.gen_range(0..=i32::MAX).to_string(),
            RandKind::Floats => {
                let mut digits = self.rng.gen_range(0..=i32::MAX).to_string().into_bytes();
                let dot = self.rng.gen_range(0..digits.len());
                digits[dot] = b'.';
                String::from_utf8_lossy(&digits).into_owned()
            }
            RandKind::Chars => self.rng.gen_range(0..255u32).to_string(),
            RandKind::Printables => char::from(self.rng.gen_range(33u8..126)).to_string(),
        }
    }

    fn refill(&mut self) {
        self.buffer.fill(b' ');
        let mut at = 0;
        for _ in 0..BUFFER_SIZE / TOKEN_WIDTH {
            let token = self.token();
            self.buffer[at..at + token.len()].copy_from_slice(token.as_bytes());
            at += token.len() + 1;
        }
        self.index = 0;
    }
}

impl Backend for RandStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<Transfer, ChannelError> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.index == BUFFER_SIZE {
                self.refill();
            }
            let count = (BUFFER_SIZE - self.index).min(buf.len() - filled);
            buf[filled..filled + count].copy_from_slice(&self.buffer[self.index..self.index + count]);
            self.index += count;
            filled += count;
        }
        Ok(Transfer::new(filled))
    }

    fn write(&mut self, _buf: &[u8]) -> Result<Transfer, ChannelError> {
        Err(ChannelError::Unsupported {
            operation: "writing",
            scheme: "Rand",
        })
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandPlugin;

impl Plugin for RandPlugin {
    fn scheme(&self) -> &'static str {
        "Rand"
    }

    fn default_mode(&self) -> Option<Mode> {
        Some(Mode::READ_ONLY)
    }

    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
        let mut options = Options::new();
        if !payload.is_empty() {
            options.push("name", payload);
        }
        Ok(options)
    }

    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
        if request.mode.access()? != Access::Read {
            return Err(ChannelError::BadMode {
                message: "Rand channels are read-only".to_string(),
            });
        }
        let kind: RandKind = request
            .options
            .get("name")
            .ok_or(ChannelError::MissingOption { option: "name" })?
            .parse()?;

        let seed = match request.options.get_number("seed")? {
            Some(seed) => Some(seed),
            None => request.options.get_number("key")?,
        };
        log::debug!("random {:?} stream, seed {:?}", kind, seed);
        Ok(Box::new(RandStream::new(kind, seed.map(|s| s as u64))))
    }
}
