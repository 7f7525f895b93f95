//! Reference/value option lists.
//!
//! An option list is a whitespace separated run of `reference = value`
//! tokens:
//!
//! ```text
//! stream = File name = '/tmp/my file' mode = 'READ_ONLY'
//! ```
//!
//! References match `[A-Za-z0-9$_]+`. Unquoted values are runs of
//! alphanumerics and `$ . / : _ -`. Single-quoted values may contain
//! anything except an unescaped closing quote (`\'` inserts a quote,
//! `\\` a backslash).

use std::fmt;
use std::str::FromStr;

use crate::flags::{evaluate_flags, parse_number};
use crate::LocatorError;

/// An ordered list of reference/value pairs.
///
/// Lookups are case-insensitive and return the first matching pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pairs: Vec<(String, String)>,
}

fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x0b)
}

fn is_reference_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'$' || c == b'_'
}

fn is_admitted_char(c: u8) -> bool {
    if c.is_ascii_alphanumeric() || matches!(c, b'$' | b'.' | b'/' | b':' | b'_' | b'-') {
        return true;
    }
    cfg!(windows) && c == b'\\'
}

impl Options {
    /// Create an empty option list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an option list.
    ///
    /// Parsing stops quietly at the first character that cannot start a
    /// reference; everything before it is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use channelfs_locator::Options;
    ///
    /// let options = Options::parse("port = 5000 reuseAddr=1 host='localhost'").unwrap();
    /// assert_eq!(options.get("PORT"), Some("5000"));
    /// assert_eq!(options.get("reuseaddr"), Some("1"));
    /// assert_eq!(options.get("host"), Some("localhost"));
    /// ```
    pub fn parse(input: &str) -> Result<Self, LocatorError> {
        let bytes = input.as_bytes();
        let mut pos = 0;
        let mut options = Options::new();

        loop {
            while pos < bytes.len() && is_space(bytes[pos]) {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }
            if !is_reference_char(bytes[pos]) {
                log::debug!(
                    "option list ends at position {} on {:?}",
                    pos,
                    &input[pos..]
                );
                break;
            }

            let start = pos;
            while pos < bytes.len() && is_reference_char(bytes[pos]) {
                pos += 1;
            }
            let reference = &input[start..pos];

            while pos < bytes.len() && is_space(bytes[pos]) {
                pos += 1;
            }
            if bytes.get(pos) != Some(&b'=') {
                return Err(LocatorError::MissingEquals {
                    reference: reference.to_string(),
                    position: pos,
                });
            }
            pos += 1;
            while pos < bytes.len() && is_space(bytes[pos]) {
                pos += 1;
            }

            let value = if bytes.get(pos) == Some(&b'\'') {
                let (value, next) = Self::quoted_value(input, pos, reference)?;
                pos = next;
                value
            } else {
                let start = pos;
                while pos < bytes.len() && is_admitted_char(bytes[pos]) {
                    pos += 1;
                }
                if start == pos {
                    return Err(LocatorError::EmptyValue {
                        reference: reference.to_string(),
                    });
                }
                input[start..pos].to_string()
            };

            options.push(reference, value);
        }

        Ok(options)
    }

    /// Read a single-quoted value starting at the opening quote.
    ///
    /// `\'` and `\\` stand for a quote and a backslash; any other backslash
    /// is kept as written. Returns the unescaped value and the position
    /// after the closing quote.
    fn quoted_value(
        input: &str,
        open: usize,
        reference: &str,
    ) -> Result<(String, usize), LocatorError> {
        let mut value = String::new();
        let mut chars = input[open + 1..].char_indices();

        while let Some((offset, c)) = chars.next() {
            match c {
                '\'' => return Ok((value, open + 1 + offset + 1)),
                '\\' => match chars.next() {
                    Some((_, '\'')) => value.push('\''),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => value.push('\\'),
                },
                _ => value.push(c),
            }
        }

        Err(LocatorError::UnterminatedQuote {
            reference: reference.to_string(),
            position: open,
        })
    }

    /// Append a pair. Earlier pairs win on lookup.
    pub fn push(&mut self, reference: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((reference.into(), value.into()));
    }

    /// Append every pair of `other`.
    pub fn extend(&mut self, other: Options) {
        self.pairs.extend(other.pairs);
    }

    /// Look up the value of a reference.
    pub fn get(&self, reference: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(reference))
            .map(|(_, value)| value.as_str())
    }

    /// Check whether a reference is present.
    pub fn contains(&self, reference: &str) -> bool {
        self.get(reference).is_some()
    }

    /// Look up a value and decode it as a numeric literal.
    pub fn get_number(&self, reference: &str) -> Result<Option<i64>, LocatorError> {
        self.get(reference).map(parse_number).transpose()
    }

    /// Look up a value and parse it with [`FromStr`].
    pub fn get_parsed<T: FromStr>(&self, reference: &str) -> Result<Option<T>, LocatorError> {
        self.get(reference)
            .map(|value| {
                value.parse::<T>().map_err(|_| LocatorError::InvalidValue {
                    reference: reference.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    /// Look up a boolean switch.
    ///
    /// `1`, `true`, `yes` and `on` are true, `0`, `false`, `no` and `off`
    /// are false (case-insensitive).
    pub fn get_bool(&self, reference: &str) -> Result<Option<bool>, LocatorError> {
        self.get(reference)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(LocatorError::InvalidValue {
                    reference: reference.to_string(),
                    value: value.to_string(),
                }),
            })
            .transpose()
    }

    /// Look up a value and evaluate it as a flag expression.
    pub fn get_flags<F>(&self, reference: &str, lookup: F) -> Result<Option<u64>, LocatorError>
    where
        F: Fn(&str) -> Option<u64>,
    {
        self.get(reference)
            .map(|value| evaluate_flags(value, lookup))
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate over `(reference, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(r, v)| (r.as_str(), v.as_str()))
    }
}

impl FromStr for Options {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Options::parse(s)
    }
}

impl fmt::Display for Options {
    /// Renders a list that [`Options::parse`] reads back unchanged.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (reference, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            if !value.is_empty() && value.bytes().all(is_admitted_char) {
                write!(f, "{}={}", reference, value)?;
            } else {
                let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
                write!(f, "{}='{}'", reference, escaped)?;
            }
        }
        Ok(())
    }
}

impl<R: Into<String>, V: Into<String>> FromIterator<(R, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (R, V)>>(iter: I) -> Self {
        Options {
            pairs: iter
                .into_iter()
                .map(|(r, v)| (r.into(), v.into()))
                .collect(),
        }
    }
}
