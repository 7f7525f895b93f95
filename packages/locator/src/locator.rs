//! Scheme-prefixed locator strings.

use std::fmt;
use std::str::FromStr;

use crate::{LocatorError, Options};

const SEPARATOR: &str = "://";

/// A parsed `scheme://payload [options]` locator.
///
/// The payload is the first whitespace-delimited token after `://`. Any
/// text after it is parsed as an [`Options`] list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    scheme: String,
    payload: String,
    options: Options,
}

impl Locator {
    /// Parse a locator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use channelfs_locator::Locator;
    ///
    /// let locator = Locator::parse("ServerTcp://5000 reuseAddr = 1").unwrap();
    /// assert_eq!(locator.scheme(), "ServerTcp");
    /// assert_eq!(locator.payload(), "5000");
    /// assert_eq!(locator.options().get("reuseaddr"), Some("1"));
    ///
    /// let file = Locator::parse("File:///tmp/x").unwrap();
    /// assert_eq!(file.payload(), "/tmp/x");
    /// ```
    pub fn parse(s: &str) -> Result<Self, LocatorError> {
        let (scheme, rest) =
            s.split_once(SEPARATOR)
                .ok_or_else(|| LocatorError::MissingSchemeSeparator {
                    locator: s.to_string(),
                })?;

        let scheme = scheme.trim_start();
        if scheme.is_empty()
            || !scheme
                .bytes()
                .all(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            return Err(LocatorError::InvalidScheme {
                scheme: scheme.to_string(),
            });
        }

        let end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let payload = &rest[..end];
        let options = Options::parse(&rest[end..])?;

        Ok(Locator {
            scheme: scheme.to_string(),
            payload: payload.to_string(),
            options,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Options appended after the payload.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Split into `(scheme, payload, options)`.
    pub fn into_parts(self) -> (String, String, Options) {
        (self.scheme, self.payload, self.options)
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locator::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SEPARATOR, self.payload)?;
        if !self.options.is_empty() {
            write!(f, " {}", self.options)?;
        }
        Ok(())
    }
}
