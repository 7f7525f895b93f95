//! Error types for locator and option parsing.

use std::fmt;

/// Errors raised while parsing locators, option lists and flag expressions.
///
/// All of these are recoverable. Callers usually surface them as a
/// "bad locator string" failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// The locator has no `://` separating scheme and payload.
    MissingSchemeSeparator { locator: String },

    /// The scheme is empty or contains characters outside `[A-Za-z0-9_]`.
    InvalidScheme { scheme: String },

    /// A reference was not followed by `=`.
    MissingEquals { reference: String, position: usize },

    /// A reference was followed by `=` but no value.
    EmptyValue { reference: String },

    /// A single-quoted value never closed.
    UnterminatedQuote { reference: String, position: usize },

    /// A numeric literal could not be decoded.
    InvalidNumber { literal: String },

    /// A flag expression named a symbol the table does not know.
    UnknownSymbol { symbol: String },

    /// A flag expression used an operator other than `&`, `|` or `^`.
    UnexpectedOperator { operator: char, position: usize },

    /// A flag expression is empty or ends with an operator.
    MissingOperand { position: usize },

    /// Two operands follow each other without an operator in between.
    MissingOperator { position: usize },

    /// A value was present but did not have the expected type.
    InvalidValue { reference: String, value: String },
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorError::MissingSchemeSeparator { locator } => {
                write!(f, "locator '{}' has no '://' separator", locator)
            }
            LocatorError::InvalidScheme { scheme } => {
                write!(f, "invalid scheme '{}'", scheme)
            }
            LocatorError::MissingEquals {
                reference,
                position,
            } => write!(
                f,
                "expected '=' after reference '{}' at position {}",
                reference, position
            ),
            LocatorError::EmptyValue { reference } => {
                write!(f, "reference '{}' has an empty value", reference)
            }
            LocatorError::UnterminatedQuote {
                reference,
                position,
            } => write!(
                f,
                "unterminated quote in value of '{}' starting at position {}",
                reference, position
            ),
            LocatorError::InvalidNumber { literal } => {
                write!(f, "invalid numeric literal '{}'", literal)
            }
            LocatorError::UnknownSymbol { symbol } => {
                write!(f, "unknown flag symbol '{}'", symbol)
            }
            LocatorError::UnexpectedOperator { operator, position } => write!(
                f,
                "unexpected operator '{}' at position {} (only '&', '|' and '^' are allowed)",
                operator, position
            ),
            LocatorError::MissingOperand { position } => {
                write!(f, "missing operand at position {}", position)
            }
            LocatorError::MissingOperator { position } => {
                write!(f, "missing operator at position {}", position)
            }
            LocatorError::InvalidValue { reference, value } => {
                write!(f, "invalid value '{}' for reference '{}'", value, reference)
            }
        }
    }
}

impl std::error::Error for LocatorError {}
