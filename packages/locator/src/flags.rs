//! Numeric literals and symbolic flag expressions.
//!
//! A flag expression combines symbols and numeric literals with the binary
//! operators `&`, `|` and `^`. There is no precedence: operators apply
//! strictly left to right, so `A & B ^ C | D` is `((A & B) ^ C) | D`.

use crate::LocatorError;

/// Decode a numeric literal.
///
/// Accepts an optional sign followed by a `0x`/`0X` hexadecimal, a
/// leading-zero octal or a decimal number.
///
/// # Examples
///
/// ```rust
/// use channelfs_locator::parse_number;
///
/// assert_eq!(parse_number("0x1F").unwrap(), 31);
/// assert_eq!(parse_number("0644").unwrap(), 0o644);
/// assert_eq!(parse_number("-12").unwrap(), -12);
/// ```
pub fn parse_number(literal: &str) -> Result<i64, LocatorError> {
    let invalid = || LocatorError::InvalidNumber {
        literal: literal.to_string(),
    };

    let trimmed = literal.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    if digits.is_empty() {
        return Err(invalid());
    }

    let (radix, body) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    // from_str_radix would accept a second sign
    if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }

    let magnitude = u64::from_str_radix(body, radix).map_err(|_| invalid())?;
    let value = magnitude as i64;
    Ok(if negative { value.wrapping_neg() } else { value })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    And,
    Or,
    Xor,
}

impl Operator {
    fn apply(self, lhs: u64, rhs: u64) -> u64 {
        match self {
            Operator::And => lhs & rhs,
            Operator::Or => lhs | rhs,
            Operator::Xor => lhs ^ rhs,
        }
    }
}

fn is_symbol_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

/// Evaluate a flag expression.
///
/// Symbols are resolved with `lookup`; numeric operands use the literal
/// grammar of [`parse_number`]. Negative literals are taken as their
/// two's-complement bit pattern.
///
/// # Examples
///
/// ```rust
/// use channelfs_locator::evaluate_flags;
///
/// let table = |name: &str| match name {
///     "A" => Some(0b110),
///     "B" => Some(0b011),
///     "C" => Some(0b001),
///     _ => None,
/// };
///
/// // (A | B) & C, not A | (B & C)
/// assert_eq!(evaluate_flags("A | B & C", table).unwrap(), 0b001);
/// ```
pub fn evaluate_flags<F>(expression: &str, lookup: F) -> Result<u64, LocatorError>
where
    F: Fn(&str) -> Option<u64>,
{
    let bytes = expression.as_bytes();
    let mut pos = 0;
    let mut acc: Option<u64> = None;
    let mut pending: Option<Operator> = None;

    while pos < bytes.len() {
        let c = bytes[pos];

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let operator = match c {
            b'&' => Some(Operator::And),
            b'|' => Some(Operator::Or),
            b'^' => Some(Operator::Xor),
            _ => None,
        };

        if let Some(op) = operator {
            if acc.is_none() || pending.is_some() {
                return Err(LocatorError::MissingOperand { position: pos });
            }
            pending = Some(op);
            pos += 1;
            continue;
        }

        let start = pos;
        let operand = if c == b'-' || c == b'+' || c.is_ascii_digit() {
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_alphanumeric() {
                pos += 1;
            }
            parse_number(&expression[start..pos])? as u64
        } else if is_symbol_char(c) {
            while pos < bytes.len() && is_symbol_char(bytes[pos]) {
                pos += 1;
            }
            let symbol = &expression[start..pos];
            lookup(symbol).ok_or_else(|| LocatorError::UnknownSymbol {
                symbol: symbol.to_string(),
            })?
        } else {
            let operator = expression[pos..].chars().next().unwrap_or('?');
            return Err(LocatorError::UnexpectedOperator {
                operator,
                position: pos,
            });
        };

        acc = Some(match (acc, pending.take()) {
            (None, _) => operand,
            (Some(lhs), Some(op)) => op.apply(lhs, operand),
            (Some(_), None) => return Err(LocatorError::MissingOperator { position: start }),
        });
    }

    match (acc, pending) {
        (Some(value), None) => Ok(value),
        _ => Err(LocatorError::MissingOperand { position: pos }),
    }
}
