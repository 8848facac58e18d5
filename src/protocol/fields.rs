//! Cursor tokenizer over the comma separated fields of a frame payload.

use thiserror::Error;

use super::FIELD_SEPARATOR;
use crate::core::ErrorCode;

/// Reasons a message parser rejects its fields
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// A required field is missing or does not parse
    #[error("missing or invalid field")]
    Invalid,
    /// Fields remain after the last one the message accepts
    #[error("unexpected trailing fields")]
    TrailingFields,
}

impl From<ParseError> for ErrorCode {
    fn from(err: ParseError) -> ErrorCode {
        match err {
            ParseError::Invalid => ErrorCode::MessageParsing,
            ParseError::TrailingFields => ErrorCode::MalformedMessage,
        }
    }
}

/// Lazy iterator over the fields of a payload.
///
/// Empty fields between consecutive separators are skipped, so `1,,ON`
/// yields `1` then `ON`. The cursor is `Clone`, which makes it restartable
/// from any position.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    /// Creates a cursor at the first field of `input`
    pub fn new(input: &'a str) -> Self {
        Fields { rest: input }
    }

    /// Returns the unconsumed input, starting at the next separator or field
    pub fn remainder(&self) -> &'a str {
        self.rest
    }

    /// Takes the next non-empty field
    pub fn next_field(&mut self) -> Option<&'a str> {
        let separator = FIELD_SEPARATOR as char;
        let trimmed = self.rest.trim_start_matches(separator);
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }

        match trimmed.find(separator) {
            Some(end) => {
                self.rest = &trimmed[end..];
                Some(&trimmed[..end])
            }
            None => {
                self.rest = "";
                Some(trimmed)
            }
        }
    }

    /// Takes the next field, failing when there is none
    pub fn required(&mut self) -> Result<&'a str, ParseError> {
        self.next_field().ok_or(ParseError::Invalid)
    }

    /// Fails if any field is left
    pub fn expect_end(&mut self) -> Result<(), ParseError> {
        match self.next_field() {
            Some(_) => Err(ParseError::TrailingFields),
            None => Ok(()),
        }
    }

    /// Takes a channel number in `0..=255`
    pub fn channel(&mut self) -> Result<u8, ParseError> {
        parse_u8(self.required()?).ok_or(ParseError::Invalid)
    }

    /// Takes an unsigned 32-bit decimal
    pub fn u32(&mut self) -> Result<u32, ParseError> {
        parse_u32(self.required()?).ok_or(ParseError::Invalid)
    }

    /// Takes a finite float
    pub fn f32(&mut self) -> Result<f32, ParseError> {
        parse_f32(self.required()?).ok_or(ParseError::Invalid)
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_field()
    }
}

/// Parses ASCII decimal digits into a `u64`, rejecting signs and whitespace
pub fn parse_unsigned(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Parses a decimal that fits one byte
pub fn parse_u8(token: &str) -> Option<u8> {
    parse_unsigned(token).and_then(|value| u8::try_from(value).ok())
}

/// Parses a decimal that fits 32 bits
pub fn parse_u32(token: &str) -> Option<u32> {
    parse_unsigned(token).and_then(|value| u32::try_from(value).ok())
}

/// Parses a signed decimal float, rejecting infinities and NaN
pub fn parse_f32(token: &str) -> Option<f32> {
    token.parse::<f32>().ok().filter(|value| value.is_finite())
}
