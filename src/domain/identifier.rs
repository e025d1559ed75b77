//! 10- and 13-digit book identifier normalization, checksum validation and
//! conversion.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BOOKLAND_PREFIXES: [&str; 2] = ["978", "979"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IsbnError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier must have 10 or 13 characters, got {0}")]
    Length(usize),
    #[error("invalid character '{0}' in identifier")]
    InvalidCharacter(char),
    #[error("13-digit identifier must start with 978 or 979")]
    Prefix,
    #[error("checksum mismatch (expected check digit {expected})")]
    Checksum { expected: char },
}

/// A checksum-validated identifier in normalized form (no separators,
/// uppercase check character).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl Isbn {
    pub fn parse(raw: &str) -> Result<Self, IsbnError> {
        let normalized = normalize(raw);
        match normalized.chars().count() {
            0 => Err(IsbnError::Empty),
            10 => check_isbn10(&normalized).map(|_| Self(normalized)),
            13 => check_isbn13(&normalized).map(|_| Self(normalized)),
            other => Err(IsbnError::Length(other)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_isbn13(&self) -> bool {
        self.0.len() == 13
    }

    /// The 13-digit form; identity for identifiers that already are.
    pub fn to_isbn13(&self) -> String {
        if self.is_isbn13() {
            self.0.clone()
        } else {
            let body = format!("978{}", &self.0[..9]);
            let check = isbn13_check_digit(&body);
            format!("{body}{check}")
        }
    }

    /// The 10-digit form; `None` for 979-prefixed identifiers, which have none.
    pub fn to_isbn10(&self) -> Option<String> {
        if !self.is_isbn13() {
            return Some(self.0.clone());
        }
        let body = self.0.strip_prefix("978")?;
        let body = &body[..9];
        Some(format!("{body}{}", isbn10_check_char(body)))
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Isbn {
    type Error = IsbnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Isbn> for String {
    fn from(value: Isbn) -> Self {
        value.0
    }
}

/// Validity flag plus a human-readable reason, for callers that only report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IsbnValidation {
    pub valid: bool,
    pub error: Option<String>,
}

pub fn validate(raw: &str) -> IsbnValidation {
    match Isbn::parse(raw) {
        Ok(_) => IsbnValidation {
            valid: true,
            error: None,
        },
        Err(err) => IsbnValidation {
            valid: false,
            error: Some(err.to_string()),
        },
    }
}

/// Converts a valid 10-digit identifier to its 13-digit form.
pub fn isbn10_to_13(raw: &str) -> Option<String> {
    Isbn::parse(raw)
        .ok()
        .filter(|isbn| !isbn.is_isbn13())
        .map(|isbn| isbn.to_isbn13())
}

/// Converts a valid 978-prefixed 13-digit identifier to its 10-digit form.
pub fn isbn13_to_10(raw: &str) -> Option<String> {
    Isbn::parse(raw)
        .ok()
        .filter(Isbn::is_isbn13)
        .and_then(|isbn| isbn.to_isbn10())
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | ' ' | '\t'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn check_isbn10(value: &str) -> Result<(), IsbnError> {
    let mut sum = 0_u32;
    for (index, ch) in value.chars().enumerate() {
        let digit = match ch {
            '0'..='9' => ch as u32 - '0' as u32,
            'X' if index == 9 => 10,
            other => return Err(IsbnError::InvalidCharacter(other)),
        };
        sum += digit * (10 - index as u32);
    }
    if sum % 11 == 0 {
        Ok(())
    } else {
        Err(IsbnError::Checksum {
            expected: isbn10_check_char(&value[..9]),
        })
    }
}

fn check_isbn13(value: &str) -> Result<(), IsbnError> {
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_digit()) {
        return Err(IsbnError::InvalidCharacter(bad));
    }
    if !BOOKLAND_PREFIXES.iter().any(|prefix| value.starts_with(prefix)) {
        return Err(IsbnError::Prefix);
    }
    let expected = isbn13_check_digit(&value[..12]);
    if value.ends_with(expected) {
        Ok(())
    } else {
        Err(IsbnError::Checksum { expected })
    }
}

/// `body` must be nine ASCII digits.
fn isbn10_check_char(body: &str) -> char {
    let sum: u32 = body
        .bytes()
        .enumerate()
        .map(|(index, b)| (b - b'0') as u32 * (10 - index as u32))
        .sum();
    match (11 - sum % 11) % 11 {
        10 => 'X',
        digit => char::from(b'0' + digit as u8),
    }
}

/// `body` must be twelve ASCII digits.
fn isbn13_check_digit(body: &str) -> char {
    let sum: u32 = body
        .bytes()
        .enumerate()
        .map(|(index, b)| {
            let weight = if index % 2 == 0 { 1 } else { 3 };
            (b - b'0') as u32 * weight
        })
        .sum();
    char::from(b'0' + ((10 - sum % 10) % 10) as u8)
}
