//! Numeric object identifier type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};

/// A validated numeric object id (tweet, user, list).
///
/// Ids are carried as decimal strings, the way both API versions expose
/// them (`id_str` in v1.1, `id` in v2), but are guaranteed to parse as `u64`.
///
/// # Example
///
/// ```
/// use chirp_core::Id;
///
/// let id = Id::new("1212092628029698048").unwrap();
/// assert_eq!(id.value(), 1212092628029698048);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id(String);

impl Id {
    /// Create a new id from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a positive decimal integer.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(InvalidInputError::Id {
                value: s.clone(),
                reason: "cannot be empty".to_string(),
            }
            .into());
        }

        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidInputError::Id {
                value: s.clone(),
                reason: "must contain only digits".to_string(),
            }
            .into());
        }

        let value = trimmed.parse::<u64>().map_err(|_| InvalidInputError::Id {
            value: s.clone(),
            reason: "does not fit in 64 bits".to_string(),
        })?;

        // canonical form, no leading zeros
        Ok(Self(value.to_string()))
    }

    /// Returns the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the numeric value.
    pub fn value(&self) -> u64 {
        // validated in `new`
        self.0.parse().unwrap_or_default()
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value().cmp(&other.value())
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Id {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_large_ids() {
        let id = Id::new("1460323737035677698").unwrap();
        assert_eq!(id.value(), 1460323737035677698);
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(Id::new(" 42\n").unwrap().as_str(), "42");
    }

    #[test]
    fn rejects_non_numeric() {
        assert!(Id::new("jack").is_err());
        assert!(Id::new("").is_err());
        assert!(Id::new("-1").is_err());
    }

    #[test]
    fn rejects_overflow() {
        assert!(Id::new("99999999999999999999999").is_err());
    }

    #[test]
    fn ordering_is_numeric() {
        let a = Id::new("99").unwrap();
        let b = Id::new("100").unwrap();
        assert!(a < b);
    }

    #[test]
    fn leading_zeros_are_dropped() {
        assert_eq!(Id::new("007").unwrap().as_str(), "7");
    }
}
