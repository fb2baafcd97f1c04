//! User reference type: a numeric id or a username.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};

use super::Id;

/// A reference to a user, either by numeric id or by username.
///
/// Endpoints that need a numeric id resolve a `Username` with a single
/// lookup call before paging starts.
///
/// # Example
///
/// ```
/// use chirp_core::UserRef;
///
/// assert!(matches!(UserRef::parse("@jack").unwrap(), UserRef::Username(_)));
/// assert!(matches!(UserRef::parse("12").unwrap(), UserRef::Id(_)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UserRef {
    /// A numeric user id.
    Id(Id),
    /// A username without the leading `@`.
    Username(String),
}

impl UserRef {
    /// Parse a user reference. All-digit input is an id; anything else is a
    /// username (an optional leading `@` is stripped).
    ///
    /// # Errors
    ///
    /// Returns an error if the username is empty, longer than 15 characters,
    /// or contains characters other than ASCII letters, digits and `_`.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            return Ok(UserRef::Id(Id::new(s)?));
        }
        Self::username(s)
    }

    /// Build a username reference, validating the format.
    pub fn username(s: &str) -> Result<Self, Error> {
        let name = s.trim().trim_start_matches('@');

        if name.is_empty() {
            return Err(InvalidInputError::Username {
                value: s.to_string(),
                reason: "cannot be empty".to_string(),
            }
            .into());
        }

        if name.len() > 15 {
            return Err(InvalidInputError::Username {
                value: s.to_string(),
                reason: "exceeds maximum length of 15 characters".to_string(),
            }
            .into());
        }

        if let Some(c) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
            return Err(InvalidInputError::Username {
                value: s.to_string(),
                reason: format!("contains invalid character '{}'", c),
            }
            .into());
        }

        Ok(UserRef::Username(name.to_string()))
    }

    /// Returns the id if this reference is already numeric.
    pub fn id(&self) -> Option<&Id> {
        match self {
            UserRef::Id(id) => Some(id),
            UserRef::Username(_) => None,
        }
    }

    /// The v1.1 query parameter naming this user (`user_id` or `screen_name`).
    pub fn v1_param(&self) -> (&'static str, String) {
        match self {
            UserRef::Id(id) => ("user_id", id.to_string()),
            UserRef::Username(name) => ("screen_name", name.clone()),
        }
    }
}

impl From<Id> for UserRef {
    fn from(id: Id) -> Self {
        UserRef::Id(id)
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRef::Id(id) => write!(f, "{}", id),
            UserRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

impl FromStr for UserRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_parse_as_id() {
        let user = UserRef::parse("783214").unwrap();
        assert_eq!(user.id().map(Id::as_str), Some("783214"));
        assert_eq!(user.v1_param(), ("user_id", "783214".to_string()));
    }

    #[test]
    fn at_sign_is_stripped() {
        let user = UserRef::parse("@TwitterDev").unwrap();
        assert_eq!(user, UserRef::Username("TwitterDev".to_string()));
        assert_eq!(user.v1_param(), ("screen_name", "TwitterDev".to_string()));
        assert_eq!(user.to_string(), "@TwitterDev");
    }

    #[test]
    fn rejects_bad_usernames() {
        assert!(UserRef::parse("").is_err());
        assert!(UserRef::parse("@").is_err());
        assert!(UserRef::parse("has space").is_err());
        assert!(UserRef::parse("averyveryverylongname").is_err());
    }
}
