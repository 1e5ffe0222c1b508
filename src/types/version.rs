// ABOUTME: Release version identifier supplied on the command line.
// ABOUTME: Validated against the container image tag grammar so it can be used as a tag.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version cannot be empty")]
    Empty,

    #[error("version exceeds maximum length of 128 characters")]
    TooLong,

    #[error("version cannot start with '{0}'")]
    InvalidStart(char),

    #[error("invalid character in version: '{0}'")]
    InvalidChar(char),
}

/// A release version, usable verbatim as an image tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    pub fn new(value: &str) -> Result<Self, VersionError> {
        let Some(first) = value.chars().next() else {
            return Err(VersionError::Empty);
        };

        if value.len() > 128 {
            return Err(VersionError::TooLong);
        }

        if first == '.' || first == '-' {
            return Err(VersionError::InvalidStart(first));
        }

        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
        {
            return Err(VersionError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::new(s)
    }
}
