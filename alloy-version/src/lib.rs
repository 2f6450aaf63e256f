//! Semantic version parsing and constraint evaluation.
//!
//! This is the leaf component of the Alloy mod loader (component C1): every
//! other crate in the workspace depends on [`SemanticVersion`] and
//! [`VersionConstraint`] but this crate depends on nothing loader-specific.

use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::str::FromStr;

use custom_error::custom_error;
use serde::{Deserialize, Serialize};

custom_error! {
    pub VersionError
    InvalidVersion { input: String } = "invalid version '{input}': expected `[v]major[.minor[.patch]]` with decimal components",
    InvalidConstraint { input: String } = "invalid version constraint '{input}'",
}

/// Three non-negative integers, ordered lexicographically. Missing trailing
/// components default to zero; an optional leading `v` is tolerated on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemanticVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let stripped = input
            .strip_prefix('v')
            .or_else(|| input.strip_prefix('V'))
            .unwrap_or(input);

        if stripped.is_empty() {
            return Err(VersionError::InvalidVersion {
                input: input.to_string(),
            });
        }

        let parts: Vec<&str> = stripped.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(VersionError::InvalidVersion {
                input: input.to_string(),
            });
        }

        let mut components = [0u64; 3];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::InvalidVersion {
                    input: input.to_string(),
                });
            }
            components[i] = part.parse::<u64>().map_err(|_| VersionError::InvalidVersion {
                input: input.to_string(),
            })?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A version requirement as it appears in a manifest's `dependencies` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionConstraint {
    Any,
    Equals(SemanticVersion),
    Gte(SemanticVersion),
    Gt(SemanticVersion),
    Lte(SemanticVersion),
    Lt(SemanticVersion),
    Caret(SemanticVersion),
    Tilde(SemanticVersion),
}

impl VersionConstraint {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(VersionConstraint::Any);
        }

        let invalid = || VersionError::InvalidConstraint {
            input: input.to_string(),
        };

        if let Some(rest) = trimmed.strip_prefix(">=") {
            return Ok(VersionConstraint::Gte(
                SemanticVersion::parse(rest).map_err(|_| invalid())?,
            ));
        }
        if let Some(rest) = trimmed.strip_prefix("<=") {
            return Ok(VersionConstraint::Lte(
                SemanticVersion::parse(rest).map_err(|_| invalid())?,
            ));
        }
        if let Some(rest) = trimmed.strip_prefix('>') {
            return Ok(VersionConstraint::Gt(
                SemanticVersion::parse(rest).map_err(|_| invalid())?,
            ));
        }
        if let Some(rest) = trimmed.strip_prefix('<') {
            return Ok(VersionConstraint::Lt(
                SemanticVersion::parse(rest).map_err(|_| invalid())?,
            ));
        }
        if let Some(rest) = trimmed.strip_prefix('^') {
            return Ok(VersionConstraint::Caret(
                SemanticVersion::parse(rest).map_err(|_| invalid())?,
            ));
        }
        if let Some(rest) = trimmed.strip_prefix('~') {
            return Ok(VersionConstraint::Tilde(
                SemanticVersion::parse(rest).map_err(|_| invalid())?,
            ));
        }
        if let Some(rest) = trimmed.strip_prefix('=') {
            return Ok(VersionConstraint::Equals(
                SemanticVersion::parse(rest).map_err(|_| invalid())?,
            ));
        }

        Ok(VersionConstraint::Equals(
            SemanticVersion::parse(trimmed).map_err(|_| invalid())?,
        ))
    }

    /// Whether `version` satisfies this constraint.
    pub fn satisfies(&self, version: &SemanticVersion) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Equals(v) => version == v,
            VersionConstraint::Gte(v) => version >= v,
            VersionConstraint::Gt(v) => version > v,
            VersionConstraint::Lte(v) => version <= v,
            VersionConstraint::Lt(v) => version < v,
            VersionConstraint::Caret(v) => version.major == v.major && version >= v,
            VersionConstraint::Tilde(v) => {
                version.major == v.major && version.minor == v.minor && version >= v
            }
        }
    }
}

impl Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Equals(v) => write!(f, "={v}"),
            VersionConstraint::Gte(v) => write!(f, ">={v}"),
            VersionConstraint::Gt(v) => write!(f, ">{v}"),
            VersionConstraint::Lte(v) => write!(f, "<={v}"),
            VersionConstraint::Lt(v) => write!(f, "<{v}"),
            VersionConstraint::Caret(v) => write!(f, "^{v}"),
            VersionConstraint::Tilde(v) => write!(f, "~{v}"),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        VersionConstraint::parse(&s).map_err(serde::de::Error::custom)
    }
}
