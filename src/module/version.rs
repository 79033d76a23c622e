//! Contract version compatibility
//!
//! Decides whether a module's declared contract version is acceptable against
//! the baseline the host expects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version compatibility strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionCompatibilityStrategy {
    /// Declared version must equal the expected version
    #[default]
    Exact,
    /// Only the major component has to match
    MajorOnly,
}

impl fmt::Display for VersionCompatibilityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionCompatibilityStrategy::Exact => f.write_str("exact"),
            VersionCompatibilityStrategy::MajorOnly => f.write_str("major_only"),
        }
    }
}

/// Pluggable acceptance test for contract versions
pub trait VersionPolicy: Send + Sync {
    /// Returns true if `declared` is acceptable given `expected`
    fn accepts(&self, declared: &str, expected: &str) -> bool;
}

impl VersionPolicy for VersionCompatibilityStrategy {
    fn accepts(&self, declared: &str, expected: &str) -> bool {
        let (Ok(declared), Ok(expected)) =
            (declared.parse::<ContractVersion>(), expected.parse::<ContractVersion>())
        else {
            return false;
        };

        match self {
            VersionCompatibilityStrategy::Exact => declared == expected,
            VersionCompatibilityStrategy::MajorOnly => declared.major == expected.major,
        }
    }
}

/// Parsed `major[.minor[.patch]][-pre][+build]` contract version
///
/// Missing minor/patch components are zero and build metadata is dropped, so
/// `1.2`, `1.2.0` and `1.2.0+ci.7` are the same version. A pre-release tag is
/// kept and takes part in equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

/// Why a contract version string could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("empty pre-release in version '{0}'")]
    EmptyPreRelease(String),

    #[error("invalid {component} component '{value}' in version '{version}'")]
    InvalidComponent {
        component: &'static str,
        value: String,
        version: String,
    },

    #[error("missing {component} component in version '{version}'")]
    MissingComponent {
        component: &'static str,
        version: String,
    },

    #[error("too many components in version '{0}'")]
    TooManyComponents(String),
}

impl FromStr for ContractVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let base = s.split_once('+').map_or(s, |(base, _)| base);
        let (core, pre) = match base.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(VersionParseError::EmptyPreRelease(s.to_string())),
            None => (base, None),
        };

        let mut parts = core.split('.');
        let mut next = |component: &'static str, required: bool| -> Result<u64, VersionParseError> {
            match parts.next() {
                Some(p) => p.parse::<u64>().map_err(|_| VersionParseError::InvalidComponent {
                    component,
                    value: p.to_string(),
                    version: s.to_string(),
                }),
                None if required => Err(VersionParseError::MissingComponent {
                    component,
                    version: s.to_string(),
                }),
                None => Ok(0),
            }
        };

        let major = next("major", true)?;
        let minor = next("minor", false)?;
        let patch = next("patch", false)?;
        if parts.next().is_some() {
            return Err(VersionParseError::TooManyComponents(s.to_string()));
        }

        Ok(Self { major, minor, patch, pre })
    }
}

impl fmt::Display for ContractVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}
