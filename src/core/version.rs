// src/core/version.rs

//! Semantic MySQL server version, used for all capability gates in the core.

use crate::core::errors::ReplicoreError;
use std::fmt;
use std::str::FromStr;

/// A MySQL server version triple. Ordering is lexicographic over
/// `(major, minor, patch)`, which is what every capability gate needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// First version with `SET PERSIST` / `SET PERSIST_ONLY` support.
    pub const PERSIST_SUPPORT: Version = Version::new(8, 0, 11);
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ReplicoreError;

    /// Parses `"8.0.26"` style strings. A trailing suffix after the patch
    /// number (e.g. `"8.0.26-debug"`) is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let invalid = || ReplicoreError::InvalidVersion(s.to_string());

        let major = parts.next().ok_or_else(invalid)?;
        let minor = parts.next().ok_or_else(invalid)?;
        let patch = parts.next().unwrap_or("0");
        let patch = patch
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .unwrap_or("0");

        Ok(Version {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
            patch: patch.parse().map_err(|_| invalid())?,
        })
    }
}
