//! Client SDK version announced in the handshake.

use std::fmt;
use std::str::FromStr;

/// `major.minor.patch` version, compared numerically.
///
/// A leading `v` and any pre-release or build suffix (`-beta`, `+sha`) are
/// accepted and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SdkVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SdkVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for SdkVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let core = trimmed
            .split(|c| c == '-' || c == '+')
            .next()
            .unwrap_or_default();

        let mut parts = core.split('.');
        let mut next = |name: &str| -> Result<u64, String> {
            match parts.next() {
                Some(p) => p
                    .parse::<u64>()
                    .map_err(|_| format!("invalid {} component in '{}'", name, s)),
                None => Ok(0),
            }
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;

        if core.is_empty() || parts.next().is_some() {
            return Err(format!("'{}' is not a major.minor.patch version", s));
        }
        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
