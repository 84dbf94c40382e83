//! Engine version detection.

use crate::error::{GpgError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

static BANNER_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\(GnuPG[^)]*\)\s+)?(\d+)\.(\d+)(?:\.(\d+))?").expect("valid version regex")
});

/// Engine generation, which decides the invocation flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Generation {
    /// Separate secret keyring files, passphrase read directly from the input stream
    Legacy,
    /// Agent-held secret keys, passphrase entry through loopback pinentry
    Loopback,
}

/// Parsed `major.minor.patch` of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    /// First version that requires explicit pinentry handling
    pub const LOOPBACK_THRESHOLD: EngineVersion = EngineVersion::new(2, 1, 0);

    /// First version whose loopback pinentry works unattended
    pub const LOOPBACK_MINIMUM: EngineVersion = EngineVersion::new(2, 1, 12);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the first line of `gpg --version` output
    pub fn parse_banner(banner: &str) -> Result<Self> {
        let first_line = banner
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| GpgError::packet("Engine printed no version banner"))?;

        let captures = BANNER_VERSION.captures(first_line).ok_or_else(|| {
            GpgError::packet(format!("Unrecognized version banner: {}", first_line))
        })?;

        let number = |index: usize| -> Result<u32> {
            captures
                .get(index)
                .map_or(Ok(0), |m| m.as_str().parse::<u32>())
                .map_err(|_| GpgError::packet(format!("Version component out of range: {}", first_line)))
        };

        Ok(Self::new(number(1)?, number(2)?, number(3)?))
    }

    /// Decide how to drive this version. The range between the legacy line and
    /// the first working loopback release is refused outright.
    pub fn generation(&self) -> Result<Generation> {
        if *self < Self::LOOPBACK_THRESHOLD {
            Ok(Generation::Legacy)
        } else if *self < Self::LOOPBACK_MINIMUM {
            Err(GpgError::unsupported_version(format!(
                "{} lacks working loopback pinentry; use {} or newer",
                self,
                Self::LOOPBACK_MINIMUM
            )))
        } else {
            Ok(Generation::Loopback)
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
