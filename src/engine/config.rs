//! Engine configuration.

use crate::error::{GpgError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default engine executable, resolved through `PATH`
pub const DEFAULT_BINARY: &str = "gpg";

pub const ENV_BINARY: &str = "GPGBRIDGE_BINARY";
pub const ENV_SCRATCH_DIR: &str = "GPGBRIDGE_SCRATCH_DIR";
pub const ENV_VERBOSE: &str = "GPGBRIDGE_VERBOSE";
pub const ENV_TIMEOUT_SECS: &str = "GPGBRIDGE_TIMEOUT_SECS";

/// Settings fixed when an engine handle is constructed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable
    pub binary: PathBuf,
    /// Parent of the private scratch directory (system temp dir when unset)
    pub scratch_base: Option<PathBuf>,
    /// Keep informational diagnostics on every call
    pub verbose: bool,
    /// Kill engine calls that run longer than this
    pub timeout_secs: Option<u64>,
    /// Additional flags appended after the fixed baseline
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            scratch_base: None,
            verbose: false,
            timeout_secs: None,
            extra_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `GPGBRIDGE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(binary) = env::var(ENV_BINARY) {
            if !binary.trim().is_empty() {
                config.binary = PathBuf::from(binary);
            }
        }
        if let Ok(dir) = env::var(ENV_SCRATCH_DIR) {
            if !dir.trim().is_empty() {
                config.scratch_base = Some(PathBuf::from(dir));
            }
        }
        if let Ok(verbose) = env::var(ENV_VERBOSE) {
            config.verbose = parse_flag(&verbose).ok_or_else(|| {
                GpgError::config(format!("{} must be a boolean, got '{}'", ENV_VERBOSE, verbose))
            })?;
        }
        if let Ok(timeout) = env::var(ENV_TIMEOUT_SECS) {
            let secs = timeout.trim().parse::<u64>().map_err(|_| {
                GpgError::config(format!(
                    "{} must be a number of seconds, got '{}'",
                    ENV_TIMEOUT_SECS, timeout
                ))
            })?;
            config.timeout_secs = Some(secs);
        }

        Ok(config)
    }

    pub fn with_binary<P: Into<PathBuf>>(mut self, binary: P) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_scratch_base<P: AsRef<Path>>(mut self, base: P) -> Self {
        self.scratch_base = Some(base.as_ref().to_path_buf());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Check the configuration before anything is spawned or created
    pub fn validate(&self) -> Result<()> {
        if self.binary.as_os_str().is_empty() {
            return Err(GpgError::config("Engine binary path is empty"));
        }
        if let Some(base) = &self.scratch_base {
            if !base.is_dir() {
                return Err(GpgError::config(format!(
                    "Scratch base {} is not a directory",
                    base.display()
                )));
            }
        }
        if self.timeout_secs == Some(0) {
            return Err(GpgError::config("Timeout must be at least one second"));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
