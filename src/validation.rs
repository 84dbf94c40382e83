//! Parameter validation and input limits for engine operations.
//!
//! Every orchestrator checks its parameters here before it touches the
//! scratch directory or spawns the engine, so a missing parameter never
//! leaves a half-populated keyring behind.

use crate::crypto::Passphrase;
use crate::error::{GpgError, Result};

/// Maximum payload handed to the engine in one invocation (100MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Maximum size of a single key blob (1MB, generous for keys with many signatures)
pub const MAX_KEY_SIZE: usize = 1024 * 1024;

/// Maximum size of a detached signature (64KB)
pub const MAX_SIGNATURE_SIZE: usize = 64 * 1024;

/// Maximum length of one identity field (name, email, comment)
pub const MAX_USER_ID_LENGTH: usize = 1024;

/// Maximum number of recipients in one encryption
pub const MAX_RECIPIENTS: usize = 1000;

/// Validation functions for operation parameters
pub struct Validator;

impl Validator {
    /// Require an optional parameter to be present
    pub fn require<'a, T>(name: &str, value: Option<&'a T>) -> Result<&'a T> {
        value.ok_or_else(|| GpgError::missing_parameter(name))
    }

    /// Require a byte payload to be present and non-empty
    pub fn require_bytes<'a>(name: &str, value: Option<&'a [u8]>) -> Result<&'a [u8]> {
        match value {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(GpgError::missing_parameter(name)),
        }
    }

    /// Require a text parameter to be present and not blank
    pub fn require_text<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str> {
        match value {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(GpgError::missing_parameter(name)),
        }
    }

    /// Require a passphrase to be present (an empty passphrase is still a passphrase)
    pub fn require_passphrase<'a>(
        name: &str,
        value: Option<&'a Passphrase>,
    ) -> Result<&'a Passphrase> {
        value.ok_or_else(|| GpgError::missing_parameter(name))
    }

    /// Validate payload size
    pub fn validate_message_size(data: &[u8]) -> Result<()> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(GpgError::validation(format!(
                "Message too large: {} bytes exceeds maximum of {} bytes",
                data.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Validate key blob size
    pub fn validate_key_size(data: &[u8]) -> Result<()> {
        if data.len() > MAX_KEY_SIZE {
            return Err(GpgError::validation(format!(
                "Key material too large: {} bytes exceeds maximum of {} bytes",
                data.len(),
                MAX_KEY_SIZE
            )));
        }
        Ok(())
    }

    /// Validate detached signature size
    pub fn validate_signature_size(data: &[u8]) -> Result<()> {
        if data.len() > MAX_SIGNATURE_SIZE {
            return Err(GpgError::validation(format!(
                "Signature too large: {} bytes exceeds maximum of {} bytes",
                data.len(),
                MAX_SIGNATURE_SIZE
            )));
        }
        Ok(())
    }

    /// Validate recipient count
    pub fn validate_recipient_count(count: usize) -> Result<()> {
        if count > MAX_RECIPIENTS {
            return Err(GpgError::validation(format!(
                "Too many recipients: {} exceeds maximum of {}",
                count, MAX_RECIPIENTS
            )));
        }
        Ok(())
    }

    /// Validate one identity field destined for a key generation script.
    ///
    /// The script is line oriented, so any control character (newlines in
    /// particular) would let a value smuggle in extra script directives.
    pub fn validate_identity_field(name: &str, value: &str) -> Result<()> {
        if value.len() > MAX_USER_ID_LENGTH {
            return Err(GpgError::validation(format!(
                "{} too long: {} bytes exceeds maximum of {} bytes",
                name,
                value.len(),
                MAX_USER_ID_LENGTH
            )));
        }

        if value.chars().any(char::is_control) {
            return Err(GpgError::validation(format!(
                "{} contains control characters",
                name
            )));
        }

        Ok(())
    }

    /// Validate a passphrase destined for the engine's input stream
    pub fn validate_passphrase(passphrase: &Passphrase) -> Result<()> {
        if passphrase.expose().contains(['\n', '\r']) {
            return Err(GpgError::validation("Passphrase contains line breaks"));
        }
        Ok(())
    }
}
