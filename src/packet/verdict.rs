//! Signature verdicts read from engine diagnostics.

use crate::error::{GpgError, Result};
use serde::Serialize;

pub const BAD_SIGNATURE_MARKER: &str = "BAD signature";
pub const GOOD_SIGNATURE_MARKER: &str = "Good signature";
pub const SYMMETRIC_MARKER: &str = "encrypted with 1 passphrase";

/// Outcome of a verification that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureVerdict {
    /// Decrypted payload, when the verification was part of a decryption
    pub message: Option<Vec<u8>>,
    /// Diagnostic text the verdict was derived from
    pub diagnostics: String,
    /// Long key id of the signer, when the engine reported one
    pub signer: Option<String>,
}

impl SignatureVerdict {
    /// Whether the diagnostics carry an explicit good-signature line
    pub fn is_good(&self) -> bool {
        reports_good_signature(&self.diagnostics)
    }
}

/// Fail on an explicit bad-signature report. Anything else passes; trust
/// levels are left to whoever reads the diagnostics.
pub fn check_signature_verdict(diagnostics: &str) -> Result<()> {
    if diagnostics.contains(BAD_SIGNATURE_MARKER) {
        return Err(GpgError::bad_signature(diagnostics.trim()));
    }
    Ok(())
}

pub fn reports_good_signature(diagnostics: &str) -> bool {
    diagnostics.contains(GOOD_SIGNATURE_MARKER)
}

/// Whether a decryption attempt reported a passphrase-only session key
pub fn reports_symmetric_encryption(diagnostics: &str) -> bool {
    diagnostics.contains(SYMMETRIC_MARKER)
}
