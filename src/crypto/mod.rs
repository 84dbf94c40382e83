//! Operation orchestrators.
//!
//! Each operation is an `impl GpgEngine` block that validates its
//! parameters, loads the keys it needs into the scratch keyrings, runs the
//! engine and interprets what came back:
//!
//! - **keys**: key generation, public key extraction, fingerprints, packet dumps
//! - **encryption**: asymmetric and symmetric encryption, decryption, symmetric detection
//! - **signature**: signing, verification, detached signature checks

pub mod encryption;
pub mod keys;
pub mod password;
pub mod signature;

pub use encryption::{DecryptParams, EncryptParams, Signer, SymmetricEncryptParams};
pub use keys::{GeneratedKey, KeyGenParams, KeyIdentity};
pub use password::Passphrase;
pub use signature::{SignParams, SignatureMode, SignedData, VerifyParams};

use crate::error::{GpgError, Result};
use crate::invoker::InvocationResult;
use std::time::{SystemTime, UNIX_EPOCH};

/// Payload of an engine call that was expected to produce one
pub(crate) fn produced_output(result: InvocationResult, operation: &str) -> Result<Vec<u8>> {
    match result.output {
        Some(output) if !output.is_empty() => Ok(output),
        _ => Err(GpgError::engine(format!(
            "{} produced no output (exit {:?}): {}",
            operation,
            result.exit_code,
            result.diagnostics()
        ))),
    }
}

/// Seconds since the epoch
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
