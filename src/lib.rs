//! # gpgbridge - OpenPGP through an external GnuPG engine
//!
//! A PGP backend that delegates every cryptographic operation to an installed
//! `gpg` binary. Keys are supplied as byte blobs on each call and loaded into
//! throwaway keyrings inside a private scratch home, so the user's own
//! keyrings are never touched.
//!
//! ## Features
//!
//! - **Key management**: key generation, public key extraction, fingerprints
//!   and structured packet dumps
//! - **Encryption**: asymmetric (optionally signed) and symmetric encryption,
//!   decryption with signature verification, symmetric detection
//! - **Signatures**: detached and cleartext signing, verification with the
//!   engine's own verdict
//! - **Engine generations**: legacy 1.x/2.0 engines and 2.1.12+ engines with
//!   pinentry loopback are driven through the same API
//!
//! ## Examples
//!
//! ```rust,no_run
//! use gpgbridge::{EngineConfig, GpgEngine, KeyGenParams, SignParams, VerifyParams};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = GpgEngine::new(EngineConfig::from_env()?)?;
//!
//! let key = engine.generate_key(
//!     &KeyGenParams::new("Alice", "alice@example.org").with_passphrase("secret"),
//! )?;
//!
//! let signed = engine.sign(
//!     b"Hello",
//!     &SignParams::new(&key.public_key, &key.private_key, "secret"),
//! )?;
//! let verdict = engine.verify(&VerifyParams::detached(&key.public_key, &signed.signature, b"Hello"))?;
//! assert!(verdict.is_good());
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod keyring;
pub mod packet;
pub mod validation;

pub use crypto::{
    DecryptParams, EncryptParams, GeneratedKey, KeyGenParams, KeyIdentity, Passphrase,
    SignParams, SignatureMode, SignedData, Signer, SymmetricEncryptParams, VerifyParams,
};
pub use engine::{EngineConfig, EngineVersion, Generation, GpgEngine};
pub use error::{GpgError, Result};
pub use keyring::{ImportOutcome, KeyringKind};
pub use packet::{
    parse_fingerprints, parse_packets, DigestAlgorithm, FingerprintMap, KeyPacketInfo,
    SignatureVerdict,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
